pub mod bucket;
pub mod report;

pub use bucket::*;
pub use report::*;
