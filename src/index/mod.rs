pub mod counter;
pub mod enumerator;

pub use counter::{object_size, ContentCounter, VersionTally};
pub use enumerator::{BucketBatches, BucketEnumerator};
