pub mod attr_cache;
pub mod client;
pub mod page;
pub mod params;

pub use attr_cache::{AttrCache, BucketAttributes};
pub use client::{BucketdClient, ClientConfig, Pager};
pub use page::Page;
pub use params::{ListingParams, ParamValue};
