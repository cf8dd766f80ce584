#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod listing;
pub mod reconcile;
pub mod stats;
pub mod storage;

#[cfg(test)]
mod fake_bucketd;

pub use error::{ReindexError, Result};
