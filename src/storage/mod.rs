pub mod counters;
#[cfg(test)]
pub(crate) mod memory;
pub mod redis;

pub use counters::{CountersStore, CountersWriter, ResourceKind, StoreOp};
pub use self::redis::{RedisCountersStore, SentinelConfig};
