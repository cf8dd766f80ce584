//! 测试用内存计数存储：模拟有序集合与标量

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::report::UsageTotals;
use crate::error::{ReindexError, Result};
use crate::storage::counters::{
    counter_key, update_ops, CountersStore, Metric, ResourceKind, StoreOp,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct StoreSnapshot {
    /// key → (member → score)
    pub sorted: BTreeMap<String, BTreeMap<u64, i64>>,
    pub scalars: BTreeMap<String, u64>,
}

#[derive(Default)]
pub(crate) struct MemoryCountersStore {
    data: Mutex<StoreSnapshot>,
    pipelines: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryCountersStore {
    pub fn snapshot(&self) -> StoreSnapshot {
        self.data.lock().clone()
    }

    pub fn pipelines(&self) -> usize {
        self.pipelines.load(Ordering::Relaxed)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// 直接写入一条已有记录（时间戳 0）
    pub fn seed(&self, kind: ResourceKind, name: &str, totals: UsageTotals) {
        let mut data = self.data.lock();
        for op in update_ops(kind, name, totals, 0) {
            apply_op(&mut data, op);
        }
    }

    pub fn totals(&self, kind: ResourceKind, name: &str) -> Option<UsageTotals> {
        let data = self.data.lock();
        let count = data.scalars.get(&counter_key(kind, name, Metric::NumberOfObjects))?;
        let size = data.scalars.get(&counter_key(kind, name, Metric::StorageUtilized))?;
        Some(UsageTotals::new(*count, *size))
    }
}

fn apply_op(data: &mut StoreSnapshot, op: StoreOp) {
    match op {
        StoreOp::RemoveRangeByScore { key, min, max } => {
            if let Some(set) = data.sorted.get_mut(&key) {
                set.retain(|_, score| *score < min || *score > max);
            }
        }
        StoreOp::AddScoredMember { key, score, member } => {
            data.sorted.entry(key).or_default().insert(member, score);
        }
        StoreOp::Set { key, value } => {
            data.scalars.insert(key, value);
        }
    }
}

/// 只支持单个 `*` 的 glob
fn glob_match(pattern: &str, key: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == key,
        Some((prefix, suffix)) => {
            key.len() >= prefix.len() + suffix.len()
                && key.starts_with(prefix)
                && key.ends_with(suffix)
        }
    }
}

#[async_trait]
impl CountersStore for MemoryCountersStore {
    async fn execute(&self, ops: Vec<StoreOp>) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(ReindexError::Store(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection reset",
            ))));
        }
        self.pipelines.fetch_add(1, Ordering::Relaxed);
        let mut data = self.data.lock();
        for op in ops {
            apply_op(&mut data, op);
        }
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let data = self.data.lock();
        Ok(data
            .sorted
            .keys()
            .chain(data.scalars.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }
}
