use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Deserialize;

/// `GET /default/attributes/{bucket}` 里用得到的字段
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct BucketAttributes {
    #[serde(default)]
    pub owner: String,
    #[serde(rename = "objectLockEnabled", default)]
    pub object_lock_enabled: bool,
}

/// bucket 属性缓存（DashMap 实现，有界）
///
/// 每个 bucket 只查一次属性，但同一 run 里可能被多处使用；容量很小，满了淘汰最久未访问的条目。
pub struct AttrCache {
    inner: DashMap<String, BucketAttributes>,
    last_access: DashMap<String, u64>,
    clock: AtomicU64,
    capacity: usize,
}

impl AttrCache {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: DashMap::with_capacity(cap),
            last_access: DashMap::new(),
            clock: AtomicU64::new(0),
            capacity: cap.max(1),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, bucket: &str) -> Option<BucketAttributes> {
        let hit = self.inner.get(bucket).map(|e| e.value().clone())?;
        self.last_access.insert(bucket.to_string(), self.tick());
        Some(hit)
    }

    pub fn insert(&self, bucket: &str, attrs: BucketAttributes) {
        if !self.inner.contains_key(bucket) && self.inner.len() >= self.capacity {
            let victim = self
                .last_access
                .iter()
                .min_by_key(|e| *e.value())
                .map(|e| e.key().clone());

            if let Some(key) = victim {
                self.inner.remove(&key);
                self.last_access.remove(&key);
            }
        }

        self.inner.insert(bucket.to_string(), attrs);
        self.last_access.insert(bucket.to_string(), self.tick());
    }
}
