use std::collections::HashSet;

use serde_json::Value;

use crate::core::bucket::{Bucket, BucketBatch, FailedBucket, KEY_SPLITTER, USERS_BUCKET};
use crate::error::{ReindexError, Result};
use crate::listing::client::{BucketdClient, Pager};
use crate::listing::params::{marker_from_last_key, ListingParams};

const INDEX_PAGE_SIZE: u32 = 1000;

/// bucket 枚举器：遍历 `users..bucket` 索引
pub struct BucketEnumerator<'a> {
    client: &'a BucketdClient,
    resolve_lock: bool,
}

impl<'a> BucketEnumerator<'a> {
    /// `resolve_lock`：为每个 bucket 查询属性，确定是否启用 object lock
    pub fn new(client: &'a BucketdClient, resolve_lock: bool) -> Self {
        Self {
            client,
            resolve_lock,
        }
    }

    pub fn list_all(&self) -> BucketBatches<'a> {
        self.batches(None)
    }

    pub fn list_for_account(&self, account: &str) -> BucketBatches<'a> {
        self.batches(Some(account.to_string()))
    }

    fn batches(&self, account: Option<String>) -> BucketBatches<'a> {
        let mut params = ListingParams::new()
            .with("delimiter", "")
            .with("maxKeys", INDEX_PAGE_SIZE)
            .with_next("marker", marker_from_last_key("Contents", ""));
        if let Some(account) = &account {
            params = params.with("prefix", format!("{account}{KEY_SPLITTER}"));
        }

        BucketBatches {
            client: self.client,
            pager: self.client.list(USERS_BUCKET, params),
            resolve_lock: self.resolve_lock,
            account,
        }
    }

    /// 按名字逐个查属性；不存在的名字记日志后丢弃
    pub async fn list_specific(&self, names: &[String]) -> BucketBatch {
        let mut batch = BucketBatch::default();
        let mut seen = HashSet::new();

        for name in names {
            if !seen.insert(name.as_str()) {
                continue;
            }
            match self.client.bucket_attributes(name).await {
                Ok(attrs) => batch.buckets.push(
                    Bucket::new(attrs.owner, name.as_str())
                        .with_object_lock(attrs.object_lock_enabled),
                ),
                Err(ReindexError::BucketNotFound(_)) => {
                    tracing::warn!("Bucket {} not found, skipping", name);
                }
                Err(e) => batch.failed.push(FailedBucket {
                    name: name.clone(),
                    account_id: None,
                    reason: e.to_string(),
                }),
            }
        }
        batch
    }
}

/// 惰性批次序列：bucketd 的一页对应一批
pub struct BucketBatches<'a> {
    client: &'a BucketdClient,
    pager: Pager<'a>,
    resolve_lock: bool,
    account: Option<String>,
}

impl BucketBatches<'_> {
    pub async fn next_batch(&mut self) -> Result<Option<BucketBatch>> {
        loop {
            let candidates = {
                let Some((_, page)) = self.pager.next_page().await? else {
                    return Ok(None);
                };
                let entries = page.require_entries(USERS_BUCKET, "Contents")?;
                parse_entries(entries, self.account.as_deref())
            };

            let batch = self.resolve(candidates).await;
            if !batch.is_empty() {
                return Ok(Some(batch));
            }
        }
    }

    async fn resolve(&self, candidates: Vec<Bucket>) -> BucketBatch {
        if !self.resolve_lock {
            return BucketBatch {
                buckets: candidates,
                failed: Vec::new(),
            };
        }

        let mut batch = BucketBatch::default();
        for bucket in candidates {
            match self.client.bucket_attributes(&bucket.name).await {
                Ok(attrs) => {
                    let enabled = attrs.object_lock_enabled;
                    batch.buckets.push(bucket.with_object_lock(enabled));
                }
                // 已枚举的 bucket 不能直接丢弃，任何查询失败都记为 failed
                Err(e) => batch.failed.push(FailedBucket {
                    name: bucket.name.clone(),
                    account_id: Some(bucket.account_id.clone()),
                    reason: e.to_string(),
                }),
            }
        }
        batch
    }
}

fn parse_entries(entries: &[Value], account: Option<&str>) -> Vec<Bucket> {
    entries
        .iter()
        .filter_map(|entry| {
            let key = entry.get("key").and_then(Value::as_str)?;
            let Some(bucket) = Bucket::from_index_key(key) else {
                tracing::warn!("Skipping malformed bucket index key: {}", key);
                return None;
            };
            match account {
                Some(account) if bucket.account_id != account => None,
                _ => Some(bucket),
            }
        })
        .collect()
}
