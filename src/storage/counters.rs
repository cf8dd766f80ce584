use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::core::report::UsageTotals;
use crate::error::Result;

/// 计数写入的时间粒度：15 分钟
const TIMESTAMP_GRANULARITY_MS: i64 = 15 * 60 * 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buckets,
    Accounts,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Buckets => "buckets",
            ResourceKind::Accounts => "accounts",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    NumberOfObjects,
    StorageUtilized,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::NumberOfObjects => "numberOfObjects",
            Metric::StorageUtilized => "storageUtilized",
        }
    }
}

/// `s3:<kind>:<name>:<metric>`：按时间戳打分的有序集合
pub fn metric_key(kind: ResourceKind, name: &str, metric: Metric) -> String {
    format!("s3:{}:{}:{}", kind, name, metric.as_str())
}

/// `s3:<kind>:<name>:<metric>:counter`：当前值
pub fn counter_key(kind: ResourceKind, name: &str, metric: Metric) -> String {
    format!("{}:counter", metric_key(kind, name, metric))
}

/// 枚举已记录资源时使用的 SCAN 模式
pub fn recorded_pattern(kind: ResourceKind) -> String {
    format!("s3:{}:*:{}", kind, Metric::StorageUtilized.as_str())
}

/// 从 `s3:<kind>:<name>:storageUtilized` 取出 name
pub fn name_from_key(kind: ResourceKind, key: &str) -> Option<String> {
    let name = key
        .strip_prefix("s3:")?
        .strip_prefix(kind.as_str())?
        .strip_prefix(':')?
        .strip_suffix(Metric::StorageUtilized.as_str())?
        .strip_suffix(':')?;
    (!name.is_empty()).then(|| name.to_string())
}

/// 向下取整到 15 分钟边界（毫秒）
pub fn rounded_timestamp(now: SystemTime) -> i64 {
    let ms = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    ms - ms.rem_euclid(TIMESTAMP_GRANULARITY_MS)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    RemoveRangeByScore { key: String, min: i64, max: i64 },
    AddScoredMember { key: String, score: i64, member: u64 },
    Set { key: String, value: u64 },
}

/// 单个资源一次写入对应的 6 条命令
///
/// 先删掉同一时间戳上的旧值，再写新值，重复执行结果不变。
pub fn update_ops(kind: ResourceKind, name: &str, totals: UsageTotals, at: i64) -> Vec<StoreOp> {
    let count_key = metric_key(kind, name, Metric::NumberOfObjects);
    let size_key = metric_key(kind, name, Metric::StorageUtilized);
    vec![
        StoreOp::RemoveRangeByScore {
            key: count_key.clone(),
            min: at,
            max: at,
        },
        StoreOp::RemoveRangeByScore {
            key: size_key.clone(),
            min: at,
            max: at,
        },
        StoreOp::AddScoredMember {
            key: count_key,
            score: at,
            member: totals.object_count,
        },
        StoreOp::AddScoredMember {
            key: size_key,
            score: at,
            member: totals.total_size_bytes,
        },
        StoreOp::Set {
            key: counter_key(kind, name, Metric::NumberOfObjects),
            value: totals.object_count,
        },
        StoreOp::Set {
            key: counter_key(kind, name, Metric::StorageUtilized),
            value: totals.total_size_bytes,
        },
    ]
}

/// 计数存储抽象
///
/// - `execute` 把一组命令作为一个非事务 pipeline 发送
/// - `scan_keys` 按 glob 模式枚举 key
#[async_trait]
pub trait CountersStore: Send + Sync {
    async fn execute(&self, ops: Vec<StoreOp>) -> Result<()>;
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;
}

/// 报表写入器；dry-run 时只打日志
#[derive(Clone)]
pub struct CountersWriter {
    store: Arc<dyn CountersStore>,
    dry_run: bool,
}

impl CountersWriter {
    pub fn new(store: Arc<dyn CountersStore>, dry_run: bool) -> Self {
        Self { store, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// 一次调用 = 一个 pipeline；返回写入的条目数
    pub async fn apply(
        &self,
        kind: ResourceKind,
        entries: &[(String, UsageTotals)],
        at: i64,
    ) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut ops = Vec::with_capacity(entries.len() * 6);
        for (name, totals) in entries {
            tracing::info!(
                "{}:{}:{}:{}",
                kind,
                name,
                totals.object_count,
                totals.total_size_bytes
            );
            ops.extend(update_ops(kind, name, *totals, at));
        }

        if self.dry_run {
            tracing::debug!("Dry run, skipping {} {} writes", entries.len(), kind);
            return Ok(entries.len());
        }

        self.store.execute(ops).await?;
        Ok(entries.len())
    }

    pub async fn recorded_names(&self, kind: ResourceKind) -> Result<HashSet<String>> {
        let keys = self.store.scan_keys(&recorded_pattern(kind)).await?;
        Ok(keys
            .iter()
            .filter_map(|key| name_from_key(kind, key))
            .collect())
    }
}
