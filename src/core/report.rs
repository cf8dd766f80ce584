use std::collections::{HashMap, HashSet};

use crate::core::bucket::{Bucket, BucketContents, BucketOutcome, FailedBucket};

/// 对象数 + 字节数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub object_count: u64,
    pub total_size_bytes: u64,
}

impl UsageTotals {
    pub const ZERO: UsageTotals = UsageTotals {
        object_count: 0,
        total_size_bytes: 0,
    };

    pub fn new(object_count: u64, total_size_bytes: u64) -> Self {
        Self {
            object_count,
            total_size_bytes,
        }
    }

    pub fn merge(self, other: UsageTotals) -> UsageTotals {
        UsageTotals {
            object_count: self.object_count.saturating_add(other.object_count),
            total_size_bytes: self.total_size_bytes.saturating_add(other.total_size_bytes),
        }
    }
}

impl From<&BucketContents> for UsageTotals {
    fn from(c: &BucketContents) -> Self {
        UsageTotals::new(c.object_count, c.total_size_bytes)
    }
}

/// key（bucket 名或 account id）→ 累计值
///
/// merge 满足结合律与交换律：worker 完成顺序不影响最终结果。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    entries: HashMap<String, UsageTotals>,
}

impl Report {
    pub fn merge(&mut self, key: &str, totals: UsageTotals) {
        match self.entries.get_mut(key) {
            Some(existing) => *existing = existing.merge(totals),
            None => {
                self.entries.insert(key.to_string(), totals);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<UsageTotals> {
        self.entries.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// 按 key 排序输出，写入与日志顺序稳定
    pub fn sorted_entries(&self) -> Vec<(String, UsageTotals)> {
        let mut v: Vec<(String, UsageTotals)> = self
            .entries
            .iter()
            .map(|(k, t)| (k.clone(), *t))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    }
}

/// 一次 run 的内存状态（由 engine 独占持有）
#[derive(Clone, Debug, Default)]
pub struct ReconciliationState {
    pub account_reports: Report,
    pub observed_buckets: HashSet<String>,
    pub failed_accounts: HashSet<String>,
    pub counted: usize,
    pub failed: usize,
    pub not_found: usize,
}

impl ReconciliationState {
    /// 把一个 worker 结果并入 batch 报表与 account 报表
    pub fn record(&mut self, bucket: &Bucket, outcome: BucketOutcome, batch: &mut Report) {
        match outcome {
            BucketOutcome::Counted(contents) => {
                let totals = UsageTotals::from(&contents);
                self.observed_buckets.insert(bucket.name.clone());
                batch.merge(&bucket.name, totals);
                self.account_reports.merge(&bucket.account_id, totals);
                self.counted += 1;
            }
            BucketOutcome::Failed(err) => {
                tracing::error!(
                    "Failed to list bucket {}, removing from results: {}",
                    bucket.name,
                    err
                );
                // 仍记为 observed：避免已有指标被当成 stale 清零
                self.observed_buckets.insert(bucket.name.clone());
                // 该 account 的总量不完整，本轮不更新
                self.failed_accounts.insert(bucket.account_id.clone());
                self.failed += 1;
            }
            BucketOutcome::NotFound => {
                tracing::warn!(
                    "Bucket {} disappeared during the run, recording it as empty",
                    bucket.name
                );
                // 0 页即 0/0：写入 0 值，account 照常更新
                self.observed_buckets.insert(bucket.name.clone());
                batch.merge(&bucket.name, UsageTotals::ZERO);
                self.account_reports.merge(&bucket.account_id, UsageTotals::ZERO);
                self.not_found += 1;
            }
        }
    }

    pub fn record_unresolved(&mut self, failed: &FailedBucket) {
        tracing::error!(
            "Could not resolve bucket {}, removing from results: {}",
            failed.name,
            failed.reason
        );
        self.observed_buckets.insert(failed.name.clone());
        if let Some(account) = &failed.account_id {
            self.failed_accounts.insert(account.clone());
        }
        self.failed += 1;
    }

    pub fn mark_account_failed(&mut self, account: &str) {
        self.failed_accounts.insert(account.to_string());
    }

    /// account 报表里剔除 failed 的部分
    pub fn writable_accounts(&self) -> Vec<(String, UsageTotals)> {
        self.account_reports
            .sorted_entries()
            .into_iter()
            .filter(|(account, _)| !self.failed_accounts.contains(account))
            .collect()
    }

    /// 已观测 account = 有报表的 ∪ failed 的
    pub fn observed_accounts(&self) -> HashSet<String> {
        self.account_reports
            .keys()
            .cloned()
            .chain(self.failed_accounts.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReindexError;

    fn counted(bucket: &Bucket, count: u64, size: u64) -> BucketOutcome {
        BucketOutcome::Counted(BucketContents {
            bucket: bucket.clone(),
            object_count: count,
            total_size_bytes: size,
        })
    }

    #[test]
    fn merge_is_order_independent() {
        let parts = [
            ("a", UsageTotals::new(1, 10)),
            ("b", UsageTotals::new(2, 20)),
            ("a", UsageTotals::new(3, 30)),
        ];

        let mut forward = Report::default();
        for (k, t) in parts.iter() {
            forward.merge(k, *t);
        }
        let mut backward = Report::default();
        for (k, t) in parts.iter().rev() {
            backward.merge(k, *t);
        }

        assert_eq!(forward, backward);
        assert_eq!(forward.get("a"), Some(UsageTotals::new(4, 40)));
    }

    #[test]
    fn failed_bucket_taints_account_but_stays_observed() {
        let a = Bucket::new("acct-a", "bucket-a");
        let b = Bucket::new("acct-b", "bucket-b");
        let mut state = ReconciliationState::default();
        let mut batch = Report::default();

        state.record(&a, counted(&a, 5, 500), &mut batch);
        state.record(
            &b,
            BucketOutcome::Failed(ReindexError::invalid_listing("bucket-b", "boom")),
            &mut batch,
        );

        assert!(state.observed_buckets.contains("bucket-a"));
        assert!(state.observed_buckets.contains("bucket-b"));
        assert!(batch.get("bucket-b").is_none());
        assert_eq!(
            state.writable_accounts(),
            vec![("acct-a".to_string(), UsageTotals::new(5, 500))]
        );
        assert!(state.observed_accounts().contains("acct-b"));
    }

    #[test]
    fn failed_account_is_excluded_even_with_other_successes() {
        let ok = Bucket::new("acct", "ok");
        let bad = Bucket::new("acct", "bad");
        let mut state = ReconciliationState::default();
        let mut batch = Report::default();

        state.record(&ok, counted(&ok, 1, 1), &mut batch);
        state.record(
            &bad,
            BucketOutcome::Failed(ReindexError::invalid_listing("bad", "x")),
            &mut batch,
        );

        assert!(state.writable_accounts().is_empty());
        assert_eq!(batch.get("ok"), Some(UsageTotals::new(1, 1)));
    }

    #[test]
    fn not_found_is_recorded_as_empty() {
        let gone = Bucket::new("acct", "gone");
        let kept = Bucket::new("acct", "kept");
        let mut state = ReconciliationState::default();
        let mut batch = Report::default();

        state.record(&gone, BucketOutcome::NotFound, &mut batch);
        state.record(&kept, counted(&kept, 2, 20), &mut batch);

        assert!(state.observed_buckets.contains("gone"));
        assert!(state.failed_accounts.is_empty());
        assert_eq!(batch.get("gone"), Some(UsageTotals::ZERO));
        assert_eq!(
            state.writable_accounts(),
            vec![("acct".to_string(), UsageTotals::new(2, 20))]
        );
        assert_eq!(state.not_found, 1);
        assert_eq!(state.counted, 1);
    }
}
