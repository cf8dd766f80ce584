use std::fmt;
use std::time::Duration;

/// 一次 reindex run 的统计
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// 枚举得到的批次数
    pub batches: usize,
    pub buckets_counted: usize,
    /// 列举失败（含属性查询失败）的 bucket
    pub buckets_failed: usize,
    /// 枚举后被删除的 bucket
    pub buckets_not_found: usize,
    pub buckets_written: usize,
    pub accounts_written: usize,
    /// 至少有一个 bucket 失败、本轮不更新的 account
    pub accounts_failed: usize,
    pub stale_buckets_zeroed: usize,
    pub stale_accounts_zeroed: usize,
    /// 计数存储读写失败的 pipeline 数
    pub store_failures: usize,
    pub dry_run: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.buckets_failed == 0 && self.accounts_failed == 0 && self.store_failures == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { "dry run" } else { "live" };
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           usage-reindex Run Summary              ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Mode:       {:>36} ║", mode)?;
        writeln!(
            f,
            "║ Elapsed:    {:>36} ║",
            format!("{:.2}s", self.elapsed.as_secs_f64())
        )?;
        writeln!(f, "║ Batches:    {:>36} ║", self.batches)?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Buckets:                                         ║")?;
        writeln!(f, "║   counted:      {:>10}                       ║", self.buckets_counted)?;
        writeln!(f, "║   failed:       {:>10}                       ║", self.buckets_failed)?;
        writeln!(f, "║   not found:    {:>10}                       ║", self.buckets_not_found)?;
        writeln!(f, "║   written:      {:>10}                       ║", self.buckets_written)?;
        writeln!(f, "║   stale zeroed: {:>10}                       ║", self.stale_buckets_zeroed)?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Accounts:                                        ║")?;
        writeln!(f, "║   written:      {:>10}                       ║", self.accounts_written)?;
        writeln!(f, "║   failed:       {:>10}                       ║", self.accounts_failed)?;
        writeln!(f, "║   stale zeroed: {:>10}                       ║", self.stale_accounts_zeroed)?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Store failures: {:>10}                       ║", self.store_failures)?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}
