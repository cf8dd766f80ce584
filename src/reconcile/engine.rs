use std::collections::HashSet;
use std::time::{Instant, SystemTime};

use crate::core::bucket::BucketBatch;
use crate::core::report::{ReconciliationState, Report, UsageTotals};
use crate::error::Result;
use crate::index::counter::ContentCounter;
use crate::index::enumerator::{BucketBatches, BucketEnumerator};
use crate::listing::client::{BucketdClient, ClientConfig};
use crate::reconcile::pool::WorkerPool;
use crate::reconcile::stale::{stale_accounts, stale_buckets};
use crate::stats::RunSummary;
use crate::storage::counters::{rounded_timestamp, CountersWriter, ResourceKind};

/// 清零与 account 写入的分块大小
pub const UPDATE_CHUNK_SIZE: usize = 100;

/// 本次 run 的目标范围
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetScope {
    All,
    Accounts(Vec<String>),
    Buckets(Vec<String>),
}

impl TargetScope {
    pub fn writes_accounts(&self) -> bool {
        !matches!(self, TargetScope::Buckets(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Enumerating,
    Counting,
    Flushing,
    ReconcilingStale,
    Done,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub client: ClientConfig,
    pub workers: usize,
    pub only_latest_when_locked: bool,
}

/// reindex 协调器
///
/// 单个协调 task 驱动枚举和写入，计数交给 worker 池：
/// 1. 按枚举顺序逐批提交 bucket，批内结果按完成顺序合并
/// 2. 每批结束立即写入该批的 bucket 报表
/// 3. 全部批次结束后写 account 报表，并清零 stale 记录
pub struct ReconcileEngine {
    config: EngineConfig,
    writer: CountersWriter,
    phase: RunPhase,
}

impl ReconcileEngine {
    pub fn new(config: EngineConfig, writer: CountersWriter) -> Self {
        Self {
            config,
            writer,
            phase: RunPhase::Idle,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub async fn run(&mut self, scope: &TargetScope) -> Result<RunSummary> {
        self.run_at(scope, rounded_timestamp(SystemTime::now())).await
    }

    /// `at`：本次 run 所有写入使用的时间戳
    pub async fn run_at(&mut self, scope: &TargetScope, at: i64) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary {
            dry_run: self.writer.is_dry_run(),
            ..Default::default()
        };
        let mut state = ReconciliationState::default();

        let client = BucketdClient::new(self.config.client.clone())?;
        let enumerator = BucketEnumerator::new(&client, self.config.only_latest_when_locked);

        let worker_config = self.config.client.clone();
        let only_latest = self.config.only_latest_when_locked;
        let mut pool = WorkerPool::spawn(self.config.workers, || {
            Ok(ContentCounter::new(
                BucketdClient::new(worker_config.clone())?,
                only_latest,
            ))
        })?;

        tracing::info!(
            "Starting reindex with {} workers at timestamp {}",
            pool.size(),
            at
        );
        let counted = self
            .count_scope(scope, &enumerator, &mut pool, &mut state, &mut summary, at)
            .await;
        pool.shutdown().await;
        // 全局枚举失败：已写入的批次保留，不做清零
        counted?;

        self.phase = RunPhase::ReconcilingStale;
        self.reconcile(scope, &state, &mut summary, at).await;

        summary.buckets_counted = state.counted;
        summary.buckets_failed = state.failed;
        summary.buckets_not_found = state.not_found;
        summary.accounts_failed = state.failed_accounts.len();
        summary.elapsed = started.elapsed();
        self.phase = RunPhase::Done;

        tracing::info!(
            "Reindex finished: {} buckets counted, {} failed, {} not found",
            summary.buckets_counted,
            summary.buckets_failed,
            summary.buckets_not_found
        );
        Ok(summary)
    }

    async fn count_scope(
        &mut self,
        scope: &TargetScope,
        enumerator: &BucketEnumerator<'_>,
        pool: &mut WorkerPool,
        state: &mut ReconciliationState,
        summary: &mut RunSummary,
        at: i64,
    ) -> Result<()> {
        match scope {
            TargetScope::All => {
                let mut batches = enumerator.list_all();
                self.drain(&mut batches, pool, state, summary, at).await
            }
            TargetScope::Accounts(accounts) => {
                let mut seen = HashSet::new();
                for account in accounts.iter().filter(|a| seen.insert(a.as_str())) {
                    tracing::info!("Indexing buckets of account {}", account);
                    let mut batches = enumerator.list_for_account(account);
                    if let Err(e) = self.drain(&mut batches, pool, state, summary, at).await {
                        tracing::error!(
                            "Failed to list buckets of account {}, skipping it: {}",
                            account,
                            e
                        );
                        state.mark_account_failed(account);
                    }
                }
                Ok(())
            }
            TargetScope::Buckets(names) => {
                self.phase = RunPhase::Enumerating;
                let batch = enumerator.list_specific(names).await;
                if !batch.is_empty() {
                    self.process_batch(batch, pool, state, summary, at).await;
                }
                Ok(())
            }
        }
    }

    async fn drain(
        &mut self,
        batches: &mut BucketBatches<'_>,
        pool: &mut WorkerPool,
        state: &mut ReconciliationState,
        summary: &mut RunSummary,
        at: i64,
    ) -> Result<()> {
        loop {
            self.phase = RunPhase::Enumerating;
            let Some(batch) = batches.next_batch().await? else {
                return Ok(());
            };
            self.process_batch(batch, pool, state, summary, at).await;
        }
    }

    async fn process_batch(
        &mut self,
        batch: BucketBatch,
        pool: &mut WorkerPool,
        state: &mut ReconciliationState,
        summary: &mut RunSummary,
        at: i64,
    ) {
        self.phase = RunPhase::Counting;
        summary.batches += 1;
        tracing::debug!("Processing batch {} of {} buckets", summary.batches, batch.len());

        for failed in &batch.failed {
            state.record_unresolved(failed);
        }
        for bucket in batch.buckets {
            pool.submit(bucket);
        }

        let mut report = Report::default();
        while let Some(done) = pool.next_completion().await {
            state.record(&done.bucket, done.outcome, &mut report);
        }

        self.phase = RunPhase::Flushing;
        let written = self
            .write(ResourceKind::Buckets, &report.sorted_entries(), at, summary)
            .await;
        summary.buckets_written += written;
    }

    async fn reconcile(
        &mut self,
        scope: &TargetScope,
        state: &ReconciliationState,
        summary: &mut RunSummary,
        at: i64,
    ) {
        match self.recorded(ResourceKind::Buckets, summary).await {
            Some(recorded) => {
                match stale_buckets(scope, &recorded, &state.observed_buckets) {
                    Some(stale) => {
                        tracing::info!("Found {} stale buckets", stale.len());
                        let zeroes = zeroed(stale);
                        let written =
                            self.write_chunked(ResourceKind::Buckets, &zeroes, at, summary).await;
                        summary.stale_buckets_zeroed += written;
                    }
                    None => tracing::warn!(
                        "Stale bucket cleanup is not supported when indexing by account"
                    ),
                }
            }
            None => tracing::error!("Skipping stale bucket cleanup"),
        }

        if !scope.writes_accounts() {
            tracing::info!("Account metrics are not updated when buckets are specified");
            return;
        }

        let accounts = state.writable_accounts();
        let written = self
            .write_chunked(ResourceKind::Accounts, &accounts, at, summary)
            .await;
        summary.accounts_written += written;

        let Some(recorded) = self.recorded(ResourceKind::Accounts, summary).await else {
            tracing::error!("Skipping stale account cleanup");
            return;
        };
        if let Some(stale) = stale_accounts(scope, &recorded, &state.observed_accounts()) {
            tracing::info!("Found {} stale accounts", stale.len());
            let zeroes = zeroed(stale);
            let written = self
                .write_chunked(ResourceKind::Accounts, &zeroes, at, summary)
                .await;
            summary.stale_accounts_zeroed += written;
        }
    }

    async fn recorded(
        &self,
        kind: ResourceKind,
        summary: &mut RunSummary,
    ) -> Option<HashSet<String>> {
        match self.writer.recorded_names(kind).await {
            Ok(names) => Some(names),
            Err(e) => {
                tracing::error!("Failed to read recorded {} from counters store: {}", kind, e);
                summary.store_failures += 1;
                None
            }
        }
    }

    async fn write_chunked(
        &self,
        kind: ResourceKind,
        entries: &[(String, UsageTotals)],
        at: i64,
        summary: &mut RunSummary,
    ) -> usize {
        let mut written = 0;
        for chunk in entries.chunks(UPDATE_CHUNK_SIZE) {
            written += self.write(kind, chunk, at, summary).await;
        }
        written
    }

    /// 写失败只记日志并计数，不中断 run
    async fn write(
        &self,
        kind: ResourceKind,
        entries: &[(String, UsageTotals)],
        at: i64,
        summary: &mut RunSummary,
    ) -> usize {
        match self.writer.apply(kind, entries, at).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Failed to write {} {} reports: {}", entries.len(), kind, e);
                summary.store_failures += 1;
                0
            }
        }
    }
}

fn zeroed(names: impl IntoIterator<Item = String>) -> Vec<(String, UsageTotals)> {
    names.into_iter().map(|n| (n, UsageTotals::ZERO)).collect()
}
