use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::core::bucket::{Bucket, BucketOutcome};
use crate::error::Result;
use crate::index::counter::ContentCounter;

/// 一个 bucket 的计数结果
#[derive(Debug)]
pub struct Completion {
    pub bucket: Bucket,
    pub outcome: BucketOutcome,
}

/// 固定大小的计数 worker 池
///
/// 每个 worker 独占一个 `ContentCounter`（即独立的 HTTP 连接池），
/// 从共享队列取 bucket，结果按完成顺序回传。
pub struct WorkerPool {
    jobs: Option<mpsc::UnboundedSender<Bucket>>,
    results: mpsc::UnboundedReceiver<Completion>,
    handles: Vec<JoinHandle<()>>,
    in_flight: usize,
}

impl WorkerPool {
    pub fn spawn<F>(workers: usize, mut make_counter: F) -> Result<Self>
    where
        F: FnMut() -> Result<ContentCounter>,
    {
        let (job_tx, job_rx) = mpsc::unbounded_channel::<Bucket>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        let workers = workers.max(1);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let counter = make_counter()?;
            let jobs = job_rx.clone();
            let results = result_tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    // 锁只在取任务时持有
                    let next = jobs.lock().await.recv().await;
                    let Some(bucket) = next else { break };

                    tracing::debug!("worker {} indexing bucket {}", id, bucket.name);
                    let outcome = counter.index_bucket(&bucket).await;
                    if results.send(Completion { bucket, outcome }).is_err() {
                        break;
                    }
                }
            }));
        }

        tracing::debug!("Started {} counting workers", workers);
        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            handles,
            in_flight: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn submit(&mut self, bucket: Bucket) {
        let Some(jobs) = &self.jobs else { return };
        if jobs.send(bucket).is_ok() {
            self.in_flight += 1;
        }
    }

    /// 下一个完成的结果；没有在途任务时返回 None
    pub async fn next_completion(&mut self) -> Option<Completion> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.results.recv().await?;
        self.in_flight -= 1;
        Some(completion)
    }

    /// 关闭队列并等待所有 worker 退出
    pub async fn shutdown(mut self) {
        self.jobs.take();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!("Counting worker terminated abnormally: {}", e);
            }
        }
    }
}
