use thiserror::Error;

/// reindex 全流程错误
///
/// - 网络抖动 / 500 在客户端内部重试，不会直接出现在这里
/// - `MaxRetriesReached` / `InvalidListing` 只让单个 bucket 失败
/// - `MasterUnavailable` 是唯一在开始计数前就终止整个 run 的错误
#[derive(Error, Debug)]
pub enum ReindexError {
    #[error("Max retries reached for request to {0}")]
    MaxRetriesReached(String),

    #[error("Invalid contents found while listing bucket {bucket}: {detail}")]
    InvalidListing { bucket: String, detail: String },

    #[error("Bucket {0} not found")]
    BucketNotFound(String),

    #[error("bucketd request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("counters store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("unable to resolve counters store master: {0}")]
    MasterUnavailable(String),

    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ReindexError {
    pub fn invalid_listing(bucket: impl Into<String>, detail: impl ToString) -> Self {
        ReindexError::InvalidListing {
            bucket: bucket.into(),
            detail: detail.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReindexError>;
