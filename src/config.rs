//! 运行配置：可选的 TOML 文件，命令行参数覆盖其中的值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReindexError, Result};
use crate::listing::client::ClientConfig;
use crate::storage::redis::SentinelConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReindexConfig {
    pub bucketd: BucketdConfig,
    pub sentinel: SentinelSection,
    /// 并发计数的 worker 数
    pub workers: usize,
    /// 对启用 object lock 的 bucket 只统计每个 key 的最新版本
    pub only_latest_when_locked: bool,
    pub dry_run: bool,
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            bucketd: BucketdConfig::default(),
            sentinel: SentinelSection::default(),
            workers: 10,
            only_latest_when_locked: false,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BucketdConfig {
    pub addr: String,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub server_error_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for BucketdConfig {
    fn default() -> Self {
        Self {
            addr: "http://127.0.0.1:9000".to_string(),
            max_retries: 2,
            retry_delay_secs: 5,
            server_error_delay_secs: 15,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SentinelSection {
    pub ip: String,
    pub port: u16,
    pub cluster_name: String,
    pub password: Option<String>,
}

impl Default for SentinelSection {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 16379,
            cluster_name: "scality-s3".to_string(),
            password: None,
        }
    }
}

impl ReindexConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReindexError::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ReindexError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ReindexError::Config("workers must be at least 1".into()));
        }
        if self.bucketd.addr.trim().is_empty() {
            return Err(ReindexError::Config("bucketd address is empty".into()));
        }
        if self.sentinel.cluster_name.trim().is_empty() {
            return Err(ReindexError::Config("sentinel cluster name is empty".into()));
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            addr: self.bucketd.addr.trim_end_matches('/').to_string(),
            max_retries: self.bucketd.max_retries,
            retry_delay: Duration::from_secs(self.bucketd.retry_delay_secs),
            server_error_delay: Duration::from_secs(self.bucketd.server_error_delay_secs),
            request_timeout: Duration::from_secs(self.bucketd.request_timeout_secs),
        }
    }

    pub fn sentinel_config(&self) -> SentinelConfig {
        SentinelConfig {
            ip: self.sentinel.ip.clone(),
            port: self.sentinel.port,
            cluster_name: self.sentinel.cluster_name.clone(),
            password: self.sentinel.password.clone(),
        }
    }
}
