//! Command line interface definition.

use std::path::{Path, PathBuf};

use clap::{ArgGroup, Parser};

use crate::config::ReindexConfig;
use crate::error::{ReindexError, Result};
use crate::reconcile::engine::TargetScope;

/// Recompute bucket and account usage counters from bucketd listings.
#[derive(Parser, Debug)]
#[command(name = "usage-reindex")]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("target")
        .multiple(false)
        .args(["account", "account_file", "bucket", "bucket_file"])
))]
pub struct Cli {
    /// TOML configuration file; flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Sentinel address.
    #[arg(short = 'i', long)]
    pub sentinel_ip: Option<String>,

    /// Sentinel port.
    #[arg(short = 'p', long)]
    pub sentinel_port: Option<u16>,

    /// Password for sentinel and the counters store.
    #[arg(short = 'v', long)]
    pub redis_password: Option<String>,

    /// Sentinel cluster name.
    #[arg(short = 'n', long)]
    pub sentinel_cluster_name: Option<String>,

    /// Bucketd address, e.g. http://127.0.0.1:9000.
    #[arg(short = 's', long)]
    pub bucketd_addr: Option<String>,

    /// Number of concurrent counting workers.
    #[arg(short = 'w', long = "worker")]
    pub workers: Option<usize>,

    /// Retries per bucketd request after the first attempt.
    #[arg(short = 'r', long)]
    pub max_retries: Option<u32>,

    /// Only count the latest version of each key in object-locked buckets.
    #[arg(long)]
    pub only_latest_when_locked: bool,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,

    /// Count and log without writing to the counters store.
    #[arg(long)]
    pub dry_run: bool,

    /// Only index these accounts (repeatable).
    #[arg(short = 'a', long)]
    pub account: Vec<String>,

    /// File with one account id per line.
    #[arg(long)]
    pub account_file: Option<PathBuf>,

    /// Only index these buckets (repeatable).
    #[arg(short = 'b', long)]
    pub bucket: Vec<String>,

    /// File with one bucket name per line.
    #[arg(long)]
    pub bucket_file: Option<PathBuf>,
}

impl Cli {
    /// 读取配置文件（若有）并叠加命令行参数
    pub fn load_config(&self) -> Result<ReindexConfig> {
        let mut config = match &self.config {
            Some(path) => ReindexConfig::from_file(path)?,
            None => ReindexConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut ReindexConfig) {
        if let Some(ip) = &self.sentinel_ip {
            config.sentinel.ip = ip.clone();
        }
        if let Some(port) = self.sentinel_port {
            config.sentinel.port = port;
        }
        if let Some(password) = &self.redis_password {
            config.sentinel.password = Some(password.clone());
        }
        if let Some(name) = &self.sentinel_cluster_name {
            config.sentinel.cluster_name = name.clone();
        }
        if let Some(addr) = &self.bucketd_addr {
            config.bucketd.addr = addr.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(retries) = self.max_retries {
            config.bucketd.max_retries = retries;
        }
        config.only_latest_when_locked |= self.only_latest_when_locked;
        config.dry_run |= self.dry_run;
    }

    pub fn target_scope(&self) -> Result<TargetScope> {
        if !self.account.is_empty() {
            return Ok(TargetScope::Accounts(non_empty("account", &self.account)?));
        }
        if let Some(path) = &self.account_file {
            return Ok(TargetScope::Accounts(non_empty("account", &read_names(path)?)?));
        }
        if !self.bucket.is_empty() {
            return Ok(TargetScope::Buckets(non_empty("bucket", &self.bucket)?));
        }
        if let Some(path) = &self.bucket_file {
            return Ok(TargetScope::Buckets(non_empty("bucket", &read_names(path)?)?));
        }
        Ok(TargetScope::All)
    }
}

fn non_empty(what: &str, names: &[String]) -> Result<Vec<String>> {
    let names: Vec<String> = names.iter().map(|n| n.trim().to_string()).collect();
    if names.is_empty() || names.iter().any(String::is_empty) {
        return Err(ReindexError::Config(format!(
            "You must provide a non-empty {what} name"
        )));
    }
    Ok(names)
}

/// 每行一个名字；跳过空行与 `#` 注释
pub fn read_names(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ReindexError::Config(format!("{}: {}", path.display(), e)))?;
    Ok(parse_names(&content))
}

fn parse_names(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
