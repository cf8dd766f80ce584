use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use crate::error::{ReindexError, Result};
use crate::storage::counters::{CountersStore, StoreOp};

const SCAN_COUNT: usize = 1000;

/// Sentinel 连接参数；password 同时用于 sentinel 与 master
#[derive(Clone, Debug)]
pub struct SentinelConfig {
    pub ip: String,
    pub port: u16,
    pub cluster_name: String,
    pub password: Option<String>,
}

fn connection_info(host: String, port: u16, password: Option<String>) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(host, port),
        redis: RedisConnectionInfo {
            db: 0,
            password,
            ..Default::default()
        },
    }
}

/// Redis（经 Sentinel 发现 master）上的计数存储
pub struct RedisCountersStore {
    con: MultiplexedConnection,
}

impl RedisCountersStore {
    /// 向 sentinel 查询 master 地址并连接；任一步失败都是 `MasterUnavailable`
    pub async fn connect(sentinel: &SentinelConfig) -> Result<Self> {
        let (host, port) = resolve_master(sentinel).await.map_err(|e| {
            ReindexError::MasterUnavailable(format!(
                "sentinel {}:{} cluster {}: {}",
                sentinel.ip, sentinel.port, sentinel.cluster_name, e
            ))
        })?;
        tracing::info!("Resolved counters store master {}:{}", host, port);

        let info = connection_info(host.clone(), port, sentinel.password.clone());
        let con = async {
            redis::Client::open(info)?
                .get_multiplexed_async_connection()
                .await
        }
        .await
        .map_err(|e| ReindexError::MasterUnavailable(format!("master {host}:{port}: {e}")))?;

        Ok(Self { con })
    }
}

async fn resolve_master(sentinel: &SentinelConfig) -> redis::RedisResult<(String, u16)> {
    let info = connection_info(sentinel.ip.clone(), sentinel.port, sentinel.password.clone());
    let mut con = redis::Client::open(info)?
        .get_multiplexed_async_connection()
        .await?;

    redis::cmd("SENTINEL")
        .arg("get-master-addr-by-name")
        .arg(&sentinel.cluster_name)
        .query_async(&mut con)
        .await
}

#[async_trait]
impl CountersStore for RedisCountersStore {
    async fn execute(&self, ops: Vec<StoreOp>) -> Result<()> {
        let mut pipe = redis::pipe();
        for op in ops {
            match op {
                StoreOp::RemoveRangeByScore { key, min, max } => {
                    pipe.zrembyscore(key, min, max).ignore();
                }
                StoreOp::AddScoredMember { key, score, member } => {
                    pipe.zadd(key, member, score).ignore();
                }
                StoreOp::Set { key, value } => {
                    pipe.set(key, value).ignore();
                }
            }
        }

        let mut con = self.con.clone();
        let _: () = pipe.query_async(&mut con).await?;
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut con = self.con.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut con)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!("Scanned {} keys matching {}", keys.len(), pattern);
        Ok(keys)
    }
}
