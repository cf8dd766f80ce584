use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;

use crate::error::{ReindexError, Result};
use crate::listing::attr_cache::{AttrCache, BucketAttributes};
use crate::listing::page::Page;
use crate::listing::params::{format_params, ListingParams};

const REQUEST_UID_HEADER: &str = "x-scal-request-uids";
const REQUEST_UID: &str = "utapi-reindex-list-buckets";
const ATTR_CACHE_CAPACITY: usize = 16;

/// bucketd 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 形如 `http://127.0.0.1:9000`
    pub addr: String,
    /// 首次请求之外的最大重试次数
    pub max_retries: u32,
    /// 超时 / 连接失败后的等待
    pub retry_delay: Duration,
    /// bucketd 返回 500 后的等待
    pub server_error_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: "http://127.0.0.1:9000".to_string(),
            max_retries: 2,
            retry_delay: Duration::from_secs(5),
            server_error_delay: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// bucketd 列举客户端
///
/// 每个实例持有独立的 HTTP 连接池；worker 之间不共享实例。
pub struct BucketdClient {
    http: reqwest::Client,
    config: ClientConfig,
    attr_cache: AttrCache,
}

impl BucketdClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_UID_HEADER, HeaderValue::from_static(REQUEST_UID));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            http,
            config,
            attr_cache: AttrCache::with_capacity(ATTR_CACHE_CAPACITY),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn base(&self) -> &str {
        self.config.addr.trim_end_matches('/')
    }

    pub fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/default/bucket/{}", self.base(), bucket)
    }

    pub fn attributes_url(&self, bucket: &str) -> String {
        format!("{}/default/attributes/{}", self.base(), bucket)
    }

    /// 单次物理请求 + 重试
    ///
    /// - 超时 / 连接失败：等待 `retry_delay` 后重试
    /// - 500：等待 `server_error_delay` 后重试，不产出页
    /// - 共 `max_retries + 1` 次仍失败：MaxRetriesReached
    async fn do_req(&self, url: &str, query: &[(&'static str, String)]) -> Result<reqwest::Response> {
        for attempt in 0..=self.config.max_retries {
            match self.http.get(url).query(query).send().await {
                Ok(resp) if resp.status() == StatusCode::INTERNAL_SERVER_ERROR => {
                    tracing::warn!(
                        "500 from bucketd (attempt {}), sleeping {:?}: {}",
                        attempt + 1,
                        self.config.server_error_delay,
                        url
                    );
                    tokio::time::sleep(self.config.server_error_delay).await;
                }
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    tracing::error!(
                        "Error during listing (attempt {}), sleeping {:?} {}: {}",
                        attempt + 1,
                        self.config.retry_delay,
                        url,
                        e
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReindexError::MaxRetriesReached(url.to_string()))
    }

    /// 惰性列举一个 bucket
    pub fn list(&self, bucket: &str, params: ListingParams) -> Pager<'_> {
        Pager {
            client: self,
            url: self.bucket_url(bucket),
            bucket: bucket.to_string(),
            params,
            previous: None,
            done: false,
            not_found: false,
            pages: 0,
        }
    }

    /// 查询 bucket 属性（带缓存）；非 200 视为 bucket 不存在
    pub async fn bucket_attributes(&self, name: &str) -> Result<BucketAttributes> {
        if let Some(attrs) = self.attr_cache.get(name) {
            return Ok(attrs);
        }

        let url = self.attributes_url(name);
        let resp = self.do_req(&url, &[]).await.inspect_err(|e| {
            tracing::error!("Error getting bucket attributes bucket:{}: {}", name, e);
        })?;

        if resp.status() != StatusCode::OK {
            tracing::error!(
                "Error getting bucket attributes bucket:{} status_code:{}",
                name,
                resp.status()
            );
            return Err(ReindexError::BucketNotFound(name.to_string()));
        }

        let body = resp.bytes().await?;
        let attrs: BucketAttributes = serde_json::from_slice(&body).inspect_err(|_| {
            tracing::error!("Invalid attributes response body! bucket:{}", name);
        })?;

        self.attr_cache.insert(name, attrs.clone());
        Ok(attrs)
    }
}

/// 一次逻辑列举的分页驱动
///
/// 每次 `next_page` 用上一页求值所有续页参数，发一次请求；
/// 页面报告未截断（dict）或为空（裸数组）后结束。
pub struct Pager<'a> {
    client: &'a BucketdClient,
    url: String,
    bucket: String,
    params: ListingParams,
    previous: Option<Page>,
    done: bool,
    not_found: bool,
    pages: usize,
}

impl Pager<'_> {
    /// 列举期间收到过 404
    pub fn not_found(&self) -> bool {
        self.not_found
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    pub async fn next_page(&mut self) -> Result<Option<(StatusCode, &Page)>> {
        if self.done {
            return Ok(None);
        }

        match self.fetch().await {
            Ok(Some(page)) => {
                self.done = !page.is_truncated();
                self.pages += 1;
                self.previous = Some(page);
                Ok(self.previous.as_ref().map(|p| (StatusCode::OK, p)))
            }
            Ok(None) => {
                self.done = true;
                self.not_found = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Option<Page>> {
        let query = self.params.resolve(self.previous.as_ref());
        tracing::debug!(
            "listing bucket bucket: {} params: {}",
            self.bucket,
            format_params(&query)
        );

        let resp = match self.client.do_req(&self.url, &query).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("Request failed listing bucket:{}: {}", self.bucket, e);
                return Err(e);
            }
        };

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!("Bucket not found bucket: {}", self.bucket);
            return Ok(None);
        }
        if status != StatusCode::OK {
            return Err(ReindexError::invalid_listing(
                &self.bucket,
                format!("unexpected status {status}"),
            ));
        }

        let body = resp.bytes().await?;
        Page::parse(&self.bucket, &body)
            .inspect_err(|_| {
                tracing::error!(
                    "Invalid listing response body! bucket:{} params:{}",
                    self.bucket,
                    format_params(&query)
                );
            })
            .map(Some)
    }
}
