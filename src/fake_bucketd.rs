//! 测试用伪 bucketd：axum 起在 127.0.0.1:0，按 bucketd 的参数语义分页返回

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::core::bucket::{KEY_SPLITTER, MPU_SHADOW_BUCKET_PREFIX, USERS_BUCKET};
use crate::listing::client::ClientConfig;

#[derive(Clone, Debug)]
pub(crate) struct FakeEntry {
    pub key: String,
    pub version_id: String,
    pub value: Value,
}

impl FakeEntry {
    /// v6 形态：value 是对象，带 Size
    pub fn version(key: &str, version_id: &str, size: u64) -> Self {
        Self {
            key: key.to_string(),
            version_id: version_id.to_string(),
            value: json!({ "Size": size }),
        }
    }

    /// v7 形态：value 是 JSON 字符串，带 content-length
    pub fn encoded(key: &str, version_id: &str, size: u64) -> Self {
        Self {
            key: key.to_string(),
            version_id: version_id.to_string(),
            value: Value::String(json!({ "content-length": size }).to_string()),
        }
    }

    pub fn index(account: &str, bucket: &str) -> Self {
        Self {
            key: format!("{account}{KEY_SPLITTER}{bucket}"),
            version_id: String::new(),
            value: json!({}),
        }
    }

    pub fn upload(object_key: &str, upload_id: &str) -> Self {
        Self {
            key: format!("overview{KEY_SPLITTER}{object_key}{KEY_SPLITTER}{upload_id}"),
            version_id: String::new(),
            value: json!({ "UploadId": upload_id }),
        }
    }

    pub fn part(upload_id: &str, part: u32, size: u64) -> Self {
        Self {
            key: format!("{upload_id}{KEY_SPLITTER}{part:05}"),
            version_id: String::new(),
            value: Value::String(json!({ "content-length": size }).to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum FakeBucket {
    Listing(Vec<FakeEntry>),
    BareArray(Vec<FakeEntry>),
    Status(u16),
    Garbage,
    /// 前 n 次请求返回 500，之后按内层返回
    ServerErrorsThen(usize, Box<FakeBucket>),
    /// 前 n 次请求按内层返回，之后一律 500
    FailAfter(usize, Box<FakeBucket>),
}

pub(crate) struct FakeState {
    page_size: usize,
    buckets: RwLock<HashMap<String, FakeBucket>>,
    attributes: RwLock<HashMap<String, Value>>,
    attribute_status: RwLock<HashMap<String, u16>>,
    hits: DashMap<String, usize>,
}

pub(crate) struct FakeBucketd {
    pub addr: String,
    state: Arc<FakeState>,
}

impl FakeBucketd {
    pub async fn start(page_size: usize) -> Self {
        let state = Arc::new(FakeState {
            page_size: page_size.max(1),
            buckets: RwLock::new(HashMap::new()),
            attributes: RwLock::new(HashMap::new()),
            attribute_status: RwLock::new(HashMap::new()),
            hits: DashMap::new(),
        });
        state
            .buckets
            .write()
            .insert(USERS_BUCKET.to_string(), FakeBucket::Listing(Vec::new()));

        let app = Router::new()
            .route("/default/bucket/:bucket", get(list_bucket))
            .route("/default/attributes/:bucket", get(bucket_attributes))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn client_config(&self, max_retries: u32) -> ClientConfig {
        ClientConfig {
            addr: self.addr.clone(),
            max_retries,
            retry_delay: Duration::from_millis(1),
            server_error_delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// 注册 bucket：写入索引、属性和（空的）版本列表
    pub fn add_bucket(&self, account: &str, bucket: &str, object_lock_enabled: bool) {
        {
            let mut buckets = self.state.buckets.write();
            if let Some(FakeBucket::Listing(index)) = buckets.get_mut(USERS_BUCKET) {
                index.push(FakeEntry::index(account, bucket));
                index.sort_by(|a, b| a.key.cmp(&b.key));
            }
            buckets
                .entry(bucket.to_string())
                .or_insert_with(|| FakeBucket::Listing(Vec::new()));
        }
        self.state.attributes.write().insert(
            bucket.to_string(),
            json!({ "owner": account, "objectLockEnabled": object_lock_enabled, "name": bucket }),
        );
    }

    pub fn set_bucket(&self, bucket: &str, behavior: FakeBucket) {
        self.state.buckets.write().insert(bucket.to_string(), behavior);
    }

    pub fn set_versions(&self, bucket: &str, versions: Vec<FakeEntry>) {
        self.set_bucket(bucket, FakeBucket::Listing(versions));
    }

    /// 影子 bucket：uploads 索引 + 各 upload 的分片
    pub fn set_shadow(&self, bucket: &str, entries: Vec<FakeEntry>) {
        let mut entries = entries;
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        self.set_bucket(
            &format!("{MPU_SHADOW_BUCKET_PREFIX}{bucket}"),
            FakeBucket::Listing(entries),
        );
    }

    pub fn remove_bucket(&self, bucket: &str) {
        self.state.buckets.write().remove(bucket);
        self.state.attributes.write().remove(bucket);
        if let Some(FakeBucket::Listing(index)) = self.state.buckets.write().get_mut(USERS_BUCKET) {
            let suffix = format!("{KEY_SPLITTER}{bucket}");
            index.retain(|e| !e.key.ends_with(&suffix));
        }
    }

    /// 属性查询固定返回该状态码
    pub fn set_attributes_status(&self, bucket: &str, status: u16) {
        self.state
            .attribute_status
            .write()
            .insert(bucket.to_string(), status);
    }

    /// 当前行为只持续 `ok_requests` 次请求，之后一律 500
    pub fn fail_after(&self, bucket: &str, ok_requests: usize) {
        let mut buckets = self.state.buckets.write();
        if let Some(current) = buckets.remove(bucket) {
            buckets.insert(
                bucket.to_string(),
                FakeBucket::FailAfter(ok_requests, Box::new(current)),
            );
        }
    }

    pub fn remove_attributes(&self, bucket: &str) {
        self.state.attributes.write().remove(bucket);
    }

    pub fn hits(&self, path_key: &str) -> usize {
        self.state.hits.get(path_key).map(|v| *v).unwrap_or(0)
    }
}

async fn list_bucket(
    Path(bucket): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<Arc<FakeState>>,
) -> Response {
    let hit = {
        let mut e = state.hits.entry(bucket.clone()).or_insert(0);
        *e += 1;
        *e
    };
    let behavior = state.buckets.read().get(&bucket).cloned();
    match behavior {
        None => StatusCode::NOT_FOUND.into_response(),
        Some(behavior) => respond(&behavior, hit, &query, state.page_size),
    }
}

fn respond(behavior: &FakeBucket, hit: usize, query: &HashMap<String, String>, page_size: usize) -> Response {
    match behavior {
        FakeBucket::Status(code) => StatusCode::from_u16(*code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        FakeBucket::Garbage => (StatusCode::OK, "<html>not json</html>").into_response(),
        FakeBucket::ServerErrorsThen(n, inner) => {
            if hit <= *n {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            } else {
                respond(inner, hit, query, page_size)
            }
        }
        FakeBucket::FailAfter(n, inner) => {
            if hit > *n {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            } else {
                respond(inner, hit, query, page_size)
            }
        }
        FakeBucket::Listing(entries) => Json(dict_page(entries, query, page_size)).into_response(),
        FakeBucket::BareArray(entries) => {
            let marker = param(query, "marker");
            let page: Vec<Value> = entries
                .iter()
                .filter(|e| marker.is_empty() || e.key.as_str() > marker)
                .take(page_size)
                .map(|e| json!({ "key": e.key, "value": e.value }))
                .collect();
            Json(Value::Array(page)).into_response()
        }
    }
}

fn param<'a>(query: &'a HashMap<String, String>, name: &str) -> &'a str {
    query.get(name).map(String::as_str).unwrap_or("")
}

fn start_after(entries: &[&FakeEntry], key_marker: &str, vid_marker: &str) -> usize {
    if key_marker.is_empty() {
        return 0;
    }
    if let Some(i) = entries
        .iter()
        .position(|e| e.key == key_marker && e.version_id == vid_marker)
    {
        return i + 1;
    }
    entries
        .iter()
        .position(|e| e.key.as_str() > key_marker)
        .unwrap_or(entries.len())
}

fn dict_page(entries: &[FakeEntry], query: &HashMap<String, String>, page_size: usize) -> Value {
    let prefix = param(query, "prefix");
    let filtered: Vec<&FakeEntry> = entries.iter().filter(|e| e.key.starts_with(prefix)).collect();

    match param(query, "listingType") {
        "DelimiterVersions" => {
            let start = start_after(
                &filtered,
                param(query, "keyMarker"),
                param(query, "versionIdMarker"),
            );
            let end = (start + page_size).min(filtered.len());
            let page = &filtered[start..end];
            let last = page.last();
            json!({
                "Versions": page
                    .iter()
                    .map(|e| json!({ "key": e.key, "versionId": e.version_id, "value": e.value }))
                    .collect::<Vec<_>>(),
                "IsTruncated": end < filtered.len(),
                "NextKeyMarker": last.map(|e| e.key.clone()).unwrap_or_default(),
                "NextVersionIdMarker": last.map(|e| e.version_id.clone()).unwrap_or_default(),
            })
        }
        "MPU" => {
            let start = start_after(&filtered, param(query, "keyMarker"), "");
            let end = (start + page_size).min(filtered.len());
            let page = &filtered[start..end];
            let last = page.last();
            json!({
                "Uploads": page
                    .iter()
                    .map(|e| json!({ "key": e.key, "value": e.value }))
                    .collect::<Vec<_>>(),
                "IsTruncated": end < filtered.len(),
                "NextKeyMarker": last.map(|e| e.key.clone()).unwrap_or_default(),
                "NextUploadIdMarker": last
                    .and_then(|e| e.value.get("UploadId").cloned())
                    .unwrap_or(Value::String(String::new())),
            })
        }
        _ => {
            let start = start_after(&filtered, param(query, "marker"), "");
            let end = (start + page_size).min(filtered.len());
            json!({
                "Contents": filtered[start..end]
                    .iter()
                    .map(|e| json!({ "key": e.key, "value": e.value }))
                    .collect::<Vec<_>>(),
                "IsTruncated": end < filtered.len(),
            })
        }
    }
}

async fn bucket_attributes(
    Path(bucket): Path<String>,
    State(state): State<Arc<FakeState>>,
) -> Response {
    *state.hits.entry(format!("attributes:{bucket}")).or_insert(0) += 1;
    if let Some(code) = state.attribute_status.read().get(&bucket).copied() {
        return StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response();
    }
    match state.attributes.read().get(&bucket).cloned() {
        Some(v) => Json(v).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
