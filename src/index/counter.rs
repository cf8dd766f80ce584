use serde_json::{Map, Value};

use crate::core::bucket::{
    Bucket, BucketContents, BucketOutcome, MultipartUpload, KEY_SPLITTER,
};
use crate::error::{ReindexError, Result};
use crate::listing::client::BucketdClient;
use crate::listing::params::{marker_from_field, marker_from_last_key, ListingParams};

const LISTING_PAGE_SIZE: u32 = 1000;
const MPU_OVERVIEW_PREFIX: &str = "overview..|..";

/// 版本去重的归约状态
///
/// bucketd 按 key 相邻、同 key 内最新版本在前的顺序返回版本；
/// 只和紧邻的上一个 key 比较，不做分组。跨页时状态保留。
#[derive(Clone, Debug, Default)]
pub struct VersionTally {
    skip_older_versions: bool,
    last_key: Option<String>,
    pub object_count: u64,
    pub total_size_bytes: u64,
}

impl VersionTally {
    pub fn new(skip_older_versions: bool) -> Self {
        Self {
            skip_older_versions,
            ..Default::default()
        }
    }

    pub fn add(&mut self, key: &str, size: u64) {
        let is_latest = self.last_key.as_deref() != Some(key);
        if is_latest {
            self.last_key = Some(key.to_string());
        }

        if self.skip_older_versions && !is_latest {
            tracing::debug!("Skipping versioned key: {}", key);
            return;
        }

        self.object_count += 1;
        self.total_size_bytes = self.total_size_bytes.saturating_add(size);
    }
}

/// 解析条目 value：v6 为对象（`Size`），v7 为 JSON 字符串（`content-length`）
pub fn object_size(bucket: &str, value: Option<&Value>) -> Result<u64> {
    match value {
        Some(Value::Object(m)) => read_size(m, "Size")
            .ok_or_else(|| ReindexError::invalid_listing(bucket, "object value without Size")),
        Some(Value::String(raw)) => {
            let md = parse_encoded(bucket, raw)?;
            read_size(&md, "content-length").ok_or_else(|| {
                ReindexError::invalid_listing(bucket, "encoded value without content-length")
            })
        }
        _ => Err(ReindexError::invalid_listing(bucket, "entry without value")),
    }
}

fn parse_encoded(bucket: &str, raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(m)) => Ok(m),
        Ok(_) => Err(ReindexError::invalid_listing(bucket, "encoded value is not an object")),
        Err(e) => Err(ReindexError::invalid_listing(bucket, format!("undecodable value: {e}"))),
    }
}

fn read_size(m: &Map<String, Value>, field: &str) -> Option<u64> {
    match m.get(field)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn entry_key<'v>(bucket: &str, entry: &'v Value) -> Result<&'v str> {
    entry
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| ReindexError::invalid_listing(bucket, "entry without key"))
}

/// 计数器：每个 worker 独占一个（含独立的 bucketd 连接）
pub struct ContentCounter {
    client: BucketdClient,
    only_latest_when_locked: bool,
}

impl ContentCounter {
    pub fn new(client: BucketdClient, only_latest_when_locked: bool) -> Self {
        Self {
            client,
            only_latest_when_locked,
        }
    }

    /// 统计 bucket 所有版本；bucket 不存在返回 None
    pub async fn count_bucket(&self, bucket: &Bucket) -> Result<Option<BucketContents>> {
        let params = ListingParams::new()
            .with("listingType", "DelimiterVersions")
            .with("maxKeys", LISTING_PAGE_SIZE)
            .with_next("keyMarker", marker_from_field("NextKeyMarker", ""))
            .with_next("versionIdMarker", marker_from_field("NextVersionIdMarker", ""));

        let skip_older = self.only_latest_when_locked && bucket.object_lock_enabled;
        let mut tally = VersionTally::new(skip_older);
        let mut pager = self.client.list(&bucket.name, params);

        while let Some((_, page)) = pager.next_page().await? {
            for entry in page.require_entries(&bucket.name, "Versions")? {
                let key = entry_key(&bucket.name, entry)?;
                let size = object_size(&bucket.name, entry.get("value"))?;
                tally.add(key, size);
            }
        }

        if pager.not_found() && pager.pages_fetched() == 0 {
            return Ok(None);
        }

        Ok(Some(BucketContents {
            bucket: bucket.clone(),
            object_count: tally.object_count,
            total_size_bytes: tally.total_size_bytes,
        }))
    }

    /// 列出影子 bucket 中进行中的 upload；影子 bucket 不存在返回空
    pub async fn list_mpus(&self, bucket: &Bucket) -> Result<Vec<MultipartUpload>> {
        let shadow = bucket.shadow_name();
        let params = ListingParams::new()
            .with("delimiter", "")
            .with("maxKeys", LISTING_PAGE_SIZE)
            .with("queryPrefixLength", 0)
            .with("listingType", "MPU")
            .with("splitter", KEY_SPLITTER)
            .with("prefix", MPU_OVERVIEW_PREFIX)
            .with_next("keyMarker", marker_from_field("NextKeyMarker", ""))
            .with_next("uploadIdMarker", marker_from_field("NextUploadIdMarker", ""));

        let mut uploads = Vec::new();
        let mut pager = self.client.list(&shadow, params);
        while let Some((_, page)) = pager.next_page().await? {
            for entry in page.require_entries(&shadow, "Uploads")? {
                let key = entry_key(&shadow, entry)?;
                let upload_id = upload_id_of(&shadow, entry.get("value"))?;
                uploads.push(MultipartUpload {
                    bucket: bucket.clone(),
                    key: key.to_string(),
                    upload_id,
                });
            }
        }
        Ok(uploads)
    }

    /// 统计一个 upload 已上传分片的字节数；分片不计入对象数
    pub async fn count_mpu_parts(&self, mpu: &MultipartUpload) -> Result<BucketContents> {
        let shadow = mpu.bucket.shadow_name();
        let first_marker = format!("{}{}00000", mpu.upload_id, KEY_SPLITTER);
        let params = ListingParams::new()
            .with("prefix", &mpu.upload_id)
            .with("delimiter", "")
            .with("maxKeys", LISTING_PAGE_SIZE)
            .with("listingType", "Delimiter")
            .with_next("marker", marker_from_last_key("Contents", first_marker));

        let mut total_size_bytes = 0u64;
        let mut pager = self.client.list(&shadow, params);
        while let Some((_, page)) = pager.next_page().await? {
            for entry in page.require_entries(&shadow, "Contents")? {
                let size = object_size(&shadow, entry.get("value"))?;
                total_size_bytes = total_size_bytes.saturating_add(size);
            }
        }

        Ok(BucketContents {
            bucket: Bucket {
                name: shadow,
                ..mpu.bucket.clone()
            },
            object_count: 0,
            total_size_bytes,
        })
    }

    /// bucket 总量 = 版本总量 + 所有进行中 upload 的分片字节
    ///
    /// 任何环节出错都整体记为该 bucket 的 InvalidListing。
    pub async fn index_bucket(&self, bucket: &Bucket) -> BucketOutcome {
        match self.try_index_bucket(bucket).await {
            Ok(Some(contents)) => BucketOutcome::Counted(contents),
            Ok(None) => BucketOutcome::NotFound,
            Err(e) => {
                tracing::error!(
                    "Error during listing. Removing from results bucket:{}: {}",
                    bucket.name,
                    e
                );
                let wrapped = match e {
                    ReindexError::InvalidListing { bucket: b, detail } if b == bucket.name => {
                        ReindexError::InvalidListing { bucket: b, detail }
                    }
                    other => ReindexError::invalid_listing(&bucket.name, other),
                };
                BucketOutcome::Failed(wrapped)
            }
        }
    }

    async fn try_index_bucket(&self, bucket: &Bucket) -> Result<Option<BucketContents>> {
        let Some(mut total) = self.count_bucket(bucket).await? else {
            return Ok(None);
        };

        let mpus = self.list_mpus(bucket).await?;
        if !mpus.is_empty() {
            tracing::debug!("Bucket {} has {} in-progress uploads", bucket.name, mpus.len());
        }
        for mpu in &mpus {
            let parts = self.count_mpu_parts(mpu).await?;
            total.total_size_bytes = total.total_size_bytes.saturating_add(parts.total_size_bytes);
        }

        Ok(Some(total))
    }
}

fn upload_id_of(shadow: &str, value: Option<&Value>) -> Result<String> {
    let id = match value {
        Some(Value::Object(m)) => m.get("UploadId").and_then(Value::as_str).map(str::to_string),
        Some(Value::String(raw)) => parse_encoded(shadow, raw)?
            .get("UploadId")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    id.ok_or_else(|| ReindexError::invalid_listing(shadow, "upload without UploadId"))
}
