use crate::error::ReindexError;

/// bucket 索引（bucket-of-buckets）
pub const USERS_BUCKET: &str = "users..bucket";
/// MPU 影子 bucket 名前缀
pub const MPU_SHADOW_BUCKET_PREFIX: &str = "mpuShadowBucket";
/// 索引 key 分隔符：`<account>..|..<bucket>`
pub const KEY_SPLITTER: &str = "..|..";

/// 被统计的 bucket（枚举后不可变）
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Bucket {
    pub account_id: String,
    pub name: String,
    pub object_lock_enabled: bool,
}

impl Bucket {
    pub fn new(account_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
            object_lock_enabled: false,
        }
    }

    pub fn with_object_lock(mut self, enabled: bool) -> Self {
        self.object_lock_enabled = enabled;
        self
    }

    /// 从 `users..bucket` 的 key 解析；格式不对返回 None
    pub fn from_index_key(key: &str) -> Option<Self> {
        let (account, name) = key.split_once(KEY_SPLITTER)?;
        if account.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(account, name))
    }

    pub fn shadow_name(&self) -> String {
        format!("{}{}", MPU_SHADOW_BUCKET_PREFIX, self.name)
    }
}

/// 进行中的 multipart upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartUpload {
    pub bucket: Bucket,
    pub key: String,
    pub upload_id: String,
}

/// 一次计数的归约结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketContents {
    pub bucket: Bucket,
    pub object_count: u64,
    pub total_size_bytes: u64,
}

/// 单个 bucket 的统计结果
///
/// 失败 / 不存在必须显式区分，调用方不能把失败当成 0 值成功。
#[derive(Debug)]
pub enum BucketOutcome {
    Counted(BucketContents),
    /// 列举失败：bucket 记为 observed，所属 account 记为 failed
    Failed(ReindexError),
    /// 枚举之后 bucket 被删除（列举 404）
    NotFound,
}

/// 枚举阶段就无法确定的 bucket（例如属性查询重试耗尽）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedBucket {
    pub name: String,
    pub account_id: Option<String>,
    pub reason: String,
}

/// 枚举器产出的一批 bucket
#[derive(Clone, Debug, Default)]
pub struct BucketBatch {
    pub buckets: Vec<Bucket>,
    pub failed: Vec<FailedBucket>,
}

impl BucketBatch {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty() && self.failed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buckets.len() + self.failed.len()
    }
}
