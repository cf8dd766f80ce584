use serde_json::{Map, Value};

use crate::error::{ReindexError, Result};

/// bucketd 的一页列举结果
///
/// bucketd 有两种响应形态：
/// - dict：`{Contents|Versions|Uploads: [...], IsTruncated, NextKeyMarker, ...}`
/// - 裸数组：`[...]`，空数组表示结束
///
/// 在解析边界统一成 `Page`，上层只通过访问器读取，不感知形态差异。
#[derive(Clone, Debug, PartialEq)]
pub enum Page {
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

impl Page {
    /// 非 JSON / 标量 JSON 都视为 InvalidListing
    pub fn parse(bucket: &str, body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ReindexError::invalid_listing(bucket, format!("malformed body: {e}")))?;
        Self::from_value(bucket, value)
    }

    pub fn from_value(bucket: &str, value: Value) -> Result<Self> {
        match value {
            Value::Object(m) => Ok(Page::Object(m)),
            Value::Array(v) => Ok(Page::Array(v)),
            other => Err(ReindexError::invalid_listing(
                bucket,
                format!("unexpected payload type: {other}"),
            )),
        }
    }

    pub fn is_truncated(&self) -> bool {
        match self {
            Page::Object(m) => m.get("IsTruncated").and_then(Value::as_bool).unwrap_or(false),
            Page::Array(v) => !v.is_empty(),
        }
    }

    /// 条目列表：dict 取 `field`，裸数组取自身；dict 缺字段返回 None
    pub fn entries(&self, field: &str) -> Option<&[Value]> {
        match self {
            Page::Object(m) => m.get(field).and_then(Value::as_array).map(Vec::as_slice),
            Page::Array(v) => Some(v.as_slice()),
        }
    }

    /// 同 `entries`，但缺字段时报 InvalidListing
    pub fn require_entries(&self, bucket: &str, field: &str) -> Result<&[Value]> {
        self.entries(field)
            .ok_or_else(|| ReindexError::invalid_listing(bucket, format!("missing {field}")))
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        match self {
            Page::Object(m) => m.get(name).and_then(Value::as_str),
            Page::Array(_) => None,
        }
    }

    /// 本页最后一个条目的 `key`
    pub fn last_key(&self, field: &str) -> Option<&str> {
        self.entries(field)?
            .last()?
            .get("key")
            .and_then(Value::as_str)
    }
}
