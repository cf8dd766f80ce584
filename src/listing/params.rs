use std::fmt;
use std::sync::Arc;

use crate::listing::page::Page;

/// 续页函数：输入上一页（首次为 None），输出下一次请求的参数值；None 表示省略该参数
pub type NextParam = Arc<dyn Fn(Option<&Page>) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub enum ParamValue {
    Static(String),
    Next(NextParam),
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Static(v) => write!(f, "Static({v:?})"),
            ParamValue::Next(_) => write!(f, "Next(..)"),
        }
    }
}

/// 一次逻辑列举的参数集合：常量 + 续页函数
///
/// 分页驱动每次请求前调用 `resolve` 一次，所有续页函数都看到同一个上一页。
/// 这样 bucket 索引 / 版本列举 / MPU 索引 / MPU 分片共用同一个截断循环。
#[derive(Clone, Debug, Default)]
pub struct ListingParams {
    params: Vec<(&'static str, ParamValue)>,
}

impl ListingParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.push((name, ParamValue::Static(value.to_string())));
        self
    }

    pub fn with_next<F>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(Option<&Page>) -> Option<String> + Send + Sync + 'static,
    {
        self.params.push((name, ParamValue::Next(Arc::new(f))));
        self
    }

    pub fn resolve(&self, previous: Option<&Page>) -> Vec<(&'static str, String)> {
        self.params
            .iter()
            .filter_map(|(name, value)| match value {
                ParamValue::Static(v) => Some((*name, v.clone())),
                ParamValue::Next(f) => f(previous).map(|v| (*name, v)),
            })
            .collect()
    }
}

/// 续页：首次取 `initial`，之后取上一页的 `field`（缺失时为空串）
pub fn marker_from_field(
    field: &'static str,
    initial: impl Into<String>,
) -> impl Fn(Option<&Page>) -> Option<String> + Send + Sync + 'static {
    let initial = initial.into();
    move |p| match p {
        None => Some(initial.clone()),
        Some(page) => Some(page.str_field(field).unwrap_or_default().to_string()),
    }
}

/// 续页：首次取 `initial`，之后取上一页最后一个条目的 key
pub fn marker_from_last_key(
    entries_field: &'static str,
    initial: impl Into<String>,
) -> impl Fn(Option<&Page>) -> Option<String> + Send + Sync + 'static {
    let initial = initial.into();
    move |p| match p {
        None => Some(initial.clone()),
        Some(page) => Some(page.last_key(entries_field).unwrap_or_default().to_string()),
    }
}

pub fn format_params(params: &[(&'static str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
