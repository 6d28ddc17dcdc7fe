//! 属性模型：资产上的命名类型值。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 常用属性元数据项名称。
pub mod meta_items {
    pub const AGENT_LINK: &str = "AGENT_LINK";
    pub const READ_ONLY: &str = "READ_ONLY";
    pub const ACCESS_PUBLIC_READ: &str = "ACCESS_PUBLIC_READ";
    pub const UNIT_TYPE: &str = "UNIT_TYPE";
}

/// 属性值类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    Boolean,
    Number,
    Text,
    GeoPoint,
    Json,
}

/// 属性：资产上最细粒度的可寻址单元。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: String,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl Attribute {
    /// 构造带值属性。
    pub fn new(
        name: impl Into<String>,
        value_type: ValueType,
        value: serde_json::Value,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            name: name.into(),
            value_type,
            value: Some(value),
            timestamp_ms,
            meta: BTreeMap::new(),
        }
    }

    /// 构造空值属性。
    pub fn empty(name: impl Into<String>, value_type: ValueType, timestamp_ms: i64) -> Self {
        Self {
            name: name.into(),
            value_type,
            value: None,
            timestamp_ms,
            meta: BTreeMap::new(),
        }
    }

    /// 添加元数据项。
    pub fn with_meta(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.insert(name.into(), value);
        self
    }
}
