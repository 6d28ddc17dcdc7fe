//! 资产与属性变更事件模型。

use crate::asset::Asset;
use serde::{Deserialize, Serialize};

/// 属性引用：`(资产 ID, 属性名)`，事件的可寻址单元。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeRef {
    pub asset_id: String,
    pub attribute_name: String,
}

impl AttributeRef {
    pub fn new(asset_id: impl Into<String>, attribute_name: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            attribute_name: attribute_name.into(),
        }
    }
}

/// 属性事件来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeSource {
    #[default]
    Client,
    Internal,
    Sensor,
    Gateway,
    AttributeLinking,
}

/// 属性值变更事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeEvent {
    #[serde(rename = "ref")]
    pub attribute_ref: AttributeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
    #[serde(default)]
    pub source: AttributeSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl AttributeEvent {
    pub fn new(
        asset_id: impl Into<String>,
        attribute_name: impl Into<String>,
        value: Option<serde_json::Value>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            attribute_ref: AttributeRef::new(asset_id, attribute_name),
            value,
            timestamp_ms,
            source: AttributeSource::Client,
            realm: None,
            parent_id: None,
        }
    }

    pub fn with_source(mut self, source: AttributeSource) -> Self {
        self.source = source;
        self
    }
}

/// 资产事件类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetEventCause {
    Create,
    Update,
    Delete,
}

/// 资产结构变更事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetEvent {
    pub cause: AssetEventCause,
    pub asset: Asset,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated_properties: Vec<String>,
}

impl AssetEvent {
    pub fn new(cause: AssetEventCause, asset: Asset) -> Self {
        Self {
            cause,
            asset,
            updated_properties: Vec::new(),
        }
    }
}
