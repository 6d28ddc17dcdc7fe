//! 资产模型：租域内的资产树节点。

use crate::attribute::Attribute;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 资产 ID 固定长度（16 字节随机数的 base64url 编码）。
pub const ASSET_ID_LENGTH: usize = 22;

/// 网关资产的凭证属性名。
pub const CLIENT_ID_ATTRIBUTE: &str = "clientId";
/// 网关资产的密钥属性名。
pub const CLIENT_SECRET_ATTRIBUTE: &str = "clientSecret";
/// 网关资产的连接状态属性名。
pub const STATUS_ATTRIBUTE: &str = "status";
/// 网关资产的停用开关属性名。
pub const DISABLED_ATTRIBUTE: &str = "disabled";

/// 生成 22 字符资产 ID。
pub fn generate_asset_id() -> String {
    URL_SAFE_NO_PAD.encode(uuid::Uuid::new_v4().as_bytes())
}

/// 资产类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetType {
    Gateway,
    Agent,
    Building,
    Room,
    Device,
    Thing,
}

/// 网关连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Disabled,
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Disabled => "DISABLED",
            ConnectionStatus::Error => "ERROR",
        };
        write!(f, "{}", text)
    }
}

/// 资产：租域内树结构的一个节点。
///
/// `path` 为根到节点的 ID 列表，可由父链推导，查询时按需填充。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub version: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub realm: String,
    pub created_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Attribute>,
}

impl Asset {
    /// 构造新资产（版本 1，无父节点）。
    pub fn new(
        name: impl Into<String>,
        asset_type: AssetType,
        realm: impl Into<String>,
        created_at_ms: i64,
    ) -> Self {
        Self {
            id: generate_asset_id(),
            version: 1,
            name: name.into(),
            asset_type,
            parent_id: None,
            realm: realm.into(),
            created_at_ms,
            path: None,
            attributes: BTreeMap::new(),
        }
    }

    /// 指定父节点。
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// 读取指定名称的属性。
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// 写入属性（按名称覆盖）。
    pub fn set_attribute(&mut self, attribute: Attribute) {
        self.attributes.insert(attribute.name.clone(), attribute);
    }

    /// 读取字符串属性值。
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attribute(name)?.value.as_ref()?.as_str()
    }

    /// 读取布尔属性值（缺省 false）。
    pub fn attribute_bool(&self, name: &str) -> bool {
        self.attribute(name)
            .and_then(|attribute| attribute.value.as_ref())
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    pub fn is_gateway(&self) -> bool {
        self.asset_type == AssetType::Gateway
    }
}
