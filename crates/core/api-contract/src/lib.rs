//! 稳定的 DTO 与 API 响应契约。

use domain::{AssetType, Attribute};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 稳定错误码清单（跨前后端对齐）。
pub mod error_codes {
    pub const AUTH_UNAUTHORIZED: &str = "AUTH.UNAUTHORIZED";
    pub const AUTH_FORBIDDEN: &str = "AUTH.FORBIDDEN";
    pub const INVALID_REQUEST: &str = "INVALID.REQUEST";
    pub const RESOURCE_NOT_FOUND: &str = "RESOURCE.NOT_FOUND";
    pub const INTERNAL_ERROR: &str = "INTERNAL.ERROR";
    pub const GATEWAY_NOT_CONNECTED: &str = "GATEWAY.NOT_CONNECTED";
    pub const GATEWAY_TIMEOUT: &str = "GATEWAY.TIMEOUT";
    pub const UNSUPPORTED_OPERATION: &str = "GATEWAY.UNSUPPORTED_OPERATION";
    pub const VERSION_CONFLICT: &str = "ASSET.VERSION_CONFLICT";
}

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 资产创建请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
}

/// 资产更新请求体（带乐观版本号）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssetRequest {
    pub version: i64,
    pub name: Option<String>,
    pub attributes: Option<BTreeMap<String, Attribute>>,
}

/// 属性写入请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteAttributeRequest {
    pub value: serde_json::Value,
    pub timestamp_ms: Option<i64>,
}

/// 网关互联配置创建/替换请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGatewayConnectionRequest {
    pub host: String,
    pub port: u16,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub disabled: bool,
}

/// 网关互联配置返回结构（不回显密钥）。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConnectionDto {
    pub local_realm: String,
    pub host: String,
    pub port: u16,
    pub realm: String,
    pub client_id: String,
    pub secure: bool,
    pub disabled: bool,
}

/// OAuth2 client-credentials 授权请求体（表单）。
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
}

/// OAuth2 token 响应体。
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}
