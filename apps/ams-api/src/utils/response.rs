//! HTTP 响应辅助函数和 DTO 转换
//!
//! 设计原则：
//! - 所有错误返回统一的 ApiResponse 格式
//! - HTTP 状态码与错误码对应；网关未连接映射 409

use ams_auth::AuthError;
use ams_gateway::GatewayError;
use ams_storage::{GatewayConnectionRecord, StorageError};
use api_contract::{error_codes, ApiResponse, GatewayConnectionDto};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// 认证错误响应
pub fn auth_error(status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()>::error(
            error_codes::AUTH_UNAUTHORIZED,
            "unauthorized",
        )),
    )
        .into_response()
}

/// 禁止访问错误响应
pub fn forbidden_error() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(ApiResponse::<()>::error(
            error_codes::AUTH_FORBIDDEN,
            "forbidden",
        )),
    )
        .into_response()
}

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(
            error_codes::INVALID_REQUEST,
            message.into(),
        )),
    )
        .into_response()
}

/// 资源未找到错误响应
pub fn not_found_error() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(
            error_codes::RESOURCE_NOT_FOUND,
            "not found",
        )),
    )
        .into_response()
}

/// 认证内部错误响应
pub fn internal_auth_error(err: AuthError) -> Response {
    tracing::error!(error = ?err, "internal auth error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error(
            error_codes::INTERNAL_ERROR,
            "internal error",
        )),
    )
        .into_response()
}

/// 存储错误响应
pub fn storage_error(err: StorageError) -> Response {
    match &err {
        StorageError::VersionConflict { .. } => (
            StatusCode::CONFLICT,
            Json(ApiResponse::<()>::error(
                error_codes::VERSION_CONFLICT,
                err.to_string(),
            )),
        )
            .into_response(),
        StorageError::Scope(_) => forbidden_error(),
        _ => {
            tracing::error!(error = %err, "storage error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(
                    error_codes::INTERNAL_ERROR,
                    "internal error",
                )),
            )
                .into_response()
        }
    }
}

/// 网关同步错误响应
pub fn gateway_error(err: GatewayError) -> Response {
    match err {
        GatewayError::GatewayNotConnected | GatewayError::GatewayDisabled => (
            StatusCode::CONFLICT,
            Json(ApiResponse::<()>::error(
                error_codes::GATEWAY_NOT_CONNECTED,
                err.to_string(),
            )),
        )
            .into_response(),
        GatewayError::UnsupportedOperation(message) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(
                error_codes::UNSUPPORTED_OPERATION,
                message,
            )),
        )
            .into_response(),
        GatewayError::AssetNotFound(_) => not_found_error(),
        GatewayError::Timeout(what) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(ApiResponse::<()>::error(error_codes::GATEWAY_TIMEOUT, what)),
        )
            .into_response(),
        GatewayError::AuthFailed => auth_error(StatusCode::UNAUTHORIZED),
        GatewayError::Storage(err) => storage_error(err),
        other => {
            tracing::error!(error = %other, "gateway error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(
                    error_codes::INTERNAL_ERROR,
                    "internal error",
                )),
            )
                .into_response()
        }
    }
}

/// GatewayConnectionRecord 转 GatewayConnectionDto（不回显密钥）
pub fn connection_to_dto(record: GatewayConnectionRecord) -> GatewayConnectionDto {
    GatewayConnectionDto {
        local_realm: record.local_realm,
        host: record.host,
        port: record.port,
        realm: record.realm,
        client_id: record.client_id,
        secure: record.secure,
        disabled: record.disabled,
    }
}
