//! 网关互联配置 handlers
//!
//! - GET /gateway/{realm}/connections - 列出配置（至多一条）
//! - POST /gateway/{realm}/connections - 创建/替换配置并启动客户端
//! - DELETE /gateway/{realm}/connections - 删除配置并停掉客户端
//!
//! 配置以本地租域为键，每租域至多一条。

use crate::middleware::{require_permission, require_realm_context};
use crate::utils::response::{connection_to_dto, forbidden_error, gateway_error};
use crate::utils::validation::normalize_required;
use crate::AppState;
use ams_storage::GatewayConnectionRecord;
use api_contract::{ApiResponse, CreateGatewayConnectionRequest, GatewayConnectionDto};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::{permissions, RealmContext};

/// 租域路径参数
#[derive(serde::Deserialize)]
pub struct RealmPath {
    realm: String,
}

fn scoped_ctx(state: &AppState, headers: &HeaderMap, realm: &str) -> Result<RealmContext, Response> {
    let ctx = require_realm_context(state, headers)?;
    if ctx.realm != realm {
        return Err(forbidden_error());
    }
    Ok(ctx)
}

/// 列出互联配置
pub async fn list_connections(
    State(state): State<AppState>,
    Path(path): Path<RealmPath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match scoped_ctx(&state, &headers, &path.realm) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_permission(&ctx, permissions::GATEWAY_CONNECTION_READ) {
        return response;
    }
    match state.client_service.find(&ctx, &path.realm).await {
        Ok(record) => {
            let data: Vec<GatewayConnectionDto> =
                record.into_iter().map(connection_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => gateway_error(err),
    }
}

/// 创建或替换互联配置
pub async fn create_connection(
    State(state): State<AppState>,
    Path(path): Path<RealmPath>,
    headers: HeaderMap,
    Json(req): Json<CreateGatewayConnectionRequest>,
) -> Response {
    let ctx = match scoped_ctx(&state, &headers, &path.realm) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_permission(&ctx, permissions::GATEWAY_CONNECTION_WRITE) {
        return response;
    }
    let host = match normalize_required(req.host, "host") {
        Ok(value) => value,
        Err(response) => return response,
    };

    let record = GatewayConnectionRecord {
        local_realm: path.realm,
        host,
        port: req.port,
        realm: req.realm,
        client_id: req.client_id,
        client_secret: req.client_secret,
        secure: req.secure,
        disabled: req.disabled,
    };
    match state.client_service.apply(&ctx, record).await {
        Ok(stored) => (
            StatusCode::OK,
            Json(ApiResponse::success(connection_to_dto(stored))),
        )
            .into_response(),
        Err(err) => gateway_error(err),
    }
}

/// 删除互联配置
pub async fn delete_connection(
    State(state): State<AppState>,
    Path(path): Path<RealmPath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match scoped_ctx(&state, &headers, &path.realm) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_permission(&ctx, permissions::GATEWAY_CONNECTION_WRITE) {
        return response;
    }
    match state.client_service.remove(&ctx, &path.realm).await {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::success(()))).into_response(),
        Ok(false) => crate::utils::response::not_found_error(),
        Err(err) => gateway_error(err),
    }
}
