//! 资产 CRUD handlers
//!
//! 提供资产资源的增删改查接口：
//! - GET /assets - 列出资产
//! - POST /assets - 创建资产（网关后代走写穿转发）
//! - GET /assets/{id} - 获取资产详情
//! - PUT /assets/{id} - 更新资产
//! - DELETE /assets/{id} - 删除资产
//! - PUT /assets/{id}/attributes/{name} - 属性写入（经事件路由器）
//!
//! 网关语义：
//! - 创建网关资产时自动铸发 clientId/clientSecret 凭证
//! - 目标在网关之下时改道连接器写穿，网关未连接返回 409
//! - 删除网关资产连同镜像子树整体拆除

use crate::middleware::{require_permission, require_realm_context};
use crate::utils::response::{
    bad_request_error, gateway_error, not_found_error, storage_error,
};
use crate::utils::validation::{normalize_optional, normalize_required};
use crate::AppState;
use ams_gateway::{now_epoch_ms, AttributeWriteOutcome, GatewayError};
use ams_storage::StorageError;
use api_contract::{
    error_codes, ApiResponse, CreateAssetRequest, UpdateAssetRequest, WriteAttributeRequest,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::asset::{
    CLIENT_ID_ATTRIBUTE, CLIENT_SECRET_ATTRIBUTE, DISABLED_ATTRIBUTE, STATUS_ATTRIBUTE,
};
use domain::{
    permissions, Asset, AssetEvent, AssetEventCause, AssetQuery, Attribute, AttributeEvent,
    ConnectionStatus, ValueType,
};

/// 资产路径参数
#[derive(serde::Deserialize)]
pub struct AssetPath {
    asset_id: String,
}

/// 属性路径参数
#[derive(serde::Deserialize)]
pub struct AttributePath {
    asset_id: String,
    attribute_name: String,
}

/// 资产列表查询参数
#[derive(serde::Deserialize)]
pub struct AssetListParams {
    #[serde(default)]
    recursive: bool,
    parent: Option<String>,
}

/// 列出资产
///
/// `GET /assets?recursive=true&parent={id}`
pub async fn list_assets(
    State(state): State<AppState>,
    Query(params): Query<AssetListParams>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_realm_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_permission(&ctx, permissions::ASSET_READ) {
        return response;
    }

    let query = AssetQuery {
        recursive: params.recursive,
        parents: params.parent.into_iter().collect(),
        ..AssetQuery::default()
    };
    match state.asset_store.query_assets(&ctx, &query).await {
        Ok(assets) => (StatusCode::OK, Json(ApiResponse::success(assets))).into_response(),
        Err(err) => storage_error(err),
    }
}

/// 获取资产详情
pub async fn get_asset(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_realm_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_permission(&ctx, permissions::ASSET_READ) {
        return response;
    }
    match state.asset_store.find_asset(&ctx, &path.asset_id).await {
        Ok(Some(asset)) => (StatusCode::OK, Json(ApiResponse::success(asset))).into_response(),
        Ok(None) => not_found_error(),
        Err(err) => storage_error(err),
    }
}

/// 创建资产
///
/// `POST /assets`
///
/// 分三条路径：
/// 1. 父节点在某网关之下（或就是网关）→ 写穿转发给该网关，阻塞到
///    确认；网关未连接返回 409
/// 2. 创建网关资产 → 铸发凭证属性并置初始状态
/// 3. 其余 → 本地落库并广播
pub async fn create_asset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateAssetRequest>,
) -> Response {
    let ctx = match require_realm_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_permission(&ctx, permissions::ASSET_WRITE) {
        return response;
    }
    let name = match normalize_required(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };

    // 步骤 1: 父节点落在网关之下时改道写穿
    if let Some(parent_id) = &req.parent_id {
        let parent = match state.asset_store.find_asset(&ctx, parent_id).await {
            Ok(Some(parent)) => parent,
            Ok(None) => return bad_request_error("parent not found"),
            Err(err) => return storage_error(err),
        };
        let gateway_id = if parent.is_gateway() {
            Some(parent.id.clone())
        } else {
            match state.asset_store.gateway_ancestor(&ctx, parent_id).await {
                Ok(gateway_id) => gateway_id,
                Err(err) => return storage_error(err),
            }
        };
        if let Some(gateway_id) = gateway_id {
            let Some(connector) = state.gateway_service.connector(&gateway_id).await else {
                return gateway_error(GatewayError::GatewayNotConnected);
            };
            let mut request_asset = Asset::new(name, req.asset_type, ctx.realm.clone(), now_epoch_ms());
            request_asset.id = String::new();
            request_asset.parent_id = Some(parent_id.clone());
            request_asset.attributes = req.attributes;
            return match connector.forward_asset_merge(request_asset).await {
                Ok(mirrored) => {
                    (StatusCode::OK, Json(ApiResponse::success(mirrored))).into_response()
                }
                Err(err) => gateway_error(err),
            };
        }
    }

    // 步骤 2: 本地创建；网关资产铸发凭证
    let mut asset = Asset::new(name, req.asset_type, ctx.realm.clone(), now_epoch_ms());
    asset.parent_id = req.parent_id;
    asset.attributes = req.attributes;
    if asset.is_gateway() {
        let credentials = ams_auth::issue_credentials(&asset.id);
        let now = now_epoch_ms();
        asset.set_attribute(Attribute::new(
            CLIENT_ID_ATTRIBUTE,
            ValueType::Text,
            serde_json::json!(credentials.client_id),
            now,
        ));
        asset.set_attribute(Attribute::new(
            CLIENT_SECRET_ATTRIBUTE,
            ValueType::Text,
            serde_json::json!(credentials.client_secret),
            now,
        ));
        asset.set_attribute(Attribute::new(
            STATUS_ATTRIBUTE,
            ValueType::Text,
            serde_json::json!(ConnectionStatus::Disconnected.to_string()),
            now,
        ));
        asset.set_attribute(Attribute::new(
            DISABLED_ATTRIBUTE,
            ValueType::Boolean,
            serde_json::json!(false),
            now,
        ));
    }

    match state.asset_store.upsert_asset(&ctx, asset).await {
        Ok(stored) => {
            state
                .bus
                .publish_asset(AssetEvent::new(AssetEventCause::Create, stored.clone()));
            (StatusCode::OK, Json(ApiResponse::success(stored))).into_response()
        }
        Err(StorageError::ParentNotFound(parent)) => {
            bad_request_error(format!("parent not found: {parent}"))
        }
        Err(err) => storage_error(err),
    }
}

/// 更新资产
///
/// `PUT /assets/{id}`：本地资产走乐观版本检查；镜像资产写穿给网关。
pub async fn update_asset(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
    Json(req): Json<UpdateAssetRequest>,
) -> Response {
    let ctx = match require_realm_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_permission(&ctx, permissions::ASSET_WRITE) {
        return response;
    }
    let name = match normalize_optional(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };

    let mut current = match state.asset_store.find_asset(&ctx, &path.asset_id).await {
        Ok(Some(asset)) => asset,
        Ok(None) => return not_found_error(),
        Err(err) => return storage_error(err),
    };

    // 镜像资产 → 写穿（版本以网关为准）
    match state
        .asset_store
        .gateway_ancestor(&ctx, &path.asset_id)
        .await
    {
        Ok(Some(gateway_id)) => {
            let Some(connector) = state.gateway_service.connector(&gateway_id).await else {
                return gateway_error(GatewayError::GatewayNotConnected);
            };
            if let Some(name) = name {
                current.name = name;
            }
            if let Some(attributes) = req.attributes {
                current.attributes = attributes;
            }
            return match connector.forward_asset_merge(current).await {
                Ok(mirrored) => {
                    (StatusCode::OK, Json(ApiResponse::success(mirrored))).into_response()
                }
                Err(err) => gateway_error(err),
            };
        }
        Ok(None) => {}
        Err(err) => return storage_error(err),
    }

    // 本地资产：乐观版本检查
    if req.version != current.version {
        return (
            StatusCode::CONFLICT,
            Json(ApiResponse::<()>::error(
                error_codes::VERSION_CONFLICT,
                format!(
                    "asset {} is at version {}, update based on {}",
                    current.id, current.version, req.version
                ),
            )),
        )
            .into_response();
    }
    if let Some(name) = name {
        current.name = name;
    }
    if let Some(attributes) = req.attributes {
        current.attributes = attributes;
    }
    current.version += 1;
    current.path = None;

    match state.asset_store.upsert_asset(&ctx, current).await {
        Ok(stored) => {
            state
                .bus
                .publish_asset(AssetEvent::new(AssetEventCause::Update, stored.clone()));
            (StatusCode::OK, Json(ApiResponse::success(stored))).into_response()
        }
        Err(err) => storage_error(err),
    }
}

/// 删除资产
///
/// `DELETE /assets/{id}`：网关资产整体拆除；镜像资产写穿；本地资产
/// 连同子树删除（子先父后）。
pub async fn delete_asset(
    State(state): State<AppState>,
    Path(path): Path<AssetPath>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_realm_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_permission(&ctx, permissions::ASSET_WRITE) {
        return response;
    }

    let asset = match state.asset_store.find_asset(&ctx, &path.asset_id).await {
        Ok(Some(asset)) => asset,
        Ok(None) => return not_found_error(),
        Err(err) => return storage_error(err),
    };

    if asset.is_gateway() {
        return match state
            .gateway_service
            .delete_gateway(&ctx, &path.asset_id)
            .await
        {
            Ok(true) => (StatusCode::OK, Json(ApiResponse::success(()))).into_response(),
            Ok(false) => not_found_error(),
            Err(err) => gateway_error(err),
        };
    }

    match state
        .asset_store
        .gateway_ancestor(&ctx, &path.asset_id)
        .await
    {
        Ok(Some(gateway_id)) => {
            let Some(connector) = state.gateway_service.connector(&gateway_id).await else {
                return gateway_error(GatewayError::GatewayNotConnected);
            };
            return match connector.forward_asset_delete(&path.asset_id).await {
                Ok(true) => (StatusCode::OK, Json(ApiResponse::success(()))).into_response(),
                Ok(false) => not_found_error(),
                Err(err) => gateway_error(err),
            };
        }
        Ok(None) => {}
        Err(err) => return storage_error(err),
    }

    // 本地子树删除，子先父后
    let descendants = match state
        .asset_store
        .descendant_ids(&ctx, &path.asset_id)
        .await
    {
        Ok(ids) => ids,
        Err(err) => return storage_error(err),
    };
    for descendant_id in descendants.iter().rev() {
        let descendant = match state.asset_store.find_asset(&ctx, descendant_id).await {
            Ok(Some(asset)) => asset,
            Ok(None) => continue,
            Err(err) => return storage_error(err),
        };
        match state.asset_store.delete_asset(&ctx, descendant_id).await {
            Ok(true) => state
                .bus
                .publish_asset(AssetEvent::new(AssetEventCause::Delete, descendant)),
            Ok(false) => {}
            Err(err) => return storage_error(err),
        }
    }
    match state.asset_store.delete_asset(&ctx, &path.asset_id).await {
        Ok(true) => {
            state
                .bus
                .publish_asset(AssetEvent::new(AssetEventCause::Delete, asset));
            (StatusCode::OK, Json(ApiResponse::success(()))).into_response()
        }
        Ok(false) => not_found_error(),
        Err(err) => storage_error(err),
    }
}

/// 属性写入
///
/// `PUT /assets/{id}/attributes/{name}`：经事件路由器；目标在网关
/// 之下时透明改道写穿，响应 FORWARDED，镜像等网关回声再更新。
pub async fn write_attribute(
    State(state): State<AppState>,
    Path(path): Path<AttributePath>,
    headers: HeaderMap,
    Json(req): Json<WriteAttributeRequest>,
) -> Response {
    let ctx = match require_realm_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = require_permission(&ctx, permissions::ASSET_WRITE) {
        return response;
    }

    let event = AttributeEvent::new(
        path.asset_id,
        path.attribute_name,
        Some(req.value),
        req.timestamp_ms.unwrap_or_else(now_epoch_ms),
    );
    match state.event_router.write_attribute(&ctx, event).await {
        Ok(outcome) => {
            let outcome = match outcome {
                AttributeWriteOutcome::AppliedLocally => "APPLIED",
                AttributeWriteOutcome::ForwardedToGateway => "FORWARDED",
            };
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({ "outcome": outcome }))),
            )
                .into_response()
        }
        Err(err) => gateway_error(err),
    }
}
