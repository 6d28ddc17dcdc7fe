//! 路由定义
//!
//! 集中管理所有 API 路由，将路径映射到对应的 handlers。
//! 路由包括：
//! - 健康检查：/health, /livez, /readyz, /metrics
//! - 网关 token：/auth/realms/{realm}/protocol/openid-connect/token
//! - 事件通道：/websocket/events
//! - 资产管理：/assets/*
//! - 网关互联配置：/gateway/{realm}/connections

use super::handlers::*;
use super::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

/// 创建 API 路由
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .route("/metrics", get(get_metrics))
        .route(
            "/auth/realms/:realm/protocol/openid-connect/token",
            post(token_grant),
        )
        .route("/websocket/events", get(events_websocket))
        .route("/assets", get(list_assets).post(create_asset))
        .route(
            "/assets/:asset_id",
            get(get_asset).put(update_asset).delete(delete_asset),
        )
        .route(
            "/assets/:asset_id/attributes/:attribute_name",
            put(write_attribute),
        )
        .route(
            "/gateway/:realm/connections",
            get(list_connections)
                .post(create_connection)
                .delete(delete_connection),
        )
}
