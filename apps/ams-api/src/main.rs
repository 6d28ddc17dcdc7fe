//! AMS 管理端应用：装配存储、认证、网关同步服务与 HTTP/WebSocket 面。

mod handlers;
mod middleware;
mod routes;
mod utils;

use ams_auth::{GatewayAuthService, JwtManager};
use ams_config::AppConfig;
use ams_gateway::{EventBus, EventRouter, GatewayClientService, GatewayService, SyncConfig};
use ams_storage::{
    connect_pool, AssetStore, GatewayConnectionStore, InMemoryAssetStore,
    InMemoryGatewayConnectionStore, PgAssetStore, PgGatewayConnectionStore,
};
use ams_telemetry::init_tracing;
use std::sync::Arc;
use tracing::{info, warn};

/// 应用共享状态。
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub asset_store: Arc<dyn AssetStore>,
    pub auth: Arc<GatewayAuthService>,
    pub gateway_service: Arc<GatewayService>,
    pub client_service: Arc<GatewayClientService>,
    pub event_router: Arc<EventRouter>,
    pub bus: EventBus,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    // 存储后端：配置了数据库走 Postgres，否则内存（演示/测试）
    let (asset_store, connection_store): (
        Arc<dyn AssetStore>,
        Arc<dyn GatewayConnectionStore>,
    ) = match &config.database_url {
        Some(database_url) => {
            let pool = connect_pool(database_url).await?;
            info!("using postgres asset store");
            (
                Arc::new(PgAssetStore::new(pool.clone())),
                Arc::new(PgGatewayConnectionStore::new(pool)),
            )
        }
        None => {
            warn!("AMS_DATABASE_URL not set, using in-memory stores");
            (
                Arc::new(InMemoryAssetStore::new()),
                Arc::new(InMemoryGatewayConnectionStore::new()),
            )
        }
    };

    let bus = EventBus::new();
    let jwt = JwtManager::new(config.jwt_secret.clone(), config.jwt_access_ttl_seconds);
    let auth = Arc::new(GatewayAuthService::new(asset_store.clone(), jwt));
    let gateway_service = Arc::new(GatewayService::new(
        asset_store.clone(),
        bus.clone(),
        SyncConfig::from_app_config(&config),
    ));
    let client_service = Arc::new(GatewayClientService::new(
        connection_store,
        asset_store.clone(),
        bus.clone(),
        config.clone(),
    ));
    if let Err(err) = client_service.load_all().await {
        warn!(error = %err, "gateway client preload failed");
    }
    let event_router = Arc::new(EventRouter::new(
        asset_store.clone(),
        bus.clone(),
        gateway_service.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        asset_store,
        auth,
        gateway_service,
        client_service,
        event_router,
        bus,
    };

    let app = routes::create_api_router()
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::request_context));

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(addr = %config.http_addr, "ams-api listening");
    axum::serve(listener, app).await?;
    Ok(())
}
