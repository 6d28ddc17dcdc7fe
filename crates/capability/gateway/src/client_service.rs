//! 网关客户端服务：反向互联
//!
//! 让本管理端作为另一管理端的网关：每条互联配置对应一个 §客户端
//! 实例，把配置租域整体向上镜像。以本地租域为键，每租域至多一个
//! 活跃客户端；配置归本服务独占持有，显式装载与停机。

use crate::bus::EventBus;
use crate::client::{GatewayClient, GatewayClientConfig};
use crate::error::GatewayError;
use ams_config::AppConfig;
use ams_storage::{AssetStore, GatewayConnectionRecord, GatewayConnectionStore};
use domain::RealmContext;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct RunningClient {
    task: JoinHandle<()>,
}

/// 反向互联客户端的服务级注册表。
pub struct GatewayClientService {
    connections: Arc<dyn GatewayConnectionStore>,
    asset_store: Arc<dyn AssetStore>,
    bus: EventBus,
    app_config: AppConfig,
    running: RwLock<HashMap<String, RunningClient>>,
}

impl GatewayClientService {
    pub fn new(
        connections: Arc<dyn GatewayConnectionStore>,
        asset_store: Arc<dyn AssetStore>,
        bus: EventBus,
        app_config: AppConfig,
    ) -> Self {
        Self {
            connections,
            asset_store,
            bus,
            app_config,
            running: RwLock::new(HashMap::new()),
        }
    }

    /// 启动时装载全部已存配置。
    pub async fn load_all(&self) -> Result<(), GatewayError> {
        let records = self.connections.list_connections().await?;
        for record in records {
            let local_realm = record.local_realm.clone();
            if let Err(err) = self.spawn_client(record).await {
                warn!(local_realm = %local_realm, error = %err, "gateway client start failed");
            }
        }
        Ok(())
    }

    /// 创建或替换一条互联配置并（未停用时）启动客户端。
    pub async fn apply(
        &self,
        ctx: &RealmContext,
        record: GatewayConnectionRecord,
    ) -> Result<GatewayConnectionRecord, GatewayError> {
        let stored = self.connections.upsert_connection(ctx, record).await?;
        self.stop_client(&stored.local_realm).await;
        if !stored.disabled {
            self.spawn_client(stored.clone()).await?;
        }
        Ok(stored)
    }

    /// 查找本地租域的互联配置。
    pub async fn find(
        &self,
        ctx: &RealmContext,
        local_realm: &str,
    ) -> Result<Option<GatewayConnectionRecord>, GatewayError> {
        Ok(self.connections.find_connection(ctx, local_realm).await?)
    }

    /// 删除互联配置并停掉客户端。
    pub async fn remove(&self, ctx: &RealmContext, local_realm: &str) -> Result<bool, GatewayError> {
        self.stop_client(local_realm).await;
        Ok(self.connections.delete_connection(ctx, local_realm).await?)
    }

    /// 客户端是否在运行。
    pub async fn is_running(&self, local_realm: &str) -> bool {
        self.running.read().await.contains_key(local_realm)
    }

    /// 停机：停掉全部客户端。
    pub async fn shutdown(&self) {
        let mut running = self.running.write().await;
        for (local_realm, client) in running.drain() {
            client.task.abort();
            info!(local_realm = %local_realm, "gateway client stopped");
        }
    }

    async fn spawn_client(&self, record: GatewayConnectionRecord) -> Result<(), GatewayError> {
        let local_realm = record.local_realm.clone();
        let client_config = GatewayClientConfig::from_record(&record, &self.app_config);
        let client = GatewayClient::new(
            client_config,
            self.asset_store.clone(),
            self.bus.clone(),
            local_realm.clone(),
        );
        let task = tokio::spawn(async move {
            client.run().await;
        });
        let mut running = self.running.write().await;
        if let Some(previous) = running.insert(local_realm.clone(), RunningClient { task }) {
            previous.task.abort();
        }
        info!(local_realm = %local_realm, "gateway client started");
        Ok(())
    }

    async fn stop_client(&self, local_realm: &str) {
        let mut running = self.running.write().await;
        if let Some(client) = running.remove(local_realm) {
            client.task.abort();
            info!(local_realm = %local_realm, "gateway client stopped");
        }
    }
}
