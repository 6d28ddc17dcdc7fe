//! 网关服务：连接器注册表与生命周期
//!
//! 连接器映射归本服务独占持有，随服务显式创建与销毁；
//! 网关资产删除时连同镜像子树一并拆除（幂等）。

use crate::bus::EventBus;
use crate::channel::MessageChannel;
use crate::codec::DisconnectReason;
use crate::connector::{now_epoch_ms, GatewayConnector, SyncConfig};
use crate::error::GatewayError;
use ams_storage::AssetStore;
use domain::asset::{DISABLED_ATTRIBUTE, STATUS_ATTRIBUTE};
use domain::{Attribute, ConnectionStatus, RealmContext, ValueType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 每网关连接器的服务级注册表。
pub struct GatewayService {
    store: Arc<dyn AssetStore>,
    bus: EventBus,
    config: SyncConfig,
    connectors: RwLock<HashMap<String, GatewayConnector>>,
}

impl GatewayService {
    pub fn new(store: Arc<dyn AssetStore>, bus: EventBus, config: SyncConfig) -> Self {
        Self {
            store,
            bus,
            config,
            connectors: RwLock::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// 通道建立：校验网关资产后把会话交给连接器驱动。
    ///
    /// 停用的网关拒绝流量；同一网关同时只允许一条活跃会话。
    pub async fn attach(
        &self,
        gateway_id: &str,
        realm: &str,
        channel: MessageChannel,
    ) -> Result<GatewayConnector, GatewayError> {
        let ctx = RealmContext::service(realm);
        let gateway = self
            .store
            .find_asset(&ctx, gateway_id)
            .await?
            .ok_or(GatewayError::AuthFailed)?;
        if !gateway.is_gateway() || gateway.realm != realm {
            return Err(GatewayError::AuthFailed);
        }
        if gateway.attribute_bool(DISABLED_ATTRIBUTE) {
            return Err(GatewayError::GatewayDisabled);
        }

        let connector = {
            let mut connectors = self.connectors.write().await;
            if let Some(existing) = connectors.get(gateway_id) {
                if existing.session_active() {
                    return Err(GatewayError::UnsupportedOperation(
                        "gateway already connected".to_string(),
                    ));
                }
                existing.clone()
            } else {
                let connector = GatewayConnector::new(
                    gateway_id,
                    realm,
                    self.store.clone(),
                    self.bus.clone(),
                    self.config.clone(),
                );
                connectors.insert(gateway_id.to_string(), connector.clone());
                connector
            }
        };

        let runner = connector.clone();
        tokio::spawn(async move {
            runner.run(channel).await;
        });
        info!(gateway_id = %gateway_id, realm = %realm, "gateway channel attached");
        Ok(connector)
    }

    /// 查询网关的连接器。
    pub async fn connector(&self, gateway_id: &str) -> Option<GatewayConnector> {
        self.connectors.read().await.get(gateway_id).cloned()
    }

    /// 停用/启用网关。
    ///
    /// 停用：向对端发送 gateway-disconnect 并关闭通道，状态转 DISABLED，
    /// 重连在重新启用前一律拒绝。启用：状态回 DISCONNECTED 等待重连。
    pub async fn set_disabled(
        &self,
        ctx: &RealmContext,
        gateway_id: &str,
        disabled: bool,
    ) -> Result<(), GatewayError> {
        let gateway = self
            .store
            .find_asset(ctx, gateway_id)
            .await?
            .ok_or_else(|| GatewayError::AssetNotFound(gateway_id.to_string()))?;
        if !gateway.is_gateway() {
            return Err(GatewayError::UnsupportedOperation(
                "asset is not a gateway".to_string(),
            ));
        }
        self.store
            .update_attribute(
                ctx,
                gateway_id,
                Attribute::new(
                    DISABLED_ATTRIBUTE,
                    ValueType::Boolean,
                    serde_json::json!(disabled),
                    now_epoch_ms(),
                ),
            )
            .await?;

        if disabled {
            match self.connector(gateway_id).await {
                Some(connector) if connector.session_active() => {
                    connector
                        .request_disconnect(DisconnectReason::Disabled)
                        .await;
                    wait_session_end(&connector).await;
                }
                _ => {
                    self.write_status(ctx, gateway_id, ConnectionStatus::Disabled)
                        .await;
                }
            }
            info!(gateway_id = %gateway_id, "gateway disabled");
        } else {
            self.write_status(ctx, gateway_id, ConnectionStatus::Disconnected)
                .await;
            info!(gateway_id = %gateway_id, "gateway enabled, awaiting reconnection");
        }
        Ok(())
    }

    /// 删除网关：断开通道，整棵镜像子树连同连接器一并移除（幂等）。
    pub async fn delete_gateway(
        &self,
        ctx: &RealmContext,
        gateway_id: &str,
    ) -> Result<bool, GatewayError> {
        let connector = {
            let mut connectors = self.connectors.write().await;
            connectors.remove(gateway_id)
        };
        if let Some(connector) = &connector {
            connector
                .request_disconnect(DisconnectReason::Terminating)
                .await;
            wait_session_end(connector).await;
        }

        let Some(gateway) = self.store.find_asset(ctx, gateway_id).await? else {
            return Ok(false);
        };
        if !gateway.is_gateway() {
            return Err(GatewayError::UnsupportedOperation(
                "asset is not a gateway".to_string(),
            ));
        }

        if let Some(connector) = &connector {
            connector.purge_mirror().await?;
        } else {
            let descendants = self.store.descendant_ids(ctx, gateway_id).await?;
            for mirrored_id in descendants.iter().rev() {
                if let Err(err) = self.store.delete_asset(ctx, mirrored_id).await {
                    warn!(mirrored_id = %mirrored_id, error = %err, "mirror delete failed");
                }
            }
        }
        let deleted = self.store.delete_asset(ctx, gateway_id).await?;
        info!(gateway_id = %gateway_id, deleted, "gateway torn down");
        Ok(deleted)
    }

    async fn write_status(&self, ctx: &RealmContext, gateway_id: &str, status: ConnectionStatus) {
        let attribute = Attribute::new(
            STATUS_ATTRIBUTE,
            ValueType::Text,
            serde_json::json!(status.to_string()),
            now_epoch_ms(),
        );
        if let Err(err) = self.store.update_attribute(ctx, gateway_id, attribute).await {
            warn!(gateway_id = %gateway_id, error = %err, "status attribute write failed");
        }
    }
}

/// 等待会话退出（有界轮询，通道关闭后很快返回）。
async fn wait_session_end(connector: &GatewayConnector) {
    for _ in 0..200 {
        if !connector.session_active() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    warn!(gateway_id = %connector.gateway_id(), "session did not end in time");
}
