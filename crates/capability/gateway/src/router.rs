//! 事件路由：本地属性写入的改道
//!
//! 目标资产的祖先链含网关资产时，事件改道给该网关的连接器而不落
//! 本地——对提交方透明；网关随后的传感回声会更新镜像并以 GATEWAY
//! 来源发出常规本地事件。其余写入照常落库并广播。

use crate::bus::EventBus;
use crate::error::GatewayError;
use crate::reconciler::attribute_from_event;
use crate::service::GatewayService;
use ams_storage::AssetStore;
use domain::asset::DISABLED_ATTRIBUTE;
use domain::{AttributeEvent, RealmContext};
use std::sync::Arc;
use tracing::debug;

/// 写入落点。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeWriteOutcome {
    /// 本地应用并广播
    AppliedLocally,
    /// 已改道给网关，等待回声
    ForwardedToGateway,
}

/// 本地属性写入路由器。
pub struct EventRouter {
    store: Arc<dyn AssetStore>,
    bus: EventBus,
    service: Arc<GatewayService>,
}

impl EventRouter {
    pub fn new(store: Arc<dyn AssetStore>, bus: EventBus, service: Arc<GatewayService>) -> Self {
        Self {
            store,
            bus,
            service,
        }
    }

    /// 路由一次本地属性写入。
    pub async fn write_attribute(
        &self,
        ctx: &RealmContext,
        mut event: AttributeEvent,
    ) -> Result<AttributeWriteOutcome, GatewayError> {
        let asset_id = event.attribute_ref.asset_id.clone();
        let asset = self
            .store
            .find_asset(ctx, &asset_id)
            .await?
            .ok_or_else(|| GatewayError::AssetNotFound(asset_id.clone()))?;

        // 网关资产自身的停用开关走服务层
        if asset.is_gateway() && event.attribute_ref.attribute_name == DISABLED_ATTRIBUTE {
            let disabled = event
                .value
                .as_ref()
                .and_then(|value| value.as_bool())
                .unwrap_or(false);
            self.service.set_disabled(ctx, &asset.id, disabled).await?;
            return Ok(AttributeWriteOutcome::AppliedLocally);
        }

        // 祖先链含网关 → 镜像资产，改道连接器
        if let Some(gateway_id) = self.store.gateway_ancestor(ctx, &asset_id).await? {
            let connector = self
                .service
                .connector(&gateway_id)
                .await
                .ok_or(GatewayError::GatewayNotConnected)?;
            connector.forward_attribute_event(event).await?;
            debug!(asset_id = %asset_id, gateway_id = %gateway_id, "attribute write diverted");
            return Ok(AttributeWriteOutcome::ForwardedToGateway);
        }

        // 本地资产：落库并广播
        let attribute = attribute_from_event(Some(&asset), &event);
        self.store.update_attribute(ctx, &asset_id, attribute).await?;
        event.realm = Some(asset.realm.clone());
        event.parent_id = asset.parent_id.clone();
        self.bus.publish_attribute(event);
        Ok(AttributeWriteOutcome::AppliedLocally)
    }
}
