//! 网关客户端：网关一侧的连接器镜像
//!
//! 认证取 token，建立 WebSocket，回答清单与批量读取请求，推送本地
//! 资产/属性事件，应用管理端写穿并回传回声。失败后指数退避重连
//! （初始 2s，翻倍，封顶 60s）。
//!
//! 协议逻辑只面对通道队列（`run_session`），传输泵单独搬运套接字，
//! 测试据此用内存通道对直接对接连接器。

use crate::bus::EventBus;
use crate::channel::{in_memory_pair, MessageChannel};
use crate::codec::{
    self, encode_envelope, encode_event, Decoded, DisconnectReason, Envelope, SharedEvent,
};
use crate::connector::event_name;
use crate::error::GatewayError;
use crate::reconciler::attribute_from_event;
use ams_config::AppConfig;
use ams_storage::{AssetStore, GatewayConnectionRecord};
use ams_telemetry::{record_dropped_unknown_event, record_protocol_violation};
use async_trait::async_trait;
use domain::{
    Asset, AssetEvent, AssetEventCause, AttributeEvent, AttributeSource, RealmContext,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// 网关客户端配置。
#[derive(Debug, Clone)]
pub struct GatewayClientConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    /// 上级管理端里网关资产所在的租域
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub queue_capacity: usize,
}

impl GatewayClientConfig {
    /// 从互联配置记录构造。
    pub fn from_record(record: &GatewayConnectionRecord, config: &AppConfig) -> Self {
        Self {
            host: record.host.clone(),
            port: record.port,
            secure: record.secure,
            realm: record.realm.clone(),
            client_id: record.client_id.clone(),
            client_secret: record.client_secret.clone(),
            initial_backoff: Duration::from_millis(config.reconnect_initial_backoff_ms),
            max_backoff: Duration::from_millis(config.reconnect_max_backoff_ms),
            queue_capacity: config.event_queue_capacity,
        }
    }

    /// token 端点地址。
    pub fn token_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!(
            "{}://{}:{}/auth/realms/{}/protocol/openid-connect/token",
            scheme, self.host, self.port, self.realm
        )
    }

    /// 事件通道地址。
    pub fn events_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!(
            "{}://{}:{}/websocket/events?Auth-Realm={}",
            scheme, self.host, self.port, self.realm
        )
    }
}

/// 会话终止方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTermination {
    ChannelClosed,
    PeerDisconnect(DisconnectReason),
}

/// 上级写穿的落地策略。
///
/// 返回 `Some(echo)` 表示设备立即确认，客户端落库并回传回声；
/// 返回 `None` 表示等设备自行上报（届时经本地总线回传）。
#[async_trait]
pub trait AttributeWriteHandler: Send + Sync {
    async fn handle(&self, event: &AttributeEvent) -> Result<Option<AttributeEvent>, GatewayError>;
}

/// 默认策略：立即确认，回声保持原值与时间戳。
pub struct ImmediateWriteHandler;

#[async_trait]
impl AttributeWriteHandler for ImmediateWriteHandler {
    async fn handle(&self, event: &AttributeEvent) -> Result<Option<AttributeEvent>, GatewayError> {
        Ok(Some(event.clone().with_source(AttributeSource::Sensor)))
    }
}

/// 不确认策略：写入停在设备协议层，等待独立的传感上报。
pub struct DeferredWriteHandler;

#[async_trait]
impl AttributeWriteHandler for DeferredWriteHandler {
    async fn handle(&self, _event: &AttributeEvent) -> Result<Option<AttributeEvent>, GatewayError> {
        Ok(None)
    }
}

#[derive(Deserialize)]
struct TokenReply {
    access_token: String,
}

/// 网关客户端。
pub struct GatewayClient {
    config: GatewayClientConfig,
    store: Arc<dyn AssetStore>,
    bus: EventBus,
    local_realm: String,
    write_handler: Arc<dyn AttributeWriteHandler>,
}

impl GatewayClient {
    pub fn new(
        config: GatewayClientConfig,
        store: Arc<dyn AssetStore>,
        bus: EventBus,
        local_realm: impl Into<String>,
    ) -> Self {
        Self {
            config,
            store,
            bus,
            local_realm: local_realm.into(),
            write_handler: Arc::new(ImmediateWriteHandler),
        }
    }

    /// 替换写穿策略（设备协议决定）。
    pub fn with_write_handler(mut self, handler: Arc<dyn AttributeWriteHandler>) -> Self {
        self.write_handler = handler;
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// 连接并保持会话，断开后指数退避重连。
    pub async fn run(&self) {
        let mut backoff = self.config.initial_backoff;
        loop {
            match self.connect_and_run().await {
                Ok(SessionTermination::PeerDisconnect(DisconnectReason::Disabled)) => {
                    info!("manager disabled this gateway, stopping reconnection");
                    return;
                }
                Ok(end) => {
                    debug!(end = ?end, "gateway session ended");
                    backoff = self.config.initial_backoff;
                }
                Err(err) => {
                    warn!(error = %err, "gateway client session failed");
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }

    async fn connect_and_run(&self) -> Result<SessionTermination, GatewayError> {
        let token = self.fetch_token().await?;
        let mut request = self
            .config
            .events_url()
            .into_client_request()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        request.headers_mut().insert(header::AUTHORIZATION, bearer);

        let (socket, _) = connect_async(request)
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        info!(url = %self.config.events_url(), "connected to manager");

        let (pump_side, session_side) = in_memory_pair(self.config.queue_capacity);
        let pump = tokio::spawn(pump_socket(socket, pump_side));
        let outcome = self.run_session(session_side).await;
        pump.abort();
        outcome
    }

    /// OAuth2 client-credentials 取 token。
    async fn fetch_token(&self) -> Result<String, GatewayError> {
        let response = reqwest::Client::new()
            .post(self.config.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        if response.status().as_u16() == 401 || response.status().as_u16() == 403 {
            return Err(GatewayError::AuthFailed);
        }
        if !response.status().is_success() {
            return Err(GatewayError::Transport(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let reply: TokenReply = response
            .json()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(reply.access_token)
    }

    /// 在给定通道上驱动一次会话（协议逻辑，无传输）。
    pub async fn run_session(
        &self,
        channel: MessageChannel,
    ) -> Result<SessionTermination, GatewayError> {
        let MessageChannel {
            outbound,
            mut inbound,
        } = channel;
        let mut attribute_rx = self.bus.subscribe_attributes();
        let mut asset_rx = self.bus.subscribe_assets();

        loop {
            tokio::select! {
                maybe = inbound.recv() => match maybe {
                    None => return Ok(SessionTermination::ChannelClosed),
                    Some(text) => {
                        if let Some(end) = self.handle_frame(&outbound, &text).await? {
                            return Ok(end);
                        }
                    }
                },
                received = attribute_rx.recv() => match received {
                    Ok(event) => {
                        self.send_event(&outbound, SharedEvent::Attribute(event)).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "attribute bus lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Ok(SessionTermination::ChannelClosed);
                    }
                },
                received = asset_rx.recv() => match received {
                    Ok(event) => {
                        self.send_event(&outbound, SharedEvent::Asset(event)).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "asset bus lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Ok(SessionTermination::ChannelClosed);
                    }
                },
            }
        }
    }

    async fn handle_frame(
        &self,
        outbound: &mpsc::Sender<String>,
        text: &str,
    ) -> Result<Option<SessionTermination>, GatewayError> {
        match codec::decode_frame(text) {
            Ok(Decoded::Envelope(envelope)) => {
                let response = self.answer_request(envelope.event).await;
                let frame = encode_envelope(&Envelope {
                    message_id: envelope.message_id,
                    event: response,
                })?;
                outbound
                    .send(frame)
                    .await
                    .map_err(|_| GatewayError::Disconnected)?;
                Ok(None)
            }
            Ok(Decoded::Event(SharedEvent::Attribute(event))) => {
                self.apply_write_through(event).await;
                Ok(None)
            }
            Ok(Decoded::Event(SharedEvent::GatewayDisconnect { reason })) => {
                info!(reason = ?reason, "manager requested disconnect");
                Ok(Some(SessionTermination::PeerDisconnect(reason)))
            }
            Ok(Decoded::Event(other)) => {
                warn!(event = event_name(&other), "unexpected event from manager, dropped");
                Ok(None)
            }
            Ok(Decoded::Unknown { event_type }) => {
                warn!(event_type = %event_type, "unknown event type dropped");
                record_dropped_unknown_event();
                Ok(None)
            }
            Err(err) => {
                error!(error = %err, "malformed frame from manager");
                record_protocol_violation();
                Err(err)
            }
        }
    }

    /// 回答管理端的请求信封。
    async fn answer_request(&self, event: SharedEvent) -> SharedEvent {
        match event {
            SharedEvent::ReadAssets { query } => {
                let ctx = self.service_ctx();
                // 租域由本地上下文决定，不接受对端指定
                let query = domain::AssetQuery {
                    realm: None,
                    ..query
                };
                match self.store.query_assets(&ctx, &query).await {
                    Ok(assets) => SharedEvent::Assets { assets },
                    Err(err) => SharedEvent::Rejected {
                        reason: err.to_string(),
                    },
                }
            }
            SharedEvent::MergeAsset { asset } => match self.apply_merge(asset).await {
                Ok(echo) => SharedEvent::Asset(echo),
                Err(err) => SharedEvent::Rejected {
                    reason: err.to_string(),
                },
            },
            SharedEvent::DeleteAsset { asset_id } => match self.local_delete(&asset_id).await {
                Ok(deleted) => SharedEvent::DeleteAssetResult { asset_id, deleted },
                Err(err) => SharedEvent::Rejected {
                    reason: err.to_string(),
                },
            },
            other => SharedEvent::Rejected {
                reason: format!("unsupported request: {}", event_name(&other)),
            },
        }
    }

    /// 应用管理端写穿的创建/更新，返回回声事件。
    async fn apply_merge(&self, mut asset: Asset) -> Result<AssetEvent, GatewayError> {
        let ctx = self.service_ctx();
        asset.realm = self.local_realm.clone();
        asset.path = None;
        let existing = self.store.find_asset(&ctx, &asset.id).await?;
        let cause = if existing.is_some() {
            AssetEventCause::Update
        } else {
            AssetEventCause::Create
        };
        asset.version = existing.map(|current| current.version + 1).unwrap_or(1);
        let stored = self.store.upsert_asset(&ctx, asset).await?;
        let event = AssetEvent::new(cause, stored);
        self.bus.publish_asset(event.clone());
        Ok(event)
    }

    /// 上级属性写穿：交设备协议策略处理，确认后落库回传。
    async fn apply_write_through(&self, event: AttributeEvent) {
        match self.write_handler.handle(&event).await {
            Ok(Some(echo)) => {
                if let Err(err) = self.local_write(echo).await {
                    warn!(error = %err, "write-through apply failed");
                }
            }
            Ok(None) => {
                debug!(
                    attribute = %event.attribute_ref.attribute_name,
                    "write-through held, awaiting device report"
                );
            }
            Err(err) => warn!(error = %err, "write-through handler failed"),
        }
    }

    // ------------------------------------------------------------------
    // 本地变更入口（设备协议/本地管理调用；落库并广播）
    // ------------------------------------------------------------------

    /// 本地创建或更新资产。
    pub async fn local_upsert(&self, mut asset: Asset) -> Result<Asset, GatewayError> {
        let ctx = self.service_ctx();
        asset.realm = self.local_realm.clone();
        let existing = self.store.find_asset(&ctx, &asset.id).await?;
        let cause = if existing.is_some() {
            AssetEventCause::Update
        } else {
            AssetEventCause::Create
        };
        asset.version = existing.map(|current| current.version + 1).unwrap_or(1);
        let stored = self.store.upsert_asset(&ctx, asset).await?;
        self.bus.publish_asset(AssetEvent::new(cause, stored.clone()));
        Ok(stored)
    }

    /// 本地删除资产子树（子先父后）。
    pub async fn local_delete(&self, asset_id: &str) -> Result<bool, GatewayError> {
        let ctx = self.service_ctx();
        let Some(root) = self.store.find_asset(&ctx, asset_id).await? else {
            return Ok(false);
        };
        let descendants = self.store.descendant_ids(&ctx, asset_id).await?;
        for descendant_id in descendants.iter().rev() {
            if let Some(descendant) = self.store.find_asset(&ctx, descendant_id).await? {
                if self.store.delete_asset(&ctx, descendant_id).await? {
                    self.bus
                        .publish_asset(AssetEvent::new(AssetEventCause::Delete, descendant));
                }
            }
        }
        let deleted = self.store.delete_asset(&ctx, asset_id).await?;
        if deleted {
            self.bus
                .publish_asset(AssetEvent::new(AssetEventCause::Delete, root));
        }
        Ok(deleted)
    }

    /// 本地属性写入（传感上报/设备回声）。
    ///
    /// 同时抬升资产版本号：断线期间的属性漂移靠清单里的版本差在
    /// 重连再同步时被发现。
    pub async fn local_write(&self, event: AttributeEvent) -> Result<(), GatewayError> {
        let ctx = self.service_ctx();
        let mut asset = self
            .store
            .find_asset(&ctx, &event.attribute_ref.asset_id)
            .await?
            .ok_or_else(|| GatewayError::AssetNotFound(event.attribute_ref.asset_id.clone()))?;
        let attribute = attribute_from_event(Some(&asset), &event);
        asset.set_attribute(attribute);
        asset.version += 1;
        asset.path = None;
        self.store.upsert_asset(&ctx, asset).await?;
        self.bus.publish_attribute(event);
        Ok(())
    }

    async fn send_event(
        &self,
        outbound: &mpsc::Sender<String>,
        event: SharedEvent,
    ) -> Result<(), GatewayError> {
        let frame = encode_event(&event)?;
        outbound
            .send(frame)
            .await
            .map_err(|_| GatewayError::Disconnected)
    }

    fn service_ctx(&self) -> RealmContext {
        RealmContext::service(&self.local_realm)
    }
}

/// 传输泵：套接字与通道队列之间的搬运。
async fn pump_socket(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    channel: MessageChannel,
) {
    let MessageChannel {
        outbound,
        mut inbound,
    } = channel;
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            maybe = stream.next() => match maybe {
                Some(Ok(Message::Text(text))) => {
                    // 入站队列满时在此等待，套接字不再被读
                    if outbound.send(text).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "websocket read failed");
                    break;
                }
            },
            maybe = inbound.recv() => match maybe {
                Some(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}
