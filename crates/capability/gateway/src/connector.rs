//! 网关连接器：管理端一侧的每网关状态机
//!
//! 会话流程：通道建立 → CONNECTING，发清单请求 → 分批调和清单
//! （同步中段的增删改按依赖顺序消化）→ CONNECTED 稳态转发。
//! 任何 I/O 失败回到 CONNECTING 等待重连，镜像子树原样保留；
//! 帧损坏进入 ERROR 并关闭通道。
//!
//! 出站写与入站读分属两个任务，通过有界队列协作；协议动作由会话
//! 任务串行驱动（单写者纪律），跨 await 不持进程级锁。

use crate::bus::EventBus;
use crate::codec::{
    self, encode_envelope, encode_event, Decoded, DisconnectReason, Envelope, SharedEvent,
    ASSET_READ_BATCH_PREFIX, ASSET_READ_MESSAGE_ID,
};
use crate::correlator::{await_response, RequestCorrelator};
use crate::error::GatewayError;
use crate::id_map::IdMap;
use crate::reconciler::{attribute_from_event, MirrorReconciler};
use ams_config::AppConfig;
use ams_storage::AssetStore;
use ams_telemetry::{
    record_backpressure, record_dropped_unknown_event, record_event_applied,
    record_event_forwarded, record_gateway_connect, record_gateway_disconnect,
    record_protocol_violation, record_sync_batch, record_sync_round,
};
use domain::asset::STATUS_ATTRIBUTE;
use domain::{
    Asset, AssetEventCause, Attribute, AttributeEvent, AttributeSource, AssetQuery,
    ConnectionStatus, RealmContext, ValueType,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// 获取当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// 同步协议参数。
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 清单同步批大小
    pub batch_size: usize,
    /// 批量读取超时
    pub read_timeout: Duration,
    /// 写转发超时
    pub forward_timeout: Duration,
    /// 入站事件队列容量
    pub event_queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            read_timeout: Duration::from_secs(10),
            forward_timeout: Duration::from_secs(5),
            event_queue_capacity: 10_000,
        }
    }
}

impl SyncConfig {
    /// 从应用配置构造。
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.sync_batch_size,
            read_timeout: Duration::from_secs(config.sync_read_timeout_seconds),
            forward_timeout: Duration::from_secs(config.sync_forward_timeout_seconds),
            event_queue_capacity: config.event_queue_capacity,
        }
    }
}

struct ConnectorShared {
    gateway_id: String,
    realm: String,
    store: Arc<dyn AssetStore>,
    bus: EventBus,
    config: SyncConfig,
    correlator: RequestCorrelator,
    /// 当前会话的出站发送端；无会话时为 None
    outbound: StdMutex<Option<mpsc::Sender<String>>>,
    status: StdMutex<ConnectionStatus>,
    ids: StdMutex<IdMap>,
    session_active: AtomicBool,
    violation: AtomicBool,
    end_reason: StdMutex<Option<DisconnectReason>>,
    closed: watch::Sender<bool>,
}

/// 会话终止方式。
#[derive(Debug)]
enum SessionEnd {
    /// 通道断开
    Closed,
    /// 本端要求断开；None 表示会话回收（转发超时），重连后再同步
    Requested(Option<DisconnectReason>),
    /// 对端要求断开
    PeerDisconnect(DisconnectReason),
}

/// 同步阶段的中段事件簿记。
#[derive(Default)]
struct SyncState {
    /// 清单里但同步期间已删除的本地 ID
    skip_deleted: HashSet<String>,
    /// 父未就绪而排队的资产
    pending: Vec<Asset>,
}

/// 每网关连接器句柄（可克隆，跨任务共享）。
#[derive(Clone)]
pub struct GatewayConnector {
    shared: Arc<ConnectorShared>,
    reconciler: Arc<MirrorReconciler>,
}

impl std::fmt::Debug for GatewayConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnector")
            .field("gateway_id", &self.shared.gateway_id)
            .field("realm", &self.shared.realm)
            .finish()
    }
}

impl GatewayConnector {
    pub fn new(
        gateway_id: impl Into<String>,
        realm: impl Into<String>,
        store: Arc<dyn AssetStore>,
        bus: EventBus,
        config: SyncConfig,
    ) -> Self {
        let gateway_id = gateway_id.into();
        let realm = realm.into();
        let (closed, _) = watch::channel(false);
        let reconciler = Arc::new(MirrorReconciler::new(
            store.clone(),
            gateway_id.clone(),
            realm.clone(),
        ));
        Self {
            shared: Arc::new(ConnectorShared {
                ids: StdMutex::new(IdMap::new(gateway_id.clone())),
                gateway_id,
                realm,
                store,
                bus,
                config,
                correlator: RequestCorrelator::new(),
                outbound: StdMutex::new(None),
                status: StdMutex::new(ConnectionStatus::Disconnected),
                session_active: AtomicBool::new(false),
                violation: AtomicBool::new(false),
                end_reason: StdMutex::new(None),
                closed,
            }),
            reconciler,
        }
    }

    pub fn gateway_id(&self) -> &str {
        &self.shared.gateway_id
    }

    pub fn realm(&self) -> &str {
        &self.shared.realm
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared
            .status
            .lock()
            .map(|status| *status)
            .unwrap_or(ConnectionStatus::Error)
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// 会话是否仍在运行（区别于等待重连的 CONNECTING 状态属性）。
    pub fn session_active(&self) -> bool {
        self.shared.session_active.load(Ordering::SeqCst)
    }

    /// 通道关闭信号的观察端（传输泵监听）。
    pub fn closed_watch(&self) -> watch::Receiver<bool> {
        self.shared.closed.subscribe()
    }

    /// 驱动一次网关会话，直到通道关闭或被要求断开。
    ///
    /// 逆向表跨会话保留，断线重连后全量再同步会刷新它。
    pub async fn run(&self, channel: crate::channel::MessageChannel) {
        let crate::channel::MessageChannel { outbound, inbound } = channel;
        record_gateway_connect();
        self.shared.session_active.store(true, Ordering::SeqCst);
        self.shared.violation.store(false, Ordering::SeqCst);
        if let Ok(mut current) = self.shared.outbound.lock() {
            *current = Some(outbound);
        }
        if let Ok(mut reason) = self.shared.end_reason.lock() {
            *reason = None;
        }
        self.shared.closed.send_replace(false);
        self.set_status(ConnectionStatus::Connecting).await;

        let (event_tx, event_rx) = mpsc::channel(self.shared.config.event_queue_capacity);
        let reader = tokio::spawn(read_loop(self.shared.clone(), inbound, event_tx));

        let outcome = self.session(event_rx).await;
        self.shared.correlator.fail_all();
        self.shared.closed.send_replace(true);
        reader.abort();

        let status = if self.shared.violation.load(Ordering::SeqCst) {
            ConnectionStatus::Error
        } else {
            match &outcome {
                Ok(SessionEnd::Requested(Some(DisconnectReason::Disabled)))
                | Ok(SessionEnd::PeerDisconnect(DisconnectReason::Disabled)) => {
                    ConnectionStatus::Disabled
                }
                Ok(SessionEnd::Requested(Some(DisconnectReason::Terminating))) => {
                    ConnectionStatus::Disconnected
                }
                Err(GatewayError::ProtocolViolation(_)) => ConnectionStatus::Error,
                // 断连/超时：保留镜像，等待重连后全量再同步
                _ => ConnectionStatus::Connecting,
            }
        };
        if let Err(err) = &outcome {
            warn!(
                gateway_id = %self.shared.gateway_id,
                error = %err,
                "gateway session ended with error"
            );
        }
        self.set_status(status).await;
        if let Ok(mut current) = self.shared.outbound.lock() {
            *current = None;
        }
        self.shared.session_active.store(false, Ordering::SeqCst);
        record_gateway_disconnect();
    }

    /// 要求对端断开并关闭本端通道。
    pub async fn request_disconnect(&self, reason: DisconnectReason) {
        if let Ok(frame) = encode_event(&SharedEvent::GatewayDisconnect { reason }) {
            let _ = self.send_frame(frame).await;
        }
        if let Ok(mut end_reason) = self.shared.end_reason.lock() {
            *end_reason = Some(reason);
        }
        self.shared.closed.send_replace(true);
    }

    // ------------------------------------------------------------------
    // 转发路径（事件路由器/管理接口调用）
    // ------------------------------------------------------------------

    /// 把指向镜像资产的本地属性写入转发给网关（即发即弃，不落本地）。
    pub async fn forward_attribute_event(
        &self,
        event: AttributeEvent,
    ) -> Result<(), GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::GatewayNotConnected);
        }
        let local_id = self
            .local_for(&event.attribute_ref.asset_id)?
            .ok_or(GatewayError::GatewayNotConnected)?;
        let mut outgoing = event;
        outgoing.attribute_ref.asset_id = local_id;
        outgoing.realm = None;
        outgoing.parent_id = None;
        let frame = encode_event(&SharedEvent::Attribute(outgoing))?;
        self.send_frame(frame).await?;
        record_event_forwarded();
        Ok(())
    }

    /// 写穿创建/更新：阻塞到网关确认，再把回声落入镜像。
    ///
    /// 入参使用镜像形参（镜像 ID / 镜像父 ID）；新资产 `id` 留空。
    pub async fn forward_asset_merge(&self, asset: Asset) -> Result<Asset, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::GatewayNotConnected);
        }
        let local_asset = self.to_local_form(asset)?;
        let message_id = self.shared.correlator.next_message_id();
        let rx = self
            .send_request(&message_id, SharedEvent::MergeAsset { asset: local_asset })
            .await?;
        let reply = self.await_forward(rx, "asset merge forward").await?;
        match reply {
            SharedEvent::Asset(echo) => {
                let local_id = echo.asset.id.clone();
                if let Some(queued) = self
                    .reconciler
                    .apply_cause(&self.shared.ids, echo.cause, echo.asset)
                    .await?
                {
                    return Err(GatewayError::UnsupportedOperation(format!(
                        "echo parent not mirrored for {}",
                        queued.id
                    )));
                }
                let mirrored_id = self.mirrored_for(&local_id)?;
                let ctx = self.service_ctx();
                self.shared
                    .store
                    .find_asset(&ctx, &mirrored_id)
                    .await?
                    .ok_or(GatewayError::AssetNotFound(mirrored_id))
            }
            SharedEvent::Rejected { reason } => Err(GatewayError::UnsupportedOperation(reason)),
            other => Err(GatewayError::ProtocolViolation(format!(
                "unexpected merge reply: {}",
                event_name(&other)
            ))),
        }
    }

    /// 写穿删除：阻塞到网关确认，再删除镜像子树。
    pub async fn forward_asset_delete(&self, mirrored_id: &str) -> Result<bool, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::GatewayNotConnected);
        }
        let local_id = self
            .local_for(mirrored_id)?
            .ok_or(GatewayError::GatewayNotConnected)?;
        let message_id = self.shared.correlator.next_message_id();
        let rx = self
            .send_request(&message_id, SharedEvent::DeleteAsset { asset_id: local_id })
            .await?;
        let reply = self.await_forward(rx, "asset delete forward").await?;
        match reply {
            SharedEvent::DeleteAssetResult { deleted, .. } => {
                if deleted {
                    self.reconciler
                        .delete_subtree(&self.shared.ids, mirrored_id)
                        .await?;
                }
                Ok(deleted)
            }
            SharedEvent::Rejected { reason } => Err(GatewayError::UnsupportedOperation(reason)),
            other => Err(GatewayError::ProtocolViolation(format!(
                "unexpected delete reply: {}",
                event_name(&other)
            ))),
        }
    }

    /// 删除全部镜像后代（网关删除时由服务层调用）。
    pub async fn purge_mirror(&self) -> Result<usize, GatewayError> {
        let removed = self
            .reconciler
            .remove_stale(&self.shared.ids, &HashSet::new())
            .await?;
        if let Ok(mut map) = self.shared.ids.lock() {
            map.clear();
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // 会话驱动
    // ------------------------------------------------------------------

    async fn session(
        &self,
        mut events: mpsc::Receiver<SharedEvent>,
    ) -> Result<SessionEnd, GatewayError> {
        let mut closed_rx = self.shared.closed.subscribe();

        // 握手：读取清单骨架（仅 ID 与版本，不带属性体）
        let rx = self
            .send_request(
                ASSET_READ_MESSAGE_ID,
                SharedEvent::ReadAssets {
                    query: AssetQuery::index(),
                },
            )
            .await?;
        let index = match await_response(rx, self.shared.config.read_timeout, "asset index").await?
        {
            SharedEvent::Assets { assets } => assets,
            SharedEvent::Rejected { reason } => {
                return Err(GatewayError::UnsupportedOperation(reason))
            }
            other => {
                return Err(GatewayError::ProtocolViolation(format!(
                    "unexpected index reply: {}",
                    event_name(&other)
                )))
            }
        };

        record_sync_round();
        if let Some(end) = self.sync(index, &mut events, &mut closed_rx).await? {
            return Ok(end);
        }

        self.set_status(ConnectionStatus::Connected).await;
        info!(gateway_id = %self.shared.gateway_id, "gateway synchronized");

        loop {
            tokio::select! {
                _ = closed_rx.changed() => {
                    return Ok(SessionEnd::Requested(self.take_end_reason()));
                }
                maybe = events.recv() => match maybe {
                    None => return Ok(SessionEnd::Closed),
                    Some(event) => {
                        if let Some(end) = self.handle_steady_event(event).await? {
                            return Ok(end);
                        }
                    }
                }
            }
        }
    }

    /// 分批调和清单。返回 Some 表示会话须终止。
    async fn sync(
        &self,
        index: Vec<Asset>,
        events: &mut mpsc::Receiver<SharedEvent>,
        closed_rx: &mut watch::Receiver<bool>,
    ) -> Result<Option<SessionEnd>, GatewayError> {
        let mut reported: Vec<String> = Vec::with_capacity(index.len());
        let mut seen: HashSet<String> = HashSet::new();
        for asset in &index {
            if seen.insert(asset.id.clone()) {
                reported.push(asset.id.clone());
            }
        }
        info!(
            gateway_id = %self.shared.gateway_id,
            reported = reported.len(),
            "starting inventory sync"
        );

        // 镜像里有而清单里没有的，先按子先父后清掉
        let target: HashSet<String> = {
            let map = self
                .shared
                .ids
                .lock()
                .map_err(|_| GatewayError::Transport("id map lock poisoned".to_string()))?;
            reported.iter().map(|local| map.mirrored(local)).collect()
        };
        let removed = self
            .reconciler
            .remove_stale(&self.shared.ids, &target)
            .await?;
        if removed > 0 {
            info!(removed, "removed stale mirrors");
        }

        let mut state = SyncState::default();
        let batch_size = self.shared.config.batch_size;
        for (batch_index, chunk) in reported.chunks(batch_size).enumerate() {
            // 同步中段已删除的 ID 不再发起请求
            let wanted: Vec<String> = chunk
                .iter()
                .filter(|id| !state.skip_deleted.contains(*id))
                .cloned()
                .collect();
            if !wanted.is_empty() {
                let offset = batch_index * batch_size;
                let message_id = format!("{}{}", ASSET_READ_BATCH_PREFIX, offset);
                record_sync_batch();
                let rx = self
                    .send_request(
                        &message_id,
                        SharedEvent::ReadAssets {
                            query: AssetQuery::by_ids(wanted),
                        },
                    )
                    .await?;
                let reply =
                    await_response(rx, self.shared.config.read_timeout, &message_id).await?;
                let assets = match reply {
                    SharedEvent::Assets { assets } => assets,
                    SharedEvent::Rejected { reason } => {
                        return Err(GatewayError::UnsupportedOperation(reason))
                    }
                    other => {
                        return Err(GatewayError::ProtocolViolation(format!(
                            "unexpected batch reply: {}",
                            event_name(&other)
                        )))
                    }
                };
                // 响应在途期间删除的 ID 此时跳过
                let mut batch_assets: Vec<Asset> = assets
                    .into_iter()
                    .filter(|asset| !state.skip_deleted.contains(&asset.id))
                    .collect();
                batch_assets.append(&mut state.pending);
                state.pending = self
                    .reconciler
                    .apply_assets(&self.shared.ids, batch_assets)
                    .await?;
            }

            // 批间消化同步中段到达的事件
            if let Some(end) = self.drain_sync_events(events, &mut state).await? {
                return Ok(Some(end));
            }
            if *closed_rx.borrow() {
                return Ok(Some(SessionEnd::Requested(self.take_end_reason())));
            }
        }

        if let Some(end) = self.drain_sync_events(events, &mut state).await? {
            return Ok(Some(end));
        }
        if !state.pending.is_empty() {
            let leftovers = self
                .reconciler
                .apply_assets(&self.shared.ids, std::mem::take(&mut state.pending))
                .await?;
            for asset in leftovers {
                // 父资产在同步期间被删除，子树随之放弃
                warn!(local_id = %asset.id, "dropping asset whose parent never materialized");
            }
        }
        Ok(None)
    }

    async fn drain_sync_events(
        &self,
        events: &mut mpsc::Receiver<SharedEvent>,
        state: &mut SyncState,
    ) -> Result<Option<SessionEnd>, GatewayError> {
        loop {
            match events.try_recv() {
                Ok(event) => {
                    if let Some(end) = self.handle_sync_event(event, state).await? {
                        return Ok(Some(end));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Ok(Some(SessionEnd::Closed)),
            }
        }
    }

    async fn handle_sync_event(
        &self,
        event: SharedEvent,
        state: &mut SyncState,
    ) -> Result<Option<SessionEnd>, GatewayError> {
        match event {
            SharedEvent::Attribute(attribute_event) => {
                self.apply_inbound_attribute(attribute_event).await;
                Ok(None)
            }
            SharedEvent::Asset(asset_event) => {
                let local_id = asset_event.asset.id.clone();
                match asset_event.cause {
                    AssetEventCause::Delete => {
                        let deleted = self
                            .reconciler
                            .delete_for_local(&self.shared.ids, &local_id)
                            .await?;
                        if !deleted {
                            // 尚未物化，记住并在批响应到达时跳过
                            state.skip_deleted.insert(local_id.clone());
                        }
                        state.pending.retain(|asset| asset.id != local_id);
                    }
                    AssetEventCause::Create | AssetEventCause::Update => {
                        state.skip_deleted.remove(&local_id);
                        if let Some(queued) = self
                            .reconciler
                            .apply_cause(&self.shared.ids, asset_event.cause, asset_event.asset)
                            .await?
                        {
                            state.pending.push(queued);
                        }
                    }
                }
                record_event_applied();
                Ok(None)
            }
            SharedEvent::GatewayDisconnect { reason } => {
                Ok(Some(SessionEnd::PeerDisconnect(reason)))
            }
            other => {
                warn!(event = event_name(&other), "unexpected event during sync, dropped");
                Ok(None)
            }
        }
    }

    async fn handle_steady_event(
        &self,
        event: SharedEvent,
    ) -> Result<Option<SessionEnd>, GatewayError> {
        match event {
            SharedEvent::Attribute(attribute_event) => {
                self.apply_inbound_attribute(attribute_event).await;
                Ok(None)
            }
            SharedEvent::Asset(asset_event) => {
                if let Some(queued) = self
                    .reconciler
                    .apply_cause(&self.shared.ids, asset_event.cause, asset_event.asset)
                    .await?
                {
                    warn!(local_id = %queued.id, "asset event parent not mirrored, dropped");
                }
                record_event_applied();
                Ok(None)
            }
            SharedEvent::GatewayDisconnect { reason } => {
                Ok(Some(SessionEnd::PeerDisconnect(reason)))
            }
            other => {
                warn!(event = event_name(&other), "unexpected event in steady state, dropped");
                Ok(None)
            }
        }
    }

    /// 网关入站属性事件：改写镜像 ID，落镜像，盖 GATEWAY 来源广播。
    async fn apply_inbound_attribute(&self, event: AttributeEvent) {
        let mirrored_id = match self.mirrored_for(&event.attribute_ref.asset_id) {
            Ok(id) => id,
            Err(_) => return,
        };
        let ctx = self.service_ctx();
        let mirror = match self.shared.store.find_asset(&ctx, &mirrored_id).await {
            Ok(Some(asset)) => asset,
            Ok(None) => {
                debug!(mirrored_id = %mirrored_id, "attribute event for absent mirror, dropped");
                return;
            }
            Err(err) => {
                warn!(error = %err, "mirror lookup failed for attribute event");
                return;
            }
        };
        let attribute = attribute_from_event(Some(&mirror), &event);
        if let Err(err) = self
            .shared
            .store
            .update_attribute(&ctx, &mirrored_id, attribute)
            .await
        {
            warn!(error = %err, "mirror attribute write failed");
            return;
        }
        let mut published = event;
        published.attribute_ref.asset_id = mirrored_id;
        published.source = AttributeSource::Gateway;
        published.realm = Some(self.shared.realm.clone());
        published.parent_id = mirror.parent_id;
        self.shared.bus.publish_attribute(published);
        record_event_applied();
    }

    // ------------------------------------------------------------------
    // 基础设施
    // ------------------------------------------------------------------

    async fn send_frame(&self, frame: String) -> Result<(), GatewayError> {
        let sender = self
            .shared
            .outbound
            .lock()
            .ok()
            .and_then(|current| current.clone())
            .ok_or(GatewayError::Disconnected)?;
        sender
            .send(frame)
            .await
            .map_err(|_| GatewayError::Disconnected)
    }

    async fn send_request(
        &self,
        message_id: &str,
        event: SharedEvent,
    ) -> Result<oneshot::Receiver<SharedEvent>, GatewayError> {
        let rx = self.shared.correlator.register(message_id)?;
        let frame = encode_envelope(&Envelope {
            message_id: message_id.to_string(),
            event,
        })?;
        self.send_frame(frame).await?;
        Ok(rx)
    }

    /// 等待写穿响应；超时即回收会话，回 CONNECTING 等待重连再同步。
    async fn await_forward(
        &self,
        rx: oneshot::Receiver<SharedEvent>,
        what: &str,
    ) -> Result<SharedEvent, GatewayError> {
        match await_response(rx, self.shared.config.forward_timeout, what).await {
            Err(GatewayError::Timeout(what)) => {
                warn!(what = %what, "forward timed out, recycling session");
                self.shared.closed.send_replace(true);
                Err(GatewayError::Timeout(what))
            }
            other => other,
        }
    }

    async fn set_status(&self, status: ConnectionStatus) {
        if let Ok(mut current) = self.shared.status.lock() {
            *current = status;
        }
        let ctx = self.service_ctx();
        let attribute = Attribute::new(
            STATUS_ATTRIBUTE,
            ValueType::Text,
            serde_json::json!(status.to_string()),
            now_epoch_ms(),
        );
        if let Err(err) = self
            .shared
            .store
            .update_attribute(&ctx, &self.shared.gateway_id, attribute)
            .await
        {
            debug!(error = %err, "status attribute write skipped");
        }
        info!(
            gateway_id = %self.shared.gateway_id,
            status = %status,
            "gateway connection status"
        );
    }

    fn service_ctx(&self) -> RealmContext {
        RealmContext::service(&self.shared.realm)
    }

    fn take_end_reason(&self) -> Option<DisconnectReason> {
        self.shared
            .end_reason
            .lock()
            .ok()
            .and_then(|mut reason| reason.take())
    }

    fn local_for(&self, mirrored_id: &str) -> Result<Option<String>, GatewayError> {
        let map = self
            .shared
            .ids
            .lock()
            .map_err(|_| GatewayError::Transport("id map lock poisoned".to_string()))?;
        Ok(map.local_for(mirrored_id).map(str::to_string))
    }

    fn mirrored_for(&self, local_id: &str) -> Result<String, GatewayError> {
        let map = self
            .shared
            .ids
            .lock()
            .map_err(|_| GatewayError::Transport("id map lock poisoned".to_string()))?;
        Ok(map.mirrored(local_id))
    }

    /// 把管理端镜像形参翻译为网关本地形参。
    fn to_local_form(&self, mut asset: Asset) -> Result<Asset, GatewayError> {
        let map = self
            .shared
            .ids
            .lock()
            .map_err(|_| GatewayError::Transport("id map lock poisoned".to_string()))?;

        asset.id = match map.local_for(&asset.id) {
            Some(local) => local.to_string(),
            None if asset.id.is_empty() => domain::generate_asset_id(),
            None => {
                return Err(GatewayError::UnsupportedOperation(
                    "target asset is not mirrored".to_string(),
                ))
            }
        };
        asset.parent_id = match asset.parent_id {
            Some(parent) if parent == self.shared.gateway_id => None,
            Some(parent) => Some(
                map.local_for(&parent)
                    .ok_or_else(|| {
                        GatewayError::UnsupportedOperation("parent is not mirrored".to_string())
                    })?
                    .to_string(),
            ),
            None => {
                return Err(GatewayError::UnsupportedOperation(
                    "mirrored asset needs a parent under the gateway".to_string(),
                ))
            }
        };
        // 网关侧会把租域覆写为其本地租域
        asset.realm = self.shared.realm.clone();
        asset.path = None;
        Ok(asset)
    }
}

/// 入站读任务：解帧，响应交配对层，事件入有界队列。
async fn read_loop(
    shared: Arc<ConnectorShared>,
    mut inbound: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<SharedEvent>,
) {
    while let Some(text) = inbound.recv().await {
        match codec::decode_frame(&text) {
            Ok(Decoded::Envelope(envelope)) => {
                let message_id = envelope.message_id.clone();
                if !shared.correlator.complete(envelope) {
                    if codec::is_reserved_message_id(&message_id) {
                        // 保留消息 ID 滥用按协议违规处理
                        error!(
                            gateway_id = %shared.gateway_id,
                            message_id = %message_id,
                            "reserved message id misuse, closing channel"
                        );
                        record_protocol_violation();
                        shared.violation.store(true, Ordering::SeqCst);
                        shared.closed.send_replace(true);
                        break;
                    }
                    debug!(message_id = %message_id, "unmatched response dropped");
                }
            }
            Ok(Decoded::Event(event)) => {
                if event_tx.capacity() == 0 {
                    record_backpressure();
                }
                // 队列满时在此等待，通道因此不再被读——背压而非丢弃
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Decoded::Unknown { event_type }) => {
                warn!(event_type = %event_type, "unknown event type dropped");
                record_dropped_unknown_event();
            }
            Err(err) => {
                error!(
                    gateway_id = %shared.gateway_id,
                    error = %err,
                    "malformed frame, closing channel"
                );
                record_protocol_violation();
                shared.violation.store(true, Ordering::SeqCst);
                shared.closed.send_replace(true);
                break;
            }
        }
    }
    // 读端退出：唤醒所有等待响应的请求
    shared.correlator.fail_all();
}

pub(crate) fn event_name(event: &SharedEvent) -> &'static str {
    match event {
        SharedEvent::Attribute(_) => "attribute",
        SharedEvent::Asset(_) => "asset",
        SharedEvent::GatewayDisconnect { .. } => "gateway-disconnect",
        SharedEvent::ReadAssets { .. } => "read-assets",
        SharedEvent::Assets { .. } => "assets",
        SharedEvent::MergeAsset { .. } => "merge-asset",
        SharedEvent::DeleteAsset { .. } => "delete-asset",
        SharedEvent::DeleteAssetResult { .. } => "delete-asset-result",
        SharedEvent::Rejected { .. } => "rejected",
    }
}
