//! # 网关同步能力模块
//!
//! 管理端与远程网关之间的持久双向同步：
//! - **认证**：OAuth2 client-credentials 签发的网关 token
//! - **清单调和**：连接建立后按固定批大小对账资产清单
//! - **稳态转发**：双向的资产/属性事件流，含写穿与回声
//! - **断线恢复**：会话失败回 CONNECTING，重连后全量再同步
//!
//! ## 架构
//!
//! ```text
//! 管理端                                    网关
//! ┌───────────────┐   EVENT: / REQUEST-RESPONSE:  ┌───────────────┐
//! │ GatewayService │◄──────── 文本通道 ──────────►│ GatewayClient │
//! │  └ Connector   │                              │  └ 本地存储    │
//! │     └ Reconciler → AssetStore（镜像子树）      └───────────────┘
//! │ EventRouter（本地写改道）
//! └───────────────┘
//! ```
//!
//! 不变式：网关 `G` 连接期间，`G` 资产之下的镜像子树是网关本地
//! 资产树的精确 ID 映射像；本地客户端只能经连接器的转发路径改动
//! 镜像。

pub mod bus;
pub mod channel;
pub mod client;
pub mod client_service;
pub mod codec;
pub mod connector;
pub mod correlator;
pub mod error;
pub mod id_map;
pub mod reconciler;
pub mod router;
pub mod service;

pub use bus::EventBus;
pub use channel::{in_memory_pair, MessageChannel};
pub use client::{
    AttributeWriteHandler, DeferredWriteHandler, GatewayClient, GatewayClientConfig,
    ImmediateWriteHandler, SessionTermination,
};
pub use client_service::GatewayClientService;
pub use codec::{DisconnectReason, Envelope, SharedEvent};
pub use connector::{now_epoch_ms, GatewayConnector, SyncConfig};
pub use correlator::RequestCorrelator;
pub use error::GatewayError;
pub use id_map::{map_asset_id, IdMap};
pub use reconciler::MirrorReconciler;
pub use router::{AttributeWriteOutcome, EventRouter};
pub use service::GatewayService;
