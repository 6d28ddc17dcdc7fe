//! 网关同步错误类型定义

use ams_storage::StorageError;

/// 网关同步子系统错误。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 凭证校验失败
    #[error("authentication failed")]
    AuthFailed,

    /// 通道断开，挂起请求全部失败
    #[error("gateway disconnected")]
    Disconnected,

    /// 请求超时
    #[error("request timeout: {0}")]
    Timeout(String),

    /// 帧格式损坏 / 保留消息 ID 滥用
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// 本地写操作的目标是镜像资产但网关未连接
    #[error("gateway not connected")]
    GatewayNotConnected,

    /// 网关已停用，拒绝流量
    #[error("gateway disabled")]
    GatewayDisabled,

    /// 绕过转发路径的非法操作
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// ID 映射冲突（统计上几乎不可能）
    #[error("duplicate id mapping for {0}")]
    DuplicateMapping(String),

    /// 目标资产不存在
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    /// 存储层错误
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 传输层错误
    #[error("transport error: {0}")]
    Transport(String),
}
