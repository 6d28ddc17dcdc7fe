//! 存储层错误类型定义

/// 存储错误。
///
/// 乐观版本冲突单独成员，同步核心依赖它区分"落后写入"与其他失败。
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 乐观版本冲突：写入版本落后于已存版本
    #[error("version conflict on {asset_id}: stored {stored}, incoming {incoming}")]
    VersionConflict {
        asset_id: String,
        stored: i64,
        incoming: i64,
    },

    /// 父节点不存在（保证父先于子落库）
    #[error("parent not found: {0}")]
    ParentNotFound(String),

    /// 租域越权
    #[error("realm scope violation: {0}")]
    Scope(String),

    /// 数据一致性冲突
    #[error("conflict: {0}")]
    Conflict(String),

    /// 底层错误
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
