pub mod asset;
pub mod attribute;
pub mod event;
pub mod permissions;
pub mod query;

pub use asset::{generate_asset_id, Asset, AssetType, ConnectionStatus};
pub use attribute::{Attribute, ValueType};
pub use event::{AssetEvent, AssetEventCause, AttributeEvent, AttributeRef, AttributeSource};
pub use query::{AssetQuery, AssetSelect};

/// 租域上下文：所有模块共享的执行上下文。
#[derive(Debug, Clone)]
pub struct RealmContext {
    pub realm: String,
    pub user_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl RealmContext {
    /// 构造显式身份与权限范围的租域上下文。
    pub fn new(
        realm: impl Into<String>,
        user_id: impl Into<String>,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> Self {
        Self {
            realm: realm.into(),
            user_id: user_id.into(),
            roles,
            permissions,
        }
    }

    /// 系统服务上下文：连接器等内部组件在指定租域内读写时使用。
    pub fn service(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            user_id: "system".to_string(),
            roles: vec!["service".to_string()],
            permissions: vec![
                permissions::ASSET_READ.to_string(),
                permissions::ASSET_WRITE.to_string(),
            ],
        }
    }
}

impl Default for RealmContext {
    /// 空上下文（仅用于测试或占位）。
    fn default() -> Self {
        Self {
            realm: "".to_string(),
            user_id: "".to_string(),
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }
}
