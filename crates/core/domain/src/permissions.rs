//! 权限码清单（跨前后端对齐）。

pub const ASSET_READ: &str = "asset.read";
pub const ASSET_WRITE: &str = "asset.write";
pub const GATEWAY_CONNECTION_READ: &str = "gateway.connection.read";
pub const GATEWAY_CONNECTION_WRITE: &str = "gateway.connection.write";

/// 判断上下文是否持有指定权限。
pub fn has_permission(permissions: &[String], code: &str) -> bool {
    permissions.iter().any(|item| item == code)
}
