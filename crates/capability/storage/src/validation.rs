//! 租域作用域验证

use crate::error::StorageError;
use domain::RealmContext;

/// 验证上下文归属指定租域。
pub fn ensure_realm_scope(ctx: &RealmContext, realm: &str) -> Result<(), StorageError> {
    if ctx.realm != realm {
        return Err(StorageError::Scope(format!(
            "context realm {} does not cover {}",
            ctx.realm, realm
        )));
    }
    Ok(())
}
