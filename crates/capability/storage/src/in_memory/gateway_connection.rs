//! 网关互联配置内存存储实现

use crate::error::StorageError;
use crate::models::GatewayConnectionRecord;
use crate::traits::GatewayConnectionStore;
use crate::validation::ensure_realm_scope;
use domain::RealmContext;
use std::collections::HashMap;
use std::sync::RwLock;

/// 网关互联配置内存存储
pub struct InMemoryGatewayConnectionStore {
    connections: RwLock<HashMap<String, GatewayConnectionRecord>>,
}

impl InMemoryGatewayConnectionStore {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryGatewayConnectionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GatewayConnectionStore for InMemoryGatewayConnectionStore {
    /// 查找本地租域的互联配置
    async fn find_connection(
        &self,
        ctx: &RealmContext,
        local_realm: &str,
    ) -> Result<Option<GatewayConnectionRecord>, StorageError> {
        ensure_realm_scope(ctx, local_realm)?;
        let item = self
            .connections
            .read()
            .ok()
            .and_then(|map| map.get(local_realm).cloned());
        Ok(item)
    }

    /// 创建或替换本地租域的互联配置
    async fn upsert_connection(
        &self,
        ctx: &RealmContext,
        record: GatewayConnectionRecord,
    ) -> Result<GatewayConnectionRecord, StorageError> {
        ensure_realm_scope(ctx, &record.local_realm)?;
        let mut map = self
            .connections
            .write()
            .map_err(|_| StorageError::Internal("lock failed".to_string()))?;
        map.insert(record.local_realm.clone(), record.clone());
        Ok(record)
    }

    /// 删除本地租域的互联配置
    async fn delete_connection(
        &self,
        ctx: &RealmContext,
        local_realm: &str,
    ) -> Result<bool, StorageError> {
        ensure_realm_scope(ctx, local_realm)?;
        let mut map = self
            .connections
            .write()
            .map_err(|_| StorageError::Internal("lock failed".to_string()))?;
        Ok(map.remove(local_realm).is_some())
    }

    /// 列出全部互联配置
    async fn list_connections(&self) -> Result<Vec<GatewayConnectionRecord>, StorageError> {
        let items = self
            .connections
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        Ok(items)
    }
}
