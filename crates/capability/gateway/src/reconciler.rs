//! 镜像调和：把网关上报的资产差集落入本地资产存储
//!
//! 规则：
//! - 创建按父先子后排序，批内父未就绪的子资产退回调用方排队
//! - 删除按子先父后排序
//! - 镜像 ID/父 ID 全部改写，租域一律覆写为网关所在租域
//! - 版本单调：低于镜像版本的写入拒绝并记录，持平视为幂等重放
//! - 单条失败记录后继续，不中断整批

use crate::error::GatewayError;
use crate::id_map::IdMap;
use ams_storage::{AssetStore, StorageError};
use ams_telemetry::{record_mirror_delete, record_mirror_upsert, record_version_conflict};
use domain::{Asset, AssetEventCause, Attribute, AttributeEvent, RealmContext, ValueType};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// 由属性事件生成落库属性：保留既有元数据与值类型，仅改值与时间戳。
pub fn attribute_from_event(asset: Option<&Asset>, event: &AttributeEvent) -> Attribute {
    let name = event.attribute_ref.attribute_name.clone();
    match asset.and_then(|asset| asset.attribute(&name)) {
        Some(existing) => {
            let mut updated = existing.clone();
            updated.value = event.value.clone();
            updated.timestamp_ms = event.timestamp_ms;
            updated
        }
        None => Attribute {
            name,
            value_type: value_type_of(event.value.as_ref()),
            value: event.value.clone(),
            timestamp_ms: event.timestamp_ms,
            meta: BTreeMap::new(),
        },
    }
}

fn value_type_of(value: Option<&serde_json::Value>) -> ValueType {
    match value {
        Some(serde_json::Value::Bool(_)) => ValueType::Boolean,
        Some(serde_json::Value::Number(_)) => ValueType::Number,
        Some(serde_json::Value::String(_)) => ValueType::Text,
        _ => ValueType::Json,
    }
}

/// 批内拓扑排序：父先于子，父不在批内的节点视为就绪。
pub fn topological_order(assets: Vec<Asset>) -> Vec<Asset> {
    let batch_ids: HashSet<String> = assets.iter().map(|asset| asset.id.clone()).collect();
    let mut children: HashMap<String, Vec<Asset>> = HashMap::new();
    let mut ready: VecDeque<Asset> = VecDeque::new();
    for asset in assets {
        match &asset.parent_id {
            Some(parent) if batch_ids.contains(parent) => {
                children.entry(parent.clone()).or_default().push(asset);
            }
            _ => ready.push_back(asset),
        }
    }
    let mut ordered = Vec::new();
    while let Some(asset) = ready.pop_front() {
        if let Some(waiting) = children.remove(&asset.id) {
            for child in waiting {
                ready.push_back(child);
            }
        }
        ordered.push(asset);
    }
    // 存储层禁止环，剩余节点只会是父链断裂的孤儿，原样追加
    for (_, orphans) in children {
        ordered.extend(orphans);
    }
    ordered
}

/// 单个网关的镜像调和器。
pub struct MirrorReconciler {
    store: Arc<dyn AssetStore>,
    gateway_id: String,
    realm: String,
}

impl MirrorReconciler {
    pub fn new(store: Arc<dyn AssetStore>, gateway_id: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            store,
            gateway_id: gateway_id.into(),
            realm: realm.into(),
        }
    }

    fn ctx(&self) -> RealmContext {
        RealmContext::service(&self.realm)
    }

    /// 应用一组网关上报的资产（本地形参），返回父未就绪而排队的资产。
    pub async fn apply_assets(
        &self,
        ids: &Mutex<IdMap>,
        assets: Vec<Asset>,
    ) -> Result<Vec<Asset>, GatewayError> {
        let mut pending = Vec::new();
        for asset in topological_order(assets) {
            let local_id = asset.id.clone();
            match self.apply_one(ids, asset.clone()).await {
                Ok(true) => record_mirror_upsert(),
                Ok(false) => {}
                Err(GatewayError::Storage(StorageError::ParentNotFound(_))) => {
                    pending.push(asset);
                }
                Err(GatewayError::DuplicateMapping(_)) => {
                    // 对该资产致命，同步继续
                    warn!(local_id = %local_id, "id mapping collision, asset unsyncable");
                }
                Err(err) => {
                    warn!(local_id = %local_id, error = %err, "mirror upsert failed");
                }
            }
        }
        Ok(pending)
    }

    /// 应用单个资产事件（稳态与同步中段共用）。
    ///
    /// CREATE 目标已存在按 UPDATE 处理；UPDATE 目标缺失按 CREATE 处理并
    /// 告警；DELETE 目标缺失是空操作。返回父未就绪的资产（如有）。
    pub async fn apply_cause(
        &self,
        ids: &Mutex<IdMap>,
        cause: AssetEventCause,
        asset: Asset,
    ) -> Result<Option<Asset>, GatewayError> {
        match cause {
            AssetEventCause::Create | AssetEventCause::Update => {
                if cause == AssetEventCause::Update {
                    let mirrored = self.mirrored_of(ids, &asset.id)?;
                    let exists = self.store.find_asset(&self.ctx(), &mirrored).await?.is_some();
                    if !exists {
                        warn!(local_id = %asset.id, "update for unknown mirror, creating");
                    }
                }
                let mut pending = self.apply_assets(ids, vec![asset]).await?;
                Ok(pending.pop())
            }
            AssetEventCause::Delete => {
                self.delete_for_local(ids, &asset.id).await?;
                Ok(None)
            }
        }
    }

    async fn apply_one(&self, ids: &Mutex<IdMap>, asset: Asset) -> Result<bool, GatewayError> {
        let (mirrored_id, mirrored_parent) = {
            let mut map = ids
                .lock()
                .map_err(|_| GatewayError::Transport("id map lock poisoned".to_string()))?;
            let mirrored = map.record(&asset.id)?;
            let parent = match &asset.parent_id {
                Some(parent) => map.mirrored(parent),
                None => self.gateway_id.clone(),
            };
            (mirrored, parent)
        };

        let ctx = self.ctx();
        if let Some(existing) = self.store.find_asset(&ctx, &mirrored_id).await? {
            if asset.version < existing.version {
                warn!(
                    local_id = %asset.id,
                    stored = existing.version,
                    incoming = asset.version,
                    "stale asset version from gateway"
                );
                record_version_conflict();
                return Ok(false);
            }
            if asset.version == existing.version {
                // 重放同一清单不产生存储变更
                return Ok(false);
            }
        }

        let mirror = Asset {
            id: mirrored_id,
            version: asset.version,
            name: asset.name,
            asset_type: asset.asset_type,
            parent_id: Some(mirrored_parent),
            // 镜像租域只由网关资产决定
            realm: self.realm.clone(),
            created_at_ms: asset.created_at_ms,
            path: None,
            attributes: asset.attributes,
        };
        self.store.upsert_asset(&ctx, mirror).await?;
        Ok(true)
    }

    /// 删除镜像中不在目标集内的资产（子先父后），返回删除数。
    pub async fn remove_stale(
        &self,
        ids: &Mutex<IdMap>,
        target_mirrored: &HashSet<String>,
    ) -> Result<usize, GatewayError> {
        let ctx = self.ctx();
        let mirrored = self.store.descendant_ids(&ctx, &self.gateway_id).await?;
        let mut removed = 0;
        for mirrored_id in mirrored.iter().rev() {
            if target_mirrored.contains(mirrored_id) {
                continue;
            }
            match self.store.delete_asset(&ctx, mirrored_id).await {
                Ok(true) => {
                    removed += 1;
                    record_mirror_delete();
                    self.forget(ids, mirrored_id);
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(mirrored_id = %mirrored_id, error = %err, "stale mirror delete failed");
                }
            }
        }
        Ok(removed)
    }

    /// 删除本地 ID 对应的镜像子树；目标缺失返回 false。
    pub async fn delete_for_local(
        &self,
        ids: &Mutex<IdMap>,
        local_id: &str,
    ) -> Result<bool, GatewayError> {
        let mirrored = self.mirrored_of(ids, local_id)?;
        self.delete_subtree(ids, &mirrored).await
    }

    /// 删除镜像子树（含根，子先父后）。
    pub async fn delete_subtree(
        &self,
        ids: &Mutex<IdMap>,
        mirrored_root: &str,
    ) -> Result<bool, GatewayError> {
        let ctx = self.ctx();
        if self.store.find_asset(&ctx, mirrored_root).await?.is_none() {
            debug!(mirrored_id = %mirrored_root, "delete for absent mirror, no-op");
            return Ok(false);
        }
        let descendants = self.store.descendant_ids(&ctx, mirrored_root).await?;
        for mirrored_id in descendants.iter().rev() {
            match self.store.delete_asset(&ctx, mirrored_id).await {
                Ok(true) => {
                    record_mirror_delete();
                    self.forget(ids, mirrored_id);
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(mirrored_id = %mirrored_id, error = %err, "mirror delete failed");
                }
            }
        }
        let deleted = self.store.delete_asset(&ctx, mirrored_root).await?;
        if deleted {
            record_mirror_delete();
            self.forget(ids, mirrored_root);
        }
        Ok(deleted)
    }

    fn mirrored_of(&self, ids: &Mutex<IdMap>, local_id: &str) -> Result<String, GatewayError> {
        let map = ids
            .lock()
            .map_err(|_| GatewayError::Transport("id map lock poisoned".to_string()))?;
        Ok(map.mirrored(local_id))
    }

    fn forget(&self, ids: &Mutex<IdMap>, mirrored_id: &str) {
        if let Ok(mut map) = ids.lock() {
            map.remove_mirrored(mirrored_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_map::map_asset_id;
    use ams_storage::InMemoryAssetStore;
    use domain::{AssetQuery, AssetType};

    fn asset_with_id(id: &str, parent: Option<&str>) -> Asset {
        let mut asset = Asset::new(id, AssetType::Room, "remote", 0);
        asset.id = id.to_string();
        asset.parent_id = parent.map(str::to_string);
        asset
    }

    #[test]
    fn topological_order_puts_parents_first() {
        let assets = vec![
            asset_with_id("room-1", Some("building-1")),
            asset_with_id("room-2", Some("building-1")),
            asset_with_id("building-1", None),
            asset_with_id("room-3", Some("offsite-parent")),
        ];
        let ordered = topological_order(assets);
        let position = |id: &str| ordered.iter().position(|a| a.id == id).expect("present");
        assert!(position("building-1") < position("room-1"));
        assert!(position("building-1") < position("room-2"));
        assert_eq!(ordered.len(), 4);
    }

    #[tokio::test]
    async fn reapplying_same_assets_is_idempotent() {
        let store = Arc::new(InMemoryAssetStore::new());
        let ctx = RealmContext::service("master");
        let mut gateway = Asset::new("GW", AssetType::Gateway, "master", 0);
        gateway.id = "gw-root".to_string();
        store.upsert_asset(&ctx, gateway).await.expect("gateway");

        let reconciler = MirrorReconciler::new(store.clone(), "gw-root", "master");
        let ids = Mutex::new(IdMap::new("gw-root"));
        let batch = vec![
            asset_with_id("building-1", None),
            asset_with_id("room-1", Some("building-1")),
        ];

        let pending = reconciler
            .apply_assets(&ids, batch.clone())
            .await
            .expect("first apply");
        assert!(pending.is_empty());
        let query = AssetQuery {
            recursive: true,
            ..AssetQuery::default()
        };
        let before = store.query_assets(&ctx, &query).await.expect("snapshot");

        let pending = reconciler
            .apply_assets(&ids, batch)
            .await
            .expect("second apply");
        assert!(pending.is_empty());
        let after = store.query_assets(&ctx, &query).await.expect("snapshot");
        assert_eq!(
            serde_json::to_value(&before).expect("encode"),
            serde_json::to_value(&after).expect("encode"),
            "same index produces no mutations"
        );
    }

    #[tokio::test]
    async fn child_before_parent_is_queued_then_applied() {
        let store = Arc::new(InMemoryAssetStore::new());
        let ctx = RealmContext::service("master");
        let mut gateway = Asset::new("GW", AssetType::Gateway, "master", 0);
        gateway.id = "gw-root".to_string();
        store.upsert_asset(&ctx, gateway).await.expect("gateway");

        let reconciler = MirrorReconciler::new(store.clone(), "gw-root", "master");
        let ids = Mutex::new(IdMap::new("gw-root"));

        // 批 1 只有子，父在批 2
        let pending = reconciler
            .apply_assets(&ids, vec![asset_with_id("room-1", Some("building-1"))])
            .await
            .expect("batch 1");
        assert_eq!(pending.len(), 1);

        let mut batch2 = vec![asset_with_id("building-1", None)];
        batch2.extend(pending);
        let pending = reconciler.apply_assets(&ids, batch2).await.expect("batch 2");
        assert!(pending.is_empty());

        let mirrored_room = map_asset_id("gw-root", "room-1");
        let mirrored_building = map_asset_id("gw-root", "building-1");
        let room = store
            .find_asset(&ctx, &mirrored_room)
            .await
            .expect("find")
            .expect("room mirrored");
        assert_eq!(room.parent_id.as_deref(), Some(mirrored_building.as_str()));
        assert_eq!(room.realm, "master");
    }
}
