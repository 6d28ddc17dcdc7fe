//! 资产树内存存储实现
//!
//! 功能：
//! - 资产 CRUD 与查询对象检索
//! - 乐观版本校验
//! - 父子顺序与无环约束
//! - 租域隔离

use crate::error::StorageError;
use crate::traits::AssetStore;
use crate::validation::ensure_realm_scope;
use domain::{Asset, AssetQuery, Attribute, RealmContext};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

/// 资产树内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
pub struct InMemoryAssetStore {
    assets: RwLock<HashMap<String, Asset>>,
}

impl InMemoryAssetStore {
    /// 创建新的资产存储
    pub fn new() -> Self {
        Self {
            assets: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryAssetStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 计算根到节点的 ID 路径。
fn path_of(map: &HashMap<String, Asset>, asset_id: &str) -> Vec<String> {
    let mut path = vec![asset_id.to_string()];
    let mut cursor = map.get(asset_id).and_then(|asset| asset.parent_id.clone());
    let mut seen: HashSet<String> = HashSet::new();
    while let Some(parent_id) = cursor {
        if !seen.insert(parent_id.clone()) {
            break;
        }
        path.push(parent_id.clone());
        cursor = map.get(&parent_id).and_then(|asset| asset.parent_id.clone());
    }
    path.reverse();
    path
}

/// 判断把 `asset_id` 挂到 `parent_id` 下是否成环。
fn would_cycle(map: &HashMap<String, Asset>, asset_id: &str, parent_id: &str) -> bool {
    let mut cursor = Some(parent_id.to_string());
    let mut seen: HashSet<String> = HashSet::new();
    while let Some(current) = cursor {
        if current == asset_id {
            return true;
        }
        if !seen.insert(current.clone()) {
            return true;
        }
        cursor = map.get(&current).and_then(|asset| asset.parent_id.clone());
    }
    false
}

/// 应用查询裁剪选项。
fn apply_select(map: &HashMap<String, Asset>, mut asset: Asset, query: &AssetQuery) -> Asset {
    if query.select.exclude_attributes {
        asset.attributes.clear();
    }
    if query.select.exclude_path {
        asset.path = None;
    } else {
        asset.path = Some(path_of(map, &asset.id));
    }
    asset
}

#[async_trait::async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn find_asset(
        &self,
        ctx: &RealmContext,
        asset_id: &str,
    ) -> Result<Option<Asset>, StorageError> {
        let map = self
            .assets
            .read()
            .map_err(|_| StorageError::Internal("lock failed".to_string()))?;
        let asset = map
            .get(asset_id)
            .filter(|asset| asset.realm == ctx.realm)
            .cloned();
        Ok(asset)
    }

    async fn query_assets(
        &self,
        ctx: &RealmContext,
        query: &AssetQuery,
    ) -> Result<Vec<Asset>, StorageError> {
        let realm = query.realm.clone().unwrap_or_else(|| ctx.realm.clone());
        ensure_realm_scope(ctx, &realm)?;
        let map = self
            .assets
            .read()
            .map_err(|_| StorageError::Internal("lock failed".to_string()))?;

        if !query.ids.is_empty() {
            // 按给定顺序精确选取，缺失的 ID 静默跳过
            let selected = query
                .ids
                .iter()
                .filter_map(|id| map.get(id))
                .filter(|asset| asset.realm == realm)
                .cloned()
                .map(|asset| apply_select(&map, asset, query))
                .collect();
            return Ok(selected);
        }

        let mut selected: Vec<Asset> = if query.parents.is_empty() {
            if query.recursive {
                map.values()
                    .filter(|asset| asset.realm == realm)
                    .cloned()
                    .collect()
            } else {
                map.values()
                    .filter(|asset| asset.realm == realm && asset.parent_id.is_none())
                    .cloned()
                    .collect()
            }
        } else if query.recursive {
            let mut result = Vec::new();
            let mut frontier: VecDeque<String> = query.parents.iter().cloned().collect();
            let mut visited: HashSet<String> = HashSet::new();
            while let Some(current) = frontier.pop_front() {
                for asset in map.values() {
                    if asset.parent_id.as_deref() == Some(current.as_str())
                        && asset.realm == realm
                        && visited.insert(asset.id.clone())
                    {
                        result.push(asset.clone());
                        frontier.push_back(asset.id.clone());
                    }
                }
            }
            result
        } else {
            let roots: HashSet<&String> = query.parents.iter().collect();
            map.values()
                .filter(|asset| {
                    asset.realm == realm
                        && asset
                            .parent_id
                            .as_ref()
                            .map(|parent| roots.contains(parent))
                            .unwrap_or(false)
                })
                .cloned()
                .collect()
        };

        selected.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(selected
            .into_iter()
            .map(|asset| apply_select(&map, asset, query))
            .collect())
    }

    async fn upsert_asset(&self, ctx: &RealmContext, asset: Asset) -> Result<Asset, StorageError> {
        ensure_realm_scope(ctx, &asset.realm)?;
        let mut map = self
            .assets
            .write()
            .map_err(|_| StorageError::Internal("lock failed".to_string()))?;

        if let Some(parent_id) = &asset.parent_id {
            let parent = map
                .get(parent_id)
                .ok_or_else(|| StorageError::ParentNotFound(parent_id.clone()))?;
            if parent.realm != asset.realm {
                return Err(StorageError::Scope(format!(
                    "parent {} is outside realm {}",
                    parent_id, asset.realm
                )));
            }
            if would_cycle(&map, &asset.id, parent_id) {
                return Err(StorageError::Conflict(format!(
                    "parent cycle via {}",
                    parent_id
                )));
            }
        }

        if let Some(existing) = map.get(&asset.id) {
            if asset.version < existing.version {
                return Err(StorageError::VersionConflict {
                    asset_id: asset.id.clone(),
                    stored: existing.version,
                    incoming: asset.version,
                });
            }
        }

        let mut stored = asset;
        stored.path = None;
        map.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_attribute(
        &self,
        ctx: &RealmContext,
        asset_id: &str,
        attribute: Attribute,
    ) -> Result<Asset, StorageError> {
        let mut map = self
            .assets
            .write()
            .map_err(|_| StorageError::Internal("lock failed".to_string()))?;
        let asset = map
            .get_mut(asset_id)
            .filter(|asset| asset.realm == ctx.realm)
            .ok_or_else(|| StorageError::Conflict(format!("asset not found: {}", asset_id)))?;
        asset.attributes.insert(attribute.name.clone(), attribute);
        Ok(asset.clone())
    }

    async fn delete_asset(
        &self,
        ctx: &RealmContext,
        asset_id: &str,
    ) -> Result<bool, StorageError> {
        let mut map = self
            .assets
            .write()
            .map_err(|_| StorageError::Internal("lock failed".to_string()))?;
        match map.get(asset_id) {
            Some(asset) if asset.realm == ctx.realm => {}
            _ => return Ok(false),
        }
        let has_children = map
            .values()
            .any(|asset| asset.parent_id.as_deref() == Some(asset_id));
        if has_children {
            return Err(StorageError::Conflict(format!(
                "asset {} still has children",
                asset_id
            )));
        }
        map.remove(asset_id);
        Ok(true)
    }

    async fn descendant_ids(
        &self,
        ctx: &RealmContext,
        root_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        let map = self
            .assets
            .read()
            .map_err(|_| StorageError::Internal("lock failed".to_string()))?;
        let mut result = Vec::new();
        let mut frontier: VecDeque<String> = VecDeque::from([root_id.to_string()]);
        let mut visited: HashSet<String> = HashSet::new();
        while let Some(current) = frontier.pop_front() {
            for asset in map.values() {
                if asset.parent_id.as_deref() == Some(current.as_str())
                    && asset.realm == ctx.realm
                    && visited.insert(asset.id.clone())
                {
                    result.push(asset.id.clone());
                    frontier.push_back(asset.id.clone());
                }
            }
        }
        Ok(result)
    }

    async fn gateway_ancestor(
        &self,
        ctx: &RealmContext,
        asset_id: &str,
    ) -> Result<Option<String>, StorageError> {
        let map = self
            .assets
            .read()
            .map_err(|_| StorageError::Internal("lock failed".to_string()))?;
        let mut cursor = map
            .get(asset_id)
            .filter(|asset| asset.realm == ctx.realm)
            .and_then(|asset| asset.parent_id.clone());
        let mut seen: HashSet<String> = HashSet::new();
        while let Some(current) = cursor {
            if !seen.insert(current.clone()) {
                break;
            }
            let Some(asset) = map.get(&current) else {
                break;
            };
            if asset.is_gateway() {
                return Ok(Some(asset.id.clone()));
            }
            cursor = asset.parent_id.clone();
        }
        Ok(None)
    }
}
