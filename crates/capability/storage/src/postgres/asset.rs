//! Postgres 资产树存储实现
//!
//! 设计要点：
//! - 所有操作都带有租域作用域验证
//! - 使用参数化 SQL 防止注入
//! - 树展开使用递归 CTE

use crate::error::StorageError;
use crate::traits::AssetStore;
use crate::validation::ensure_realm_scope;
use domain::{Asset, AssetQuery, AssetType, Attribute, RealmContext};
use sqlx::{PgPool, Row};
use std::collections::HashMap;

pub struct PgAssetStore {
    pub pool: PgPool,
}

impl PgAssetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 通过数据库 URL 建立连接池
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

const ASSET_COLUMNS: &str =
    "asset_id, realm, name, asset_type, parent_id, version, created_at_ms, attributes";

fn asset_type_to_str(asset_type: AssetType) -> Result<String, StorageError> {
    match serde_json::to_value(asset_type) {
        Ok(serde_json::Value::String(text)) => Ok(text),
        _ => Err(StorageError::Internal("asset type encode failed".to_string())),
    }
}

fn asset_type_from_str(text: &str) -> Result<AssetType, StorageError> {
    serde_json::from_value(serde_json::Value::String(text.to_string()))
        .map_err(|_| StorageError::Internal(format!("unknown asset type: {}", text)))
}

fn row_to_asset(row: &sqlx::postgres::PgRow) -> Result<Asset, StorageError> {
    let asset_type: String = row.try_get("asset_type")?;
    let attributes: serde_json::Value = row.try_get("attributes")?;
    Ok(Asset {
        id: row.try_get("asset_id")?,
        realm: row.try_get("realm")?,
        name: row.try_get("name")?,
        asset_type: asset_type_from_str(&asset_type)?,
        parent_id: row.try_get("parent_id")?,
        version: row.try_get("version")?,
        created_at_ms: row.try_get("created_at_ms")?,
        path: None,
        attributes: serde_json::from_value(attributes)
            .map_err(|err| StorageError::Internal(err.to_string()))?,
    })
}

/// 根据 (id, parent_id) 表在内存中补全路径。
fn fill_paths(assets: &mut [Asset], parents: &HashMap<String, Option<String>>) {
    for asset in assets.iter_mut() {
        let mut path = vec![asset.id.clone()];
        let mut cursor = asset.parent_id.clone();
        while let Some(parent_id) = cursor {
            if path.contains(&parent_id) {
                break;
            }
            path.push(parent_id.clone());
            cursor = parents.get(&parent_id).cloned().flatten();
        }
        path.reverse();
        asset.path = Some(path);
    }
}

#[async_trait::async_trait]
impl AssetStore for PgAssetStore {
    async fn find_asset(
        &self,
        ctx: &RealmContext,
        asset_id: &str,
    ) -> Result<Option<Asset>, StorageError> {
        let row = sqlx::query(&format!(
            "select {} from assets where asset_id = $1 and realm = $2",
            ASSET_COLUMNS
        ))
        .bind(asset_id)
        .bind(&ctx.realm)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(row_to_asset(&row)?))
    }

    async fn query_assets(
        &self,
        ctx: &RealmContext,
        query: &AssetQuery,
    ) -> Result<Vec<Asset>, StorageError> {
        let realm = query.realm.clone().unwrap_or_else(|| ctx.realm.clone());
        ensure_realm_scope(ctx, &realm)?;

        let rows = if !query.ids.is_empty() {
            sqlx::query(&format!(
                "select {} from assets where realm = $1 and asset_id = any($2)",
                ASSET_COLUMNS
            ))
            .bind(&realm)
            .bind(&query.ids)
            .fetch_all(&self.pool)
            .await?
        } else if !query.parents.is_empty() {
            if query.recursive {
                sqlx::query(&format!(
                    "with recursive descendants as ( \
                         select {cols} from assets \
                         where realm = $1 and parent_id = any($2) \
                         union all \
                         select a.asset_id, a.realm, a.name, a.asset_type, a.parent_id, \
                                a.version, a.created_at_ms, a.attributes \
                         from assets a join descendants d on a.parent_id = d.asset_id \
                     ) select {cols} from descendants order by asset_id",
                    cols = ASSET_COLUMNS
                ))
                .bind(&realm)
                .bind(&query.parents)
                .fetch_all(&self.pool)
                .await?
            } else {
                sqlx::query(&format!(
                    "select {} from assets where realm = $1 and parent_id = any($2) order by asset_id",
                    ASSET_COLUMNS
                ))
                .bind(&realm)
                .bind(&query.parents)
                .fetch_all(&self.pool)
                .await?
            }
        } else if query.recursive {
            sqlx::query(&format!(
                "select {} from assets where realm = $1 order by asset_id",
                ASSET_COLUMNS
            ))
            .bind(&realm)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "select {} from assets where realm = $1 and parent_id is null order by asset_id",
                ASSET_COLUMNS
            ))
            .bind(&realm)
            .fetch_all(&self.pool)
            .await?
        };

        let mut assets = Vec::with_capacity(rows.len());
        for row in &rows {
            assets.push(row_to_asset(row)?);
        }

        if !query.ids.is_empty() {
            // 保持调用方给定的 ID 顺序
            let by_id: HashMap<String, Asset> = assets
                .into_iter()
                .map(|asset| (asset.id.clone(), asset))
                .collect();
            assets = query
                .ids
                .iter()
                .filter_map(|id| by_id.get(id).cloned())
                .collect();
        }

        if query.select.exclude_attributes {
            for asset in assets.iter_mut() {
                asset.attributes.clear();
            }
        }
        if !query.select.exclude_path {
            let rows = sqlx::query("select asset_id, parent_id from assets where realm = $1")
                .bind(&realm)
                .fetch_all(&self.pool)
                .await?;
            let mut parents = HashMap::with_capacity(rows.len());
            for row in &rows {
                parents.insert(row.try_get("asset_id")?, row.try_get("parent_id")?);
            }
            fill_paths(&mut assets, &parents);
        }
        Ok(assets)
    }

    async fn upsert_asset(&self, ctx: &RealmContext, asset: Asset) -> Result<Asset, StorageError> {
        ensure_realm_scope(ctx, &asset.realm)?;
        let mut tx = self.pool.begin().await?;

        if let Some(parent_id) = &asset.parent_id {
            let parent = sqlx::query("select 1 from assets where asset_id = $1 and realm = $2")
                .bind(parent_id)
                .bind(&asset.realm)
                .fetch_optional(&mut *tx)
                .await?;
            if parent.is_none() {
                return Err(StorageError::ParentNotFound(parent_id.clone()));
            }
            let cycle = sqlx::query(
                "with recursive ancestors as ( \
                     select asset_id, parent_id from assets where asset_id = $1 \
                     union all \
                     select a.asset_id, a.parent_id \
                     from assets a join ancestors on a.asset_id = ancestors.parent_id \
                 ) select 1 from ancestors where asset_id = $2",
            )
            .bind(parent_id)
            .bind(&asset.id)
            .fetch_optional(&mut *tx)
            .await?;
            if cycle.is_some() {
                return Err(StorageError::Conflict(format!(
                    "parent cycle via {}",
                    parent_id
                )));
            }
        }

        let stored_version: Option<i64> =
            sqlx::query("select version from assets where asset_id = $1 for update")
                .bind(&asset.id)
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.try_get("version"))
                .transpose()?;
        if let Some(stored) = stored_version {
            if asset.version < stored {
                return Err(StorageError::VersionConflict {
                    asset_id: asset.id.clone(),
                    stored,
                    incoming: asset.version,
                });
            }
        }

        let attributes = serde_json::to_value(&asset.attributes)
            .map_err(|err| StorageError::Internal(err.to_string()))?;
        sqlx::query(
            "insert into assets \
                 (asset_id, realm, name, asset_type, parent_id, version, created_at_ms, attributes) \
             values ($1, $2, $3, $4, $5, $6, $7, $8) \
             on conflict (asset_id) do update set \
                 name = excluded.name, asset_type = excluded.asset_type, \
                 parent_id = excluded.parent_id, version = excluded.version, \
                 attributes = excluded.attributes",
        )
        .bind(&asset.id)
        .bind(&asset.realm)
        .bind(&asset.name)
        .bind(asset_type_to_str(asset.asset_type)?)
        .bind(&asset.parent_id)
        .bind(asset.version)
        .bind(asset.created_at_ms)
        .bind(attributes)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut stored = asset;
        stored.path = None;
        Ok(stored)
    }

    async fn update_attribute(
        &self,
        ctx: &RealmContext,
        asset_id: &str,
        attribute: Attribute,
    ) -> Result<Asset, StorageError> {
        let value = serde_json::to_value(&attribute)
            .map_err(|err| StorageError::Internal(err.to_string()))?;
        let row = sqlx::query(&format!(
            "update assets set attributes = jsonb_set(coalesce(attributes, '{{}}'), array[$3], $4) \
             where asset_id = $1 and realm = $2 returning {}",
            ASSET_COLUMNS
        ))
        .bind(asset_id)
        .bind(&ctx.realm)
        .bind(&attribute.name)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Err(StorageError::Conflict(format!(
                "asset not found: {}",
                asset_id
            )));
        };
        row_to_asset(&row)
    }

    async fn delete_asset(
        &self,
        ctx: &RealmContext,
        asset_id: &str,
    ) -> Result<bool, StorageError> {
        let child = sqlx::query("select 1 from assets where parent_id = $1 limit 1")
            .bind(asset_id)
            .fetch_optional(&self.pool)
            .await?;
        if child.is_some() {
            return Err(StorageError::Conflict(format!(
                "asset {} still has children",
                asset_id
            )));
        }
        let result = sqlx::query("delete from assets where asset_id = $1 and realm = $2")
            .bind(asset_id)
            .bind(&ctx.realm)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn descendant_ids(
        &self,
        ctx: &RealmContext,
        root_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(
            "with recursive descendants as ( \
                 select asset_id, 1 as depth from assets \
                 where parent_id = $1 and realm = $2 \
                 union all \
                 select a.asset_id, d.depth + 1 \
                 from assets a join descendants d on a.parent_id = d.asset_id \
             ) select asset_id from descendants order by depth, asset_id",
        )
        .bind(root_id)
        .bind(&ctx.realm)
        .fetch_all(&self.pool)
        .await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            ids.push(row.try_get("asset_id")?);
        }
        Ok(ids)
    }

    async fn gateway_ancestor(
        &self,
        ctx: &RealmContext,
        asset_id: &str,
    ) -> Result<Option<String>, StorageError> {
        let row = sqlx::query(
            "with recursive ancestors as ( \
                 select asset_id, parent_id, asset_type, 1 as depth from assets \
                 where asset_id = (select parent_id from assets where asset_id = $1 and realm = $2) \
                 union all \
                 select a.asset_id, a.parent_id, a.asset_type, an.depth + 1 \
                 from assets a join ancestors an on a.asset_id = an.parent_id \
             ) select asset_id from ancestors where asset_type = 'gateway' \
             order by depth limit 1",
        )
        .bind(asset_id)
        .bind(&ctx.realm)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(row.try_get("asset_id")?))
    }
}
