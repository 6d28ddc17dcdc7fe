//! 存储接口 Trait 定义
//!
//! 定义资产树与网关互联配置的异步接口：
//! - AssetStore：资产树存储（CRUD、查询、乐观版本、属性写入）
//! - GatewayConnectionStore：网关互联配置存储
//!
//! 设计原则：
//! - 所有接口显式接收 RealmContext
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::GatewayConnectionRecord;
use async_trait::async_trait;
use domain::{Asset, AssetQuery, Attribute, RealmContext};

/// 资产树存储接口
///
/// 版本规则：
/// - `upsert_asset` 在目标已存在时拒绝版本号低于已存版本的写入
///   （`VersionConflict`），等版本重写视为幂等覆盖
/// - `update_attribute` 仅改写属性值与时间戳，不触碰结构版本号
///
/// 树规则：
/// - 父节点必须先于子节点存在（`ParentNotFound`）
/// - 带子节点的资产不可直接删除（`Conflict`），调用方自行按子先父后排序
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// 按 ID 查找资产（租域不匹配视为不存在）
    async fn find_asset(
        &self,
        ctx: &RealmContext,
        asset_id: &str,
    ) -> Result<Option<Asset>, StorageError>;

    /// 按查询对象检索资产
    async fn query_assets(
        &self,
        ctx: &RealmContext,
        query: &AssetQuery,
    ) -> Result<Vec<Asset>, StorageError>;

    /// 创建或覆盖资产（受版本规则约束）
    async fn upsert_asset(&self, ctx: &RealmContext, asset: Asset) -> Result<Asset, StorageError>;

    /// 写入单个属性的值与时间戳
    async fn update_attribute(
        &self,
        ctx: &RealmContext,
        asset_id: &str,
        attribute: Attribute,
    ) -> Result<Asset, StorageError>;

    /// 删除资产（存在子节点时拒绝）
    async fn delete_asset(&self, ctx: &RealmContext, asset_id: &str)
        -> Result<bool, StorageError>;

    /// 列出指定资产的全部后代 ID（广度优先，父先于子；不含根自身）
    async fn descendant_ids(
        &self,
        ctx: &RealmContext,
        root_id: &str,
    ) -> Result<Vec<String>, StorageError>;

    /// 沿父链向上查找最近的网关祖先（不含资产自身）
    async fn gateway_ancestor(
        &self,
        ctx: &RealmContext,
        asset_id: &str,
    ) -> Result<Option<String>, StorageError>;
}

/// 网关互联配置存储接口
#[async_trait]
pub trait GatewayConnectionStore: Send + Sync {
    /// 查找本地租域的互联配置
    async fn find_connection(
        &self,
        ctx: &RealmContext,
        local_realm: &str,
    ) -> Result<Option<GatewayConnectionRecord>, StorageError>;

    /// 创建或替换本地租域的互联配置
    async fn upsert_connection(
        &self,
        ctx: &RealmContext,
        record: GatewayConnectionRecord,
    ) -> Result<GatewayConnectionRecord, StorageError>;

    /// 删除本地租域的互联配置
    async fn delete_connection(
        &self,
        ctx: &RealmContext,
        local_realm: &str,
    ) -> Result<bool, StorageError>;

    /// 列出全部互联配置（服务启动装载用）
    async fn list_connections(&self) -> Result<Vec<GatewayConnectionRecord>, StorageError>;
}
