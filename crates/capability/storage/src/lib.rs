//! # AMS Storage 模块
//!
//! 资产树与网关互联配置的统一存储抽象层。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：资产树与互联配置的异步 Trait 接口
//! 2. **数据模型层** (`models.rs`)：存储相关的数据结构
//! 3. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 4. **验证辅助层** (`validation.rs`)：租域作用域验证
//! 5. **连接管理层** (`connection.rs`)：数据库连接池管理
//! 6. **实现层**：
//!    - `in_memory/`：内存存储实现（用于测试和演示）
//!    - `postgres/`：PostgreSQL 存储实现（生产环境使用）
//!
//! ## 核心约束
//!
//! - **租域隔离**：所有接口显式接收 `RealmContext`，资产不跨租域
//! - **乐观版本**：并发写入同一资产由版本号冲突检出，落后者收到
//!   `VersionConflict`
//! - **树完整性**：父节点先于子节点存在，删除顺序子先父后，禁止成环

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod traits;
pub mod validation;

pub use connection::connect_pool;
pub use error::StorageError;
pub use in_memory::{InMemoryAssetStore, InMemoryGatewayConnectionStore};
pub use models::GatewayConnectionRecord;
pub use postgres::{PgAssetStore, PgGatewayConnectionStore};
pub use traits::{AssetStore, GatewayConnectionStore};
pub use validation::ensure_realm_scope;
