//! Postgres 存储实现
//!
//! 表结构：
//!
//! ```sql
//! create table assets (
//!     asset_id      text primary key,
//!     realm         text not null,
//!     name          text not null,
//!     asset_type    text not null,
//!     parent_id     text references assets (asset_id),
//!     version       bigint not null,
//!     created_at_ms bigint not null,
//!     attributes    jsonb not null default '{}'
//! );
//! create index assets_realm_parent on assets (realm, parent_id);
//!
//! create table gateway_connections (
//!     local_realm   text primary key,
//!     host          text not null,
//!     port          integer not null,
//!     realm         text not null,
//!     client_id     text not null,
//!     client_secret text not null,
//!     secure        boolean not null default false,
//!     disabled      boolean not null default false
//! );
//! ```

mod asset;
mod gateway_connection;

pub use asset::PgAssetStore;
pub use gateway_connection::PgGatewayConnectionStore;
