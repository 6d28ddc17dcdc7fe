//! Postgres 网关互联配置存储实现

use crate::error::StorageError;
use crate::models::GatewayConnectionRecord;
use crate::traits::GatewayConnectionStore;
use crate::validation::ensure_realm_scope;
use domain::RealmContext;
use sqlx::{PgPool, Row};

pub struct PgGatewayConnectionStore {
    pub pool: PgPool,
}

impl PgGatewayConnectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CONNECTION_COLUMNS: &str =
    "local_realm, host, port, realm, client_id, client_secret, secure, disabled";

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<GatewayConnectionRecord, StorageError> {
    let port: i32 = row.try_get("port")?;
    Ok(GatewayConnectionRecord {
        local_realm: row.try_get("local_realm")?,
        host: row.try_get("host")?,
        port: port as u16,
        realm: row.try_get("realm")?,
        client_id: row.try_get("client_id")?,
        client_secret: row.try_get("client_secret")?,
        secure: row.try_get("secure")?,
        disabled: row.try_get("disabled")?,
    })
}

#[async_trait::async_trait]
impl GatewayConnectionStore for PgGatewayConnectionStore {
    async fn find_connection(
        &self,
        ctx: &RealmContext,
        local_realm: &str,
    ) -> Result<Option<GatewayConnectionRecord>, StorageError> {
        ensure_realm_scope(ctx, local_realm)?;
        let row = sqlx::query(&format!(
            "select {} from gateway_connections where local_realm = $1",
            CONNECTION_COLUMNS
        ))
        .bind(local_realm)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(row_to_record(&row)?))
    }

    async fn upsert_connection(
        &self,
        ctx: &RealmContext,
        record: GatewayConnectionRecord,
    ) -> Result<GatewayConnectionRecord, StorageError> {
        ensure_realm_scope(ctx, &record.local_realm)?;
        sqlx::query(
            "insert into gateway_connections \
                 (local_realm, host, port, realm, client_id, client_secret, secure, disabled) \
             values ($1, $2, $3, $4, $5, $6, $7, $8) \
             on conflict (local_realm) do update set \
                 host = excluded.host, port = excluded.port, realm = excluded.realm, \
                 client_id = excluded.client_id, client_secret = excluded.client_secret, \
                 secure = excluded.secure, disabled = excluded.disabled",
        )
        .bind(&record.local_realm)
        .bind(&record.host)
        .bind(record.port as i32)
        .bind(&record.realm)
        .bind(&record.client_id)
        .bind(&record.client_secret)
        .bind(record.secure)
        .bind(record.disabled)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete_connection(
        &self,
        ctx: &RealmContext,
        local_realm: &str,
    ) -> Result<bool, StorageError> {
        ensure_realm_scope(ctx, local_realm)?;
        let result = sqlx::query("delete from gateway_connections where local_realm = $1")
            .bind(local_realm)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_connections(&self) -> Result<Vec<GatewayConnectionRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {} from gateway_connections",
            CONNECTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }
}
