//! PostgreSQL record store
//!
//! sqlx-backed implementation. The advisory lock is session-scoped in
//! PostgreSQL, so the acquiring pooled connection is pinned for the
//! whole run and the unlock is issued on that same connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::Mutex;

use super::core::{RecordStore, UnitTransaction};
use crate::definitions::{AppliedRecord, MigrationConfig};
use crate::error::{MigrateError, MigrateResult};
use crate::schema::DdlStatement;

pub struct PostgresStore {
    pool: PgPool,
    config: MigrationConfig,
    lock_conn: Mutex<Option<PoolConnection<Postgres>>>,
}

impl PostgresStore {
    /// Create a store over an existing pool with default configuration
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, MigrationConfig::default())
    }

    pub fn with_config(pool: PgPool, config: MigrationConfig) -> Self {
        Self {
            pool,
            config,
            lock_conn: Mutex::new(None),
        }
    }

    /// Connect to the database and create a store with default configuration
    pub async fn connect(database_url: &str) -> MigrateResult<Self> {
        let pool = PgPool::connect(database_url).await.map_err(|e| {
            MigrateError::StoreUnavailable(format!("failed to connect to database: {}", e))
        })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// SQL to create the record table
    fn create_records_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                identifier VARCHAR(255) PRIMARY KEY,\n    \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\n\
            );",
            self.config.records_table
        )
    }

    /// SQL to list applied records
    fn list_applied_sql(&self) -> String {
        format!(
            "SELECT identifier, applied_at FROM {} ORDER BY identifier ASC",
            self.config.records_table
        )
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn ensure_ready(&self) -> MigrateResult<()> {
        sqlx::query(&self.create_records_table_sql())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MigrateError::StoreUnavailable(format!("failed to create records table: {}", e))
            })?;
        Ok(())
    }

    async fn try_lock(&self) -> MigrateResult<()> {
        let mut held = self.lock_conn.lock().await;
        if held.is_some() {
            return Err(MigrateError::MigrationLocked);
        }

        let mut conn = self.pool.acquire().await.map_err(|e| {
            MigrateError::StoreUnavailable(format!("failed to acquire connection: {}", e))
        })?;
        let row = sqlx::query("SELECT pg_try_advisory_lock($1)")
            .bind(self.config.lock_key)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                MigrateError::StoreUnavailable(format!("failed to take advisory lock: {}", e))
            })?;
        let acquired: bool = row.try_get(0).map_err(|e| {
            MigrateError::StoreUnavailable(format!("failed to read lock result: {}", e))
        })?;

        if !acquired {
            return Err(MigrateError::MigrationLocked);
        }
        *held = Some(conn);
        Ok(())
    }

    async fn unlock(&self) -> MigrateResult<()> {
        let mut held = self.lock_conn.lock().await;
        if let Some(mut conn) = held.take() {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(self.config.lock_key)
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    MigrateError::StoreUnavailable(format!(
                        "failed to release advisory lock: {}",
                        e
                    ))
                })?;
        }
        Ok(())
    }

    async fn list_applied(&self) -> MigrateResult<Vec<AppliedRecord>> {
        let rows = sqlx::query(&self.list_applied_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                MigrateError::StoreUnavailable(format!("failed to query applied records: {}", e))
            })?;

        let mut records = Vec::new();
        for row in rows {
            let identifier: String = row.try_get("identifier").map_err(|e| {
                MigrateError::StoreUnavailable(format!("failed to get identifier: {}", e))
            })?;
            let applied_at: DateTime<Utc> = row.try_get("applied_at").map_err(|e| {
                MigrateError::StoreUnavailable(format!("failed to get applied_at: {}", e))
            })?;
            records.push(AppliedRecord {
                identifier,
                applied_at,
            });
        }
        Ok(records)
    }

    async fn begin(&self) -> MigrateResult<Box<dyn UnitTransaction>> {
        let tx = self.pool.begin().await.map_err(|e| {
            MigrateError::StoreUnavailable(format!("failed to start transaction: {}", e))
        })?;
        Ok(Box::new(PostgresUnitTransaction {
            tx,
            records_table: self.config.records_table.clone(),
        }))
    }
}

struct PostgresUnitTransaction {
    tx: Transaction<'static, Postgres>,
    records_table: String,
}

#[async_trait]
impl UnitTransaction for PostgresUnitTransaction {
    async fn execute_ddl(&mut self, statement: &DdlStatement) -> MigrateResult<()> {
        sqlx::query(&statement.to_sql())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| MigrateError::Schema(e.to_string()))?;
        Ok(())
    }

    async fn mark_applied(&mut self, record: &AppliedRecord) -> MigrateResult<()> {
        let check_sql = format!(
            "SELECT identifier FROM {} WHERE identifier = $1",
            self.records_table
        );
        let existing = sqlx::query(&check_sql)
            .bind(&record.identifier)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                MigrateError::StoreUnavailable(format!("failed to check applied record: {}", e))
            })?;
        if existing.is_some() {
            return Err(MigrateError::DuplicateRecord(record.identifier.clone()));
        }

        let insert_sql = format!(
            "INSERT INTO {} (identifier, applied_at) VALUES ($1, $2)",
            self.records_table
        );
        sqlx::query(&insert_sql)
            .bind(&record.identifier)
            .bind(record.applied_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                MigrateError::StoreUnavailable(format!("failed to record migration: {}", e))
            })?;
        Ok(())
    }

    async fn mark_reverted(&mut self, identifier: &str) -> MigrateResult<()> {
        let delete_sql = format!("DELETE FROM {} WHERE identifier = $1", self.records_table);
        let result = sqlx::query(&delete_sql)
            .bind(identifier)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                MigrateError::StoreUnavailable(format!("failed to delete record: {}", e))
            })?;
        if result.rows_affected() == 0 {
            return Err(MigrateError::RecordNotFound(identifier.to_string()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> MigrateResult<()> {
        self.tx.commit().await.map_err(|e| {
            MigrateError::StoreUnavailable(format!("failed to commit migration: {}", e))
        })
    }

    async fn rollback(self: Box<Self>) -> MigrateResult<()> {
        self.tx.rollback().await.map_err(|e| {
            MigrateError::StoreUnavailable(format!("failed to roll back migration: {}", e))
        })
    }
}
