//! Core record store traits
//!
//! These traits abstract the record store and the relational engine
//! behind it, so the executor works against any backend.

use async_trait::async_trait;

use crate::definitions::AppliedRecord;
use crate::error::MigrateResult;
use crate::schema::DdlStatement;

/// Persists which migrations have been applied, in order
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the record table when it does not exist yet
    async fn ensure_ready(&self) -> MigrateResult<()>;

    /// Take the advisory lock guarding a whole run.
    ///
    /// Fails immediately with `MigrationLocked` when another runner
    /// holds it; never blocks.
    async fn try_lock(&self) -> MigrateResult<()>;

    /// Release the advisory lock
    async fn unlock(&self) -> MigrateResult<()>;

    /// Applied records ordered by identifier ascending
    async fn list_applied(&self) -> MigrateResult<Vec<AppliedRecord>>;

    /// Open the scoped transaction for a single migration unit
    async fn begin(&self) -> MigrateResult<Box<dyn UnitTransaction>>;
}

/// Scoped transaction wrapping one unit's DDL and its record update.
///
/// Either everything in the transaction commits or nothing does; the
/// executor rolls back before propagating an operation failure.
#[async_trait]
pub trait UnitTransaction: Send {
    /// Execute one DDL statement against the schema
    async fn execute_ddl(&mut self, statement: &DdlStatement) -> MigrateResult<()>;

    /// Record the unit as applied; `DuplicateRecord` if already present
    async fn mark_applied(&mut self, record: &AppliedRecord) -> MigrateResult<()>;

    /// Remove the unit's record; `RecordNotFound` if absent
    async fn mark_reverted(&mut self, identifier: &str) -> MigrateResult<()>;

    async fn commit(self: Box<Self>) -> MigrateResult<()>;

    async fn rollback(self: Box<Self>) -> MigrateResult<()>;
}
