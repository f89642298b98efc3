//! In-memory record store
//!
//! Structural stand-in for a relational engine: tracks tables, columns
//! and applied records, and enforces enough DDL consistency (no
//! creating an existing table, no altering a missing one) to behave
//! like the real thing under test. Each unit transaction works on a
//! snapshot that is written back on commit, so rollback falls out of
//! dropping the snapshot.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::core::{RecordStore, UnitTransaction};
use crate::definitions::AppliedRecord;
use crate::error::{MigrateError, MigrateResult};
use crate::schema::{ColumnSpec, DdlStatement};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: BTreeMap<String, Vec<ColumnSpec>>,
    records: BTreeMap<String, AppliedRecord>,
}

impl MemoryState {
    fn apply_ddl(&mut self, statement: &DdlStatement) -> MigrateResult<()> {
        match statement {
            DdlStatement::CreateTable { table, columns } => {
                if self.tables.contains_key(table) {
                    return Err(MigrateError::Schema(format!(
                        "table '{}' already exists",
                        table
                    )));
                }
                self.tables.insert(table.clone(), columns.clone());
            }
            DdlStatement::DropTable { table } => {
                if self.tables.remove(table).is_none() {
                    return Err(MigrateError::Schema(format!(
                        "table '{}' does not exist",
                        table
                    )));
                }
            }
            DdlStatement::AddColumn { table, column } => {
                let columns = self.tables.get_mut(table).ok_or_else(|| {
                    MigrateError::Schema(format!("table '{}' does not exist", table))
                })?;
                if columns.iter().any(|c| c.name == column.name) {
                    return Err(MigrateError::Schema(format!(
                        "column '{}' already exists on '{}'",
                        column.name, table
                    )));
                }
                columns.push(column.clone());
            }
            DdlStatement::DropColumn { table, column } => {
                let columns = self.tables.get_mut(table).ok_or_else(|| {
                    MigrateError::Schema(format!("table '{}' does not exist", table))
                })?;
                let before = columns.len();
                columns.retain(|c| &c.name != column);
                if columns.len() == before {
                    return Err(MigrateError::Schema(format!(
                        "column '{}' does not exist on '{}'",
                        column, table
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<MemoryState>,
    locked: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state().tables.contains_key(table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.state()
            .tables
            .get(table)
            .map(|columns| columns.iter().any(|c| c.name == column))
            .unwrap_or(false)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ensure_ready(&self) -> MigrateResult<()> {
        Ok(())
    }

    async fn try_lock(&self) -> MigrateResult<()> {
        let was_locked = self
            .inner
            .locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err();
        if was_locked {
            return Err(MigrateError::MigrationLocked);
        }
        Ok(())
    }

    async fn unlock(&self) -> MigrateResult<()> {
        self.inner.locked.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn list_applied(&self) -> MigrateResult<Vec<AppliedRecord>> {
        // BTreeMap keys keep records in identifier order
        Ok(self.state().records.values().cloned().collect())
    }

    async fn begin(&self) -> MigrateResult<Box<dyn UnitTransaction>> {
        let working = self.state().clone();
        Ok(Box::new(MemoryUnitTransaction {
            store: self.clone(),
            working,
        }))
    }
}

struct MemoryUnitTransaction {
    store: MemoryStore,
    working: MemoryState,
}

#[async_trait]
impl UnitTransaction for MemoryUnitTransaction {
    async fn execute_ddl(&mut self, statement: &DdlStatement) -> MigrateResult<()> {
        self.working.apply_ddl(statement)
    }

    async fn mark_applied(&mut self, record: &AppliedRecord) -> MigrateResult<()> {
        if self.working.records.contains_key(&record.identifier) {
            return Err(MigrateError::DuplicateRecord(record.identifier.clone()));
        }
        self.working
            .records
            .insert(record.identifier.clone(), record.clone());
        Ok(())
    }

    async fn mark_reverted(&mut self, identifier: &str) -> MigrateResult<()> {
        if self.working.records.remove(identifier).is_none() {
            return Err(MigrateError::RecordNotFound(identifier.to_string()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> MigrateResult<()> {
        let MemoryUnitTransaction { store, working } = *self;
        *store.state() = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MigrateResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use chrono::Utc;

    fn create_songs() -> DdlStatement {
        DdlStatement::CreateTable {
            table: "songs".to_string(),
            columns: vec![ColumnSpec::new("name", ColumnType::Text).not_null()],
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.execute_ddl(&create_songs()).await.unwrap();
        assert!(!store.has_table("songs"));

        tx.commit().await.unwrap();
        assert!(store.has_table("songs"));
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.execute_ddl(&create_songs()).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(!store.has_table("songs"));
    }

    #[tokio::test]
    async fn test_ddl_consistency_checks() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.execute_ddl(&create_songs()).await.unwrap();

        let duplicate = tx.execute_ddl(&create_songs()).await.unwrap_err();
        assert!(matches!(duplicate, MigrateError::Schema(_)));

        let missing = tx
            .execute_ddl(&DdlStatement::DropColumn {
                table: "albums".to_string(),
                column: "title".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(missing, MigrateError::Schema(_)));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let store = MemoryStore::new();
        store.try_lock().await.unwrap();

        let contended = store.try_lock().await.unwrap_err();
        assert!(matches!(contended, MigrateError::MigrationLocked));

        store.unlock().await.unwrap();
        store.try_lock().await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_applied_rejects_duplicates() {
        let store = MemoryStore::new();
        let record = AppliedRecord {
            identifier: "20240101_a".to_string(),
            applied_at: Utc::now(),
        };

        let mut tx = store.begin().await.unwrap();
        tx.mark_applied(&record).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.mark_applied(&record).await.unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateRecord(_)));
    }

    #[tokio::test]
    async fn test_mark_reverted_requires_record() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx.mark_reverted("20240101_a").await.unwrap_err();
        assert!(matches!(err, MigrateError::RecordNotFound(_)));
    }
}
