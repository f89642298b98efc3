//! Core migration types
//!
//! Defines the fundamental types used throughout the migration system:
//! the migration unit with its up/down operations, the applied-record
//! row, runner configuration, and run reports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, MigrateResult};
use crate::schema::SchemaHandle;

/// One reversible schema change, executed against a scoped transaction
#[async_trait]
pub trait Operation: Send + Sync {
    async fn run(&self, schema: &mut SchemaHandle<'_>) -> MigrateResult<()>;
}

/// Operation that intentionally changes nothing.
///
/// A no-op down is a valid declaration: the runner does not distinguish
/// "nothing to undo" from "successfully undid nothing", and still
/// removes the applied record when reverting through it.
pub struct Noop;

#[async_trait]
impl Operation for Noop {
    async fn run(&self, _schema: &mut SchemaHandle<'_>) -> MigrateResult<()> {
        Ok(())
    }
}

/// One ordered, reversible schema change.
///
/// The identifier must sort monotonically (timestamp-prefixed by
/// convention, e.g. `20210110205706_create_songs`). Units are built
/// once at registration time and never mutated afterwards.
pub struct MigrationUnit {
    identifier: String,
    up: Option<Box<dyn Operation>>,
    down: Option<Box<dyn Operation>>,
}

impl std::fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("identifier", &self.identifier)
            .field("up", &self.up.is_some())
            .field("down", &self.down.is_some())
            .finish()
    }
}

impl MigrationUnit {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            up: None,
            down: None,
        }
    }

    /// Attach the up operation
    pub fn up(mut self, operation: impl Operation + 'static) -> Self {
        self.up = Some(Box::new(operation));
        self
    }

    /// Attach the down operation
    pub fn down(mut self, operation: impl Operation + 'static) -> Self {
        self.down = Some(Box::new(operation));
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(crate) fn up_operation(&self) -> MigrateResult<&dyn Operation> {
        self.up.as_deref().ok_or_else(|| {
            MigrateError::MalformedMigration(format!(
                "migration '{}' declares no up operation",
                self.identifier
            ))
        })
    }

    pub(crate) fn down_operation(&self) -> MigrateResult<&dyn Operation> {
        self.down.as_deref().ok_or_else(|| {
            MigrateError::MalformedMigration(format!(
                "migration '{}' declares no down operation",
                self.identifier
            ))
        })
    }
}

/// Row persisted in the record store for each applied migration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedRecord {
    pub identifier: String,
    pub applied_at: DateTime<Utc>,
}

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Table name for tracking applied migrations
    pub records_table: String,
    /// Advisory lock key shared by every runner on the same store
    pub lock_key: i64,
}

/// ascii "gradine1"
pub const DEFAULT_LOCK_KEY: i64 = 0x6772_6164_696e_6531;

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            records_table: "gradine_migrations".to_string(),
            lock_key: DEFAULT_LOCK_KEY,
        }
    }
}

/// Result of an up run
#[derive(Debug)]
pub struct UpReport {
    /// Identifiers applied by this run, in order
    pub applied: Vec<String>,
    /// Number of migrations that were already applied
    pub skipped: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Result of a down run
#[derive(Debug)]
pub struct DownReport {
    /// Identifiers reverted by this run, newest first
    pub reverted: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Not yet applied
    Pending,
    /// Applied, with the record's timestamp
    Applied { applied_at: DateTime<Utc> },
}

/// One discovered migration paired with its status
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub identifier: String,
    pub status: MigrationStatus,
}
