//! Error types for the migration runner
//!
//! Every failure surfaces to the caller verbatim with the offending
//! migration identifier. Nothing is retried: a failed DDL statement may
//! have left partial state that needs human inspection.

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error types for migration operations
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Record store unreachable, or transaction plumbing failed
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    /// Migration is already present in the record store
    #[error("Migration '{0}' is already recorded as applied")]
    DuplicateRecord(String),

    /// Migration has no record to revert
    #[error("Migration '{0}' has no applied record")]
    RecordNotFound(String),

    /// A migration unit or the registered set is invalid
    #[error("Malformed migration: {0}")]
    MalformedMigration(String),

    /// A unit's operation failed; the unit's transaction was rolled back
    #[error("Migration '{identifier}' failed: {cause}")]
    ExecutionFailed {
        identifier: String,
        cause: Box<MigrateError>,
    },

    /// Another runner holds the advisory lock on the record store
    #[error("Another migration run holds the advisory lock")]
    MigrationLocked,

    /// A DDL statement was rejected by the schema engine
    #[error("Schema operation rejected: {0}")]
    Schema(String),
}

impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        MigrateError::StoreUnavailable(err.to_string())
    }
}
