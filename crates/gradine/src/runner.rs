//! Migration Executor
//!
//! Applies pending migrations and reverts applied ones in strict
//! identifier order, one scoped transaction per unit, holding the
//! record store's advisory lock for the whole run. Execution is
//! fail-fast: the first failing unit rolls back, the run stops, and
//! units after the failure point are never attempted.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::Utc;

use crate::definitions::{
    AppliedRecord, DownReport, MigrationStatus, MigrationUnit, StatusEntry, UpReport,
};
use crate::error::{MigrateError, MigrateResult};
use crate::loader::MigrationLoader;
use crate::schema::SchemaHandle;
use crate::store::{RecordStore, UnitTransaction};

pub struct MigrationExecutor<S> {
    loader: MigrationLoader,
    store: S,
}

impl<S: RecordStore> MigrationExecutor<S> {
    pub fn new(loader: MigrationLoader, store: S) -> Self {
        Self { loader, store }
    }

    pub fn loader(&self) -> &MigrationLoader {
        &self.loader
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply every pending migration, optionally stopping at `target`.
    ///
    /// Pending units with identifiers greater than `target` are left
    /// untouched. Re-running with nothing pending is a no-op success.
    pub async fn up(&self, target: Option<&str>) -> MigrateResult<UpReport> {
        self.store.ensure_ready().await?;
        self.store.try_lock().await?;
        let outcome = self.run_up(target).await;
        self.release_lock().await;
        outcome
    }

    /// Revert the `steps` most recently applied migrations, newest
    /// first. `steps` beyond the applied count reverts everything.
    pub async fn down(&self, steps: usize) -> MigrateResult<DownReport> {
        self.store.ensure_ready().await?;
        self.store.try_lock().await?;
        let outcome = self.run_down(steps).await;
        self.release_lock().await;
        outcome
    }

    /// Every discovered migration paired with its applied/pending state
    pub async fn status(&self) -> MigrateResult<Vec<StatusEntry>> {
        self.store.ensure_ready().await?;
        let units = self.loader.discover()?;
        let applied = self.store.list_applied().await?;
        Self::check_records_have_sources(&units, &applied)?;

        let applied_by_id: HashMap<&str, &AppliedRecord> = applied
            .iter()
            .map(|record| (record.identifier.as_str(), record))
            .collect();

        Ok(units
            .iter()
            .map(|unit| StatusEntry {
                identifier: unit.identifier().to_string(),
                status: match applied_by_id.get(unit.identifier()) {
                    Some(record) => MigrationStatus::Applied {
                        applied_at: record.applied_at,
                    },
                    None => MigrationStatus::Pending,
                },
            })
            .collect())
    }

    async fn run_up(&self, target: Option<&str>) -> MigrateResult<UpReport> {
        let start_time = Instant::now();
        let units = self.loader.discover()?;
        let applied = self.store.list_applied().await?;
        Self::check_records_have_sources(&units, &applied)?;

        if let Some(target) = target {
            if !units.iter().any(|unit| unit.identifier() == target) {
                return Err(MigrateError::MalformedMigration(format!(
                    "target migration '{}' is not registered",
                    target
                )));
            }
        }

        let applied_ids: HashSet<&str> = applied
            .iter()
            .map(|record| record.identifier.as_str())
            .collect();
        let pending: Vec<&MigrationUnit> = units
            .iter()
            .copied()
            .filter(|unit| !applied_ids.contains(unit.identifier()))
            .filter(|unit| target.map_or(true, |t| unit.identifier() <= t))
            .collect();

        let mut newly_applied = Vec::new();
        for unit in pending {
            tracing::info!(identifier = %unit.identifier(), "applying migration");
            self.execute_unit(unit, Direction::Up).await?;
            newly_applied.push(unit.identifier().to_string());
        }

        Ok(UpReport {
            applied: newly_applied,
            skipped: applied_ids.len(),
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    async fn run_down(&self, steps: usize) -> MigrateResult<DownReport> {
        let start_time = Instant::now();
        let units = self.loader.discover()?;
        let applied = self.store.list_applied().await?;
        Self::check_records_have_sources(&units, &applied)?;

        let units_by_id: HashMap<&str, &MigrationUnit> = units
            .iter()
            .map(|unit| (unit.identifier(), *unit))
            .collect();

        let mut reverted = Vec::new();
        for record in applied.iter().rev().take(steps) {
            let unit = match units_by_id.get(record.identifier.as_str()) {
                Some(unit) => *unit,
                None => {
                    return Err(MigrateError::MalformedMigration(format!(
                        "applied record '{}' has no registered migration",
                        record.identifier
                    )))
                }
            };
            tracing::info!(identifier = %unit.identifier(), "reverting migration");
            self.execute_unit(unit, Direction::Down).await?;
            reverted.push(unit.identifier().to_string());
        }

        Ok(DownReport {
            reverted,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Run one unit's operation and its record update in one scoped
    /// transaction: both commit or neither does.
    async fn execute_unit(&self, unit: &MigrationUnit, direction: Direction) -> MigrateResult<()> {
        let operation = match direction {
            Direction::Up => unit.up_operation()?,
            Direction::Down => unit.down_operation()?,
        };

        let mut tx = self.store.begin().await?;
        let run = {
            let mut schema = SchemaHandle::new(&mut *tx);
            operation.run(&mut schema).await
        };
        if let Err(cause) = run {
            Self::abort(tx).await;
            return Err(MigrateError::ExecutionFailed {
                identifier: unit.identifier().to_string(),
                cause: Box::new(cause),
            });
        }

        let record_update = match direction {
            Direction::Up => {
                let record = AppliedRecord {
                    identifier: unit.identifier().to_string(),
                    applied_at: Utc::now(),
                };
                tx.mark_applied(&record).await
            }
            Direction::Down => tx.mark_reverted(unit.identifier()).await,
        };
        if let Err(err) = record_update {
            Self::abort(tx).await;
            return Err(err);
        }

        tx.commit().await
    }

    fn check_records_have_sources(
        units: &[&MigrationUnit],
        applied: &[AppliedRecord],
    ) -> MigrateResult<()> {
        let known: HashSet<&str> = units.iter().map(|unit| unit.identifier()).collect();
        for record in applied {
            if !known.contains(record.identifier.as_str()) {
                return Err(MigrateError::MalformedMigration(format!(
                    "applied record '{}' has no registered migration",
                    record.identifier
                )));
            }
        }
        Ok(())
    }

    async fn abort(tx: Box<dyn UnitTransaction>) {
        if let Err(err) = tx.rollback().await {
            tracing::error!("failed to roll back migration transaction: {}", err);
        }
    }

    async fn release_lock(&self) {
        if let Err(err) = self.store.unlock().await {
            tracing::warn!("failed to release migration lock: {}", err);
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}
