//! Migration Loader - collects and orders migration units
//!
//! Units are registered in code at load time; `discover` validates the
//! set and yields it sorted by identifier ascending. The loader is
//! read-only and never touches the record store.

use std::collections::HashSet;

use crate::definitions::MigrationUnit;
use crate::error::{MigrateError, MigrateResult};

#[derive(Default)]
pub struct MigrationLoader {
    units: Vec<MigrationUnit>,
}

impl MigrationLoader {
    pub fn new() -> Self {
        Self { units: Vec::new() }
    }

    /// Register a migration unit; registration order does not matter
    pub fn register(mut self, unit: MigrationUnit) -> Self {
        self.units.push(unit);
        self
    }

    /// All registered units, ordered by identifier ascending.
    ///
    /// Fails with `MalformedMigration` when an identifier is empty or
    /// duplicated, or when a unit lacks its up or down operation.
    pub fn discover(&self) -> MigrateResult<Vec<&MigrationUnit>> {
        let mut seen = HashSet::new();
        for unit in &self.units {
            if unit.identifier().is_empty() {
                return Err(MigrateError::MalformedMigration(
                    "empty migration identifier".to_string(),
                ));
            }
            if !seen.insert(unit.identifier()) {
                return Err(MigrateError::MalformedMigration(format!(
                    "duplicate migration identifier '{}'",
                    unit.identifier()
                )));
            }
            unit.up_operation()?;
            unit.down_operation()?;
        }

        let mut ordered: Vec<&MigrationUnit> = self.units.iter().collect();
        ordered.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        Ok(ordered)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::Noop;

    fn unit(identifier: &str) -> MigrationUnit {
        MigrationUnit::new(identifier).up(Noop).down(Noop)
    }

    #[test]
    fn test_discover_sorts_by_identifier() {
        let loader = MigrationLoader::new()
            .register(unit("20210110210844_add_genre_to_songs"))
            .register(unit("20210110205706_create_songs"));

        let units = loader.discover().unwrap();
        assert_eq!(units[0].identifier(), "20210110205706_create_songs");
        assert_eq!(units[1].identifier(), "20210110210844_add_genre_to_songs");
    }

    #[test]
    fn test_duplicate_identifier_is_malformed() {
        let loader = MigrationLoader::new()
            .register(unit("20240101_a"))
            .register(unit("20240101_a"));

        let err = loader.discover().unwrap_err();
        assert!(matches!(err, MigrateError::MalformedMigration(_)));
    }

    #[test]
    fn test_missing_down_is_malformed() {
        let loader = MigrationLoader::new().register(MigrationUnit::new("20240101_a").up(Noop));

        let err = loader.discover().unwrap_err();
        assert!(matches!(err, MigrateError::MalformedMigration(_)));
    }

    #[test]
    fn test_missing_up_is_malformed() {
        let loader = MigrationLoader::new().register(MigrationUnit::new("20240101_a").down(Noop));

        let err = loader.discover().unwrap_err();
        assert!(matches!(err, MigrateError::MalformedMigration(_)));
    }

    #[test]
    fn test_empty_identifier_is_malformed() {
        let loader = MigrationLoader::new().register(unit(""));

        let err = loader.discover().unwrap_err();
        assert!(matches!(err, MigrateError::MalformedMigration(_)));
    }
}
