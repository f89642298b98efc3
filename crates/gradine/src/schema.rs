//! Schema operations - the narrow DDL interface
//!
//! Operations see the relational engine only through a [`SchemaHandle`]
//! scoped to their unit's transaction. Each call builds one tagged
//! [`DdlStatement`] and forwards it immediately, so statement order
//! inside an operation is preserved.

use crate::error::MigrateResult;
use crate::store::UnitTransaction;

/// Column types understood by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing 64-bit primary key
    BigIncrements,
    Text,
    Integer,
    Boolean,
    Timestamp,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::BigIncrements => "BIGSERIAL PRIMARY KEY",
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMPTZ",
        }
    }
}

/// One column declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnSpec {
    /// New nullable column of the given type
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.column_type.as_sql());
        // a serial primary key is implicitly NOT NULL
        if !self.nullable && self.column_type != ColumnType::BigIncrements {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

/// Fluent builder for CREATE TABLE column lists
#[derive(Default)]
pub struct TableBuilder {
    columns: Vec<ColumnSpec>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Add an auto-incrementing primary key column
    pub fn big_increments(&mut self, name: &str) -> &mut Self {
        let mut column = ColumnSpec::new(name, ColumnType::BigIncrements);
        column.nullable = false;
        self.columns.push(column);
        self
    }

    /// Add a text column
    pub fn string(&mut self, name: &str) -> &mut Self {
        self.columns.push(ColumnSpec::new(name, ColumnType::Text));
        self
    }

    /// Add an integer column
    pub fn integer(&mut self, name: &str) -> &mut Self {
        self.columns.push(ColumnSpec::new(name, ColumnType::Integer));
        self
    }

    /// Add a boolean column
    pub fn boolean(&mut self, name: &str) -> &mut Self {
        self.columns.push(ColumnSpec::new(name, ColumnType::Boolean));
        self
    }

    /// Add a timestamp column
    pub fn timestamp(&mut self, name: &str) -> &mut Self {
        self.columns.push(ColumnSpec::new(name, ColumnType::Timestamp));
        self
    }

    /// Mark the most recently added column NOT NULL
    pub fn not_null(&mut self) -> &mut Self {
        if let Some(column) = self.columns.last_mut() {
            column.nullable = false;
        }
        self
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    fn into_columns(self) -> Vec<ColumnSpec> {
        self.columns
    }
}

/// Tagged DDL statement crossing the narrow engine interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlStatement {
    CreateTable {
        table: String,
        columns: Vec<ColumnSpec>,
    },
    DropTable {
        table: String,
    },
    AddColumn {
        table: String,
        column: ColumnSpec,
    },
    DropColumn {
        table: String,
        column: String,
    },
}

impl DdlStatement {
    /// PostgreSQL rendering of the statement
    pub fn to_sql(&self) -> String {
        match self {
            DdlStatement::CreateTable { table, columns } => {
                let column_sql: Vec<String> = columns.iter().map(|c| c.to_sql()).collect();
                format!(
                    "CREATE TABLE {} (\n    {}\n);",
                    table,
                    column_sql.join(",\n    ")
                )
            }
            DdlStatement::DropTable { table } => format!("DROP TABLE {};", table),
            DdlStatement::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN {};",
                table,
                column.to_sql()
            ),
            DdlStatement::DropColumn { table, column } => {
                format!("ALTER TABLE {} DROP COLUMN {};", table, column)
            }
        }
    }
}

/// Scoped view over one unit's live transaction.
///
/// Owned by the executor for the duration of a single operation, never
/// retained across migrations.
pub struct SchemaHandle<'t> {
    tx: &'t mut dyn UnitTransaction,
}

impl<'t> SchemaHandle<'t> {
    pub(crate) fn new(tx: &'t mut dyn UnitTransaction) -> Self {
        Self { tx }
    }

    /// Create a table with the columns declared by the callback
    pub async fn create_table<F>(&mut self, table: &str, build: F) -> MigrateResult<()>
    where
        F: FnOnce(&mut TableBuilder),
    {
        let mut builder = TableBuilder::new();
        build(&mut builder);
        self.apply(DdlStatement::CreateTable {
            table: table.to_string(),
            columns: builder.into_columns(),
        })
        .await
    }

    pub async fn drop_table(&mut self, table: &str) -> MigrateResult<()> {
        self.apply(DdlStatement::DropTable {
            table: table.to_string(),
        })
        .await
    }

    pub async fn add_column(&mut self, table: &str, column: ColumnSpec) -> MigrateResult<()> {
        self.apply(DdlStatement::AddColumn {
            table: table.to_string(),
            column,
        })
        .await
    }

    pub async fn drop_column(&mut self, table: &str, column: &str) -> MigrateResult<()> {
        self.apply(DdlStatement::DropColumn {
            table: table.to_string(),
            column: column.to_string(),
        })
        .await
    }

    async fn apply(&mut self, statement: DdlStatement) -> MigrateResult<()> {
        self.tx.execute_ddl(&statement).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_sql() {
        let mut builder = TableBuilder::new();
        builder.big_increments("id");
        builder.string("name").not_null();
        builder.string("artist");
        builder.integer("song_number");

        let statement = DdlStatement::CreateTable {
            table: "songs".to_string(),
            columns: builder.into_columns(),
        };
        let sql = statement.to_sql();
        assert!(sql.contains("CREATE TABLE songs"));
        assert!(sql.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(sql.contains("name TEXT NOT NULL"));
        assert!(sql.contains("artist TEXT"));
        assert!(sql.contains("song_number INTEGER"));
    }

    #[test]
    fn test_alter_table_sql() {
        let add = DdlStatement::AddColumn {
            table: "songs".to_string(),
            column: ColumnSpec::new("genre", ColumnType::Text),
        };
        assert_eq!(add.to_sql(), "ALTER TABLE songs ADD COLUMN genre TEXT;");

        let drop = DdlStatement::DropColumn {
            table: "songs".to_string(),
            column: "genre".to_string(),
        };
        assert_eq!(drop.to_sql(), "ALTER TABLE songs DROP COLUMN genre;");
    }

    #[test]
    fn test_not_null_marks_last_column() {
        let mut builder = TableBuilder::new();
        builder.string("name").not_null();
        builder.string("album");

        let columns = builder.columns();
        assert!(!columns[0].nullable);
        assert!(columns[1].nullable);
    }

    #[test]
    fn test_drop_table_sql() {
        let statement = DdlStatement::DropTable {
            table: "songs".to_string(),
        };
        assert_eq!(statement.to_sql(), "DROP TABLE songs;");
    }
}
