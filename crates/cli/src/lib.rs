//! Embeddable migration CLI
//!
//! Applications own their migration units; this crate owns the argument
//! surface around them. A typical binary registers its units and hands
//! the loader to [`run`]:
//!
//! ```rust,no_run
//! use gradine::MigrationLoader;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let loader = MigrationLoader::new();
//!     // .register(...) the application's units here
//!     gradine_cli::run(loader).await
//! }
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use gradine::{
    MigrationExecutor, MigrationLoader, MigrationStatus, PostgresStore, RecordStore,
};

#[derive(Parser)]
#[command(name = "migrate", about = "Apply and revert schema migrations")]
pub struct Cli {
    /// Database connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending migrations
    Up {
        /// Stop after this migration identifier
        #[arg(long = "to", value_name = "ID")]
        to: Option<String>,
    },

    /// Revert the most recently applied migrations
    Down {
        /// Number of migrations to revert
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },

    /// Show each migration and whether it has been applied
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Parse the process arguments, run the requested command against the
/// configured database, and turn the outcome into an exit code.
///
/// Errors are printed to stderr with the failing identifier; the exit
/// code is non-zero on any failure.
pub async fn run(loader: MigrationLoader) -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match connect_and_dispatch(cli, loader).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn connect_and_dispatch(cli: Cli, loader: MigrationLoader) -> anyhow::Result<()> {
    let store = PostgresStore::connect(&cli.database_url).await?;
    dispatch(cli.command, loader, store).await
}

/// Run one command against an already-constructed record store
pub async fn dispatch<S: RecordStore>(
    command: Commands,
    loader: MigrationLoader,
    store: S,
) -> anyhow::Result<()> {
    let executor = MigrationExecutor::new(loader, store);
    match command {
        Commands::Up { to } => {
            let report = executor.up(to.as_deref()).await?;
            if report.applied.is_empty() {
                println!("Nothing to apply ({} already applied)", report.skipped);
            } else {
                for identifier in &report.applied {
                    println!("Applied {}", identifier);
                }
                println!(
                    "Applied {} migration(s) in {}ms",
                    report.applied.len(),
                    report.execution_time_ms
                );
            }
        }
        Commands::Down { steps } => {
            let report = executor.down(steps).await?;
            if report.reverted.is_empty() {
                println!("Nothing to revert");
            } else {
                for identifier in &report.reverted {
                    println!("Reverted {}", identifier);
                }
                println!(
                    "Reverted {} migration(s) in {}ms",
                    report.reverted.len(),
                    report.execution_time_ms
                );
            }
        }
        Commands::Status { json } => {
            let entries = executor.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    match &entry.status {
                        MigrationStatus::Applied { applied_at } => {
                            println!("applied  {} ({})", entry.identifier, applied_at)
                        }
                        MigrationStatus::Pending => println!("pending  {}", entry.identifier),
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gradine::{
        ColumnSpec, ColumnType, MemoryStore, MigrateResult, MigrationUnit, Noop, Operation,
        SchemaHandle,
    };

    struct CreateSongs;

    #[async_trait]
    impl Operation for CreateSongs {
        async fn run(&self, schema: &mut SchemaHandle<'_>) -> MigrateResult<()> {
            schema
                .create_table("songs", |table| {
                    table.big_increments("id");
                    table.string("name").not_null();
                })
                .await
        }
    }

    struct BrokenAlter;

    #[async_trait]
    impl Operation for BrokenAlter {
        async fn run(&self, schema: &mut SchemaHandle<'_>) -> MigrateResult<()> {
            schema
                .add_column("albums", ColumnSpec::new("year", ColumnType::Integer))
                .await
        }
    }

    #[test]
    fn test_parse_up_with_target() {
        let cli = Cli::try_parse_from([
            "migrate",
            "--database-url",
            "postgres://localhost/app",
            "up",
            "--to",
            "20210110205706_create_songs",
        ])
        .unwrap();

        match cli.command {
            Commands::Up { to } => {
                assert_eq!(to.as_deref(), Some("20210110205706_create_songs"))
            }
            _ => panic!("expected up command"),
        }
    }

    #[test]
    fn test_parse_down_defaults_to_one_step() {
        let cli = Cli::try_parse_from([
            "migrate",
            "--database-url",
            "postgres://localhost/app",
            "down",
        ])
        .unwrap();

        match cli.command {
            Commands::Down { steps } => assert_eq!(steps, 1),
            _ => panic!("expected down command"),
        }
    }

    #[test]
    fn test_parse_status_json_flag() {
        let cli = Cli::try_parse_from([
            "migrate",
            "--database-url",
            "postgres://localhost/app",
            "status",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Status { json } => assert!(json),
            _ => panic!("expected status command"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_up_against_memory_store() {
        let loader = MigrationLoader::new().register(
            MigrationUnit::new("20210110205706_create_songs")
                .up(CreateSongs)
                .down(Noop),
        );
        let store = MemoryStore::new();

        dispatch(Commands::Up { to: None }, loader, store.clone())
            .await
            .unwrap();
        assert!(store.has_table("songs"));
    }

    #[tokio::test]
    async fn test_dispatch_failure_names_the_identifier() {
        let loader = MigrationLoader::new().register(
            MigrationUnit::new("20210110210844_add_genre_to_songs")
                .up(BrokenAlter)
                .down(Noop),
        );

        let err = dispatch(Commands::Up { to: None }, loader, MemoryStore::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("20210110210844_add_genre_to_songs"));
    }
}
