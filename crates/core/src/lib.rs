//! # tally-core: Version-ordered migrations with a persisted ledger
//!
//! Applies an ordered sequence of migrations to a target store exactly once
//! each. Progress lives in a ledger inside the target, so repeated runs pick
//! up where the last completed migration left off.
//!
//! - [`Version`] orders migrations.
//! - [`Migration`] is one unit of work against the target.
//! - [`MigrationLocator`] holds the known migrations and answers ordering queries.
//! - [`StatusLedger`] records attempts and completions ([`MemoryLedger`], [`PgLedger`]).
//! - [`MigrationRunner`] sequences everything.
//!
//! ```no_run
//! use sqlx::PgPool;
//! use tally_core::{load_sql_migrations, Migration, MigrationLocator, MigrationRunner, PgLedger};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgres://localhost/app").await?;
//! let migrations = load_sql_migrations("migrations".as_ref())?
//!     .into_iter()
//!     .map(|m| Box::new(m) as Box<dyn Migration<PgPool>>)
//!     .collect();
//! let locator = MigrationLocator::new(migrations)?;
//! let ledger = PgLedger::new(pool.clone(), "_tally_migrations");
//!
//! let mut runner = MigrationRunner::new("localhost/app", pool, locator, ledger);
//! let result = runner.update_to_latest().await?;
//! println!("applied {} migration(s)", result.applied_count());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod locator;
pub mod logging;
pub mod migration;
pub mod runner;
pub mod source;
pub mod sql;
pub mod status;
pub mod version;

pub use config::{ConfigError, LogFormat, TallyConfig};
pub use error::{LedgerError, LedgerResult, MigrationError, MigrationResult};
pub use ledger::{EntryId, LedgerEntry, MemoryLedger, PgLedger, StatusLedger, DEFAULT_LEDGER_TABLE};
pub use locator::MigrationLocator;
pub use logging::{init_logging, LoggingConfig};
pub use migration::Migration;
pub use runner::{with_deadline, MigrationRunResult, MigrationRunner, RunnerState};
pub use source::{create_migration_file, load_sql_migrations};
pub use sql::SqlMigration;
pub use status::{MigrationState, MigrationStatus};
pub use version::{PaddedVersionCodec, Version, VersionCodec};
