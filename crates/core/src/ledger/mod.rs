//! Status Ledger - Durable record of migration attempts
//!
//! The ledger is append-only. Every attempt adds an entry when it starts and
//! stamps that same entry when it completes; failed attempts stay behind as
//! started-but-incomplete entries. The applied version is the highest version
//! among completed entries, never the highest one started.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LedgerResult;
use crate::version::Version;

pub use memory::MemoryLedger;
pub use postgres::{PgLedger, DEFAULT_LEDGER_TABLE};

/// Identifies one ledger entry for later completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("#{}", self.0))
    }
}

/// One recorded migration attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub version: Version,
    pub description: String,
    pub started_at: DateTime<Utc>,
    /// Unset until the attempt succeeded
    pub completed_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Highest version among completed entries
pub fn last_completed_version(entries: &[LedgerEntry]) -> Option<Version> {
    entries
        .iter()
        .filter(|entry| entry.is_completed())
        .map(|entry| entry.version)
        .max()
}

/// Durable bookkeeping of migration attempts against a target store
#[async_trait]
pub trait StatusLedger: Send + Sync {
    /// Make sure the backing storage exists. Safe to call on every run.
    async fn prepare(&self) -> LedgerResult<()> {
        Ok(())
    }

    /// Every entry, in the order the attempts were started
    async fn entries(&self) -> LedgerResult<Vec<LedgerEntry>>;

    /// Highest completed version, or `None` when nothing has completed
    async fn last_applied_version(&self) -> LedgerResult<Option<Version>> {
        Ok(last_completed_version(&self.entries().await?))
    }

    /// Append a started entry; one durable write
    async fn start_migration(&self, version: &Version, description: &str)
        -> LedgerResult<EntryId>;

    /// Stamp the entry as completed now; one durable write
    ///
    /// Completing an entry twice overwrites the timestamp with the later one.
    async fn complete_migration(&self, entry: EntryId) -> LedgerResult<()>;
}
