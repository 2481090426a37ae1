//! Migration status reporting
//!
//! Joins the registered migrations with the ledger entries to tell the
//! operator what has run, what is waiting, and what was attempted and never
//! finished.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::ledger::{last_completed_version, LedgerEntry};
use crate::version::Version;

/// Where a registered migration stands against the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationState {
    /// Completed at least once
    Applied { completed_at: DateTime<Utc> },
    /// Attempted, never completed; the next run retries it
    Incomplete { started_at: DateTime<Utc> },
    /// Never attempted; the next run applies it
    Pending,
    /// Older than the applied version yet never completed; runs will not pick
    /// it up
    Skipped,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::Applied { completed_at } => {
                write!(f, "applied {}", completed_at.format("%Y-%m-%d %H:%M:%S UTC"))
            }
            MigrationState::Incomplete { started_at } => write!(
                f,
                "incomplete (started {})",
                started_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            MigrationState::Pending => write!(f, "pending"),
            MigrationState::Skipped => write!(f, "skipped"),
        }
    }
}

/// Status line for one registered migration
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub version: Version,
    pub description: String,
    pub state: MigrationState,
    /// Ledger entries recorded for this version
    pub attempts: usize,
}

/// Status of every registered migration, in the order given
pub fn summarize<'a>(
    registered: impl IntoIterator<Item = (Version, &'a str)>,
    entries: &[LedgerEntry],
) -> Vec<MigrationStatus> {
    let applied = last_completed_version(entries);

    registered
        .into_iter()
        .map(|(version, description)| {
            let attempts: Vec<&LedgerEntry> =
                entries.iter().filter(|e| e.version == version).collect();

            let completed = attempts.iter().filter_map(|e| e.completed_at).max();
            let state = match (completed, attempts.last()) {
                (Some(completed_at), _) => MigrationState::Applied { completed_at },
                _ if applied.map_or(false, |applied| version < applied) => MigrationState::Skipped,
                (None, Some(last)) => MigrationState::Incomplete {
                    started_at: last.started_at,
                },
                (None, None) => MigrationState::Pending,
            };

            MigrationStatus {
                version,
                description: description.to_string(),
                state,
                attempts: attempts.len(),
            }
        })
        .collect()
}
