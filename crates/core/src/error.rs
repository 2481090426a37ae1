//! Error types for migration runs
//!
//! [`MigrationError`] is what callers of the runner see. Failures of the
//! ledger itself are kept apart in [`LedgerError`] so that a failed ledger
//! write is never mistaken for a failing migration body.

use thiserror::Error;

use crate::ledger::EntryId;
use crate::version::Version;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error types for locating and applying migrations
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("No migrations found")]
    NoMigrationsFound,

    #[error("Duplicate migration version {version}: \"{first}\" and \"{second}\"")]
    DuplicateVersion {
        version: Version,
        first: String,
        second: String,
    },

    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("No registered migration has version {0}")]
    UnknownVersion(Version),

    #[error("{target} is not up to date: applied version is {current}, latest is {latest}")]
    NotUpToDate {
        target: String,
        current: String,
        latest: Version,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Migration {version} (\"{description}\") failed to be applied to {target}: {source}")]
    MigrationFailed {
        version: Version,
        description: String,
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Migration source error: {0}")]
    Source(String),
}

impl MigrationError {
    /// Version of the migration this error is about, if any
    pub fn version(&self) -> Option<Version> {
        match self {
            MigrationError::DuplicateVersion { version, .. }
            | MigrationError::MigrationFailed { version, .. } => Some(*version),
            MigrationError::UnknownVersion(version) => Some(*version),
            MigrationError::Ledger(LedgerError::Start { version, .. }) => Some(*version),
            _ => None,
        }
    }
}

/// Error types for reading and writing the status ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to prepare migration ledger: {0}")]
    Prepare(String),

    #[error("Failed to read migration ledger: {0}")]
    Read(String),

    #[error("Failed to record start of migration {version}: {message}")]
    Start { version: Version, message: String },

    #[error("Failed to record completion of ledger entry {entry}: {message}")]
    Complete { entry: EntryId, message: String },

    #[error("Ledger entry {0} does not exist")]
    UnknownEntry(EntryId),

    #[error("Ledger holds an unreadable version '{raw}': {message}")]
    Decode { raw: String, message: String },

    #[error("Migration run timed out after {0}s")]
    Timeout(u64),
}

impl LedgerError {
    /// Whether the interrupted attempt is already in the ledger as a started,
    /// never completed entry. A failed start write means it was never recorded.
    pub fn attempt_recorded(&self) -> bool {
        matches!(self, LedgerError::Complete { .. } | LedgerError::Timeout(_))
    }
}

/// Renders an optional applied version for messages
pub(crate) fn describe_version(version: Option<&Version>) -> String {
    version.map_or_else(|| "none".to_string(), Version::to_string)
}
