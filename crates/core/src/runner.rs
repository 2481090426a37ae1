//! Migration Runner - Applies pending migrations against one target
//!
//! The runner reads the applied version from the ledger, takes every
//! registered migration after it up to the requested version, and applies
//! them one at a time. The first failure stops the batch; whatever completed
//! before it stays applied.
//!
//! A runner owns its target and ledger for the whole run. Two runners working
//! on the same store at once are not supported: nothing locks the ledger.

use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{describe_version, LedgerError, MigrationError, MigrationResult};
use crate::ledger::StatusLedger;
use crate::locator::MigrationLocator;
use crate::migration::Migration;
use crate::status::{summarize, MigrationStatus};
use crate::version::Version;

/// Where the runner is in its current or last run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Resolving { current: Option<Version> },
    Applying { version: Version },
    Failed { version: Version },
}

/// Result of an update or baseline run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRunResult {
    /// Identity of the migrated store
    pub target: String,
    /// Applied version before the run
    pub from: Option<Version>,
    /// Version the run was asked to reach
    pub to: Version,
    /// Versions recorded as completed by this run, in order
    pub applied: Vec<Version>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// Orchestrates locator, ledger and migration execution for one target
pub struct MigrationRunner<T: Send, L> {
    target: T,
    target_name: String,
    locator: MigrationLocator<T>,
    ledger: L,
    state: RunnerState,
}

impl<T: Send, L: StatusLedger> MigrationRunner<T, L> {
    /// Create a runner for `target`, named `target_name` in logs and errors
    pub fn new(
        target_name: impl Into<String>,
        target: T,
        locator: MigrationLocator<T>,
        ledger: L,
    ) -> Self {
        Self {
            target,
            target_name: target_name.into(),
            locator,
            ledger,
            state: RunnerState::Idle,
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn locator(&self) -> &MigrationLocator<T> {
        &self.locator
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn state(&self) -> &RunnerState {
        &self.state
    }

    /// Apply every pending migration
    pub async fn update_to_latest(&mut self) -> MigrationResult<MigrationRunResult> {
        info!(target_store = %self.target_name, "Updating {} to latest", self.target_name);
        let latest = self.locator.latest_version()?;
        self.update_to(latest).await
    }

    /// Apply pending migrations with a version up to and including `version`
    pub async fn update_to(&mut self, version: Version) -> MigrationResult<MigrationRunResult> {
        let start_time = Instant::now();

        self.ledger.prepare().await?;
        let current = self.ledger.last_applied_version().await?;
        self.state = RunnerState::Resolving { current };

        info!(
            target_store = %self.target_name,
            current = %describe_version(current.as_ref()),
            update_to = %version,
            "Updating {}",
            self.target_name
        );

        let pending: Vec<&dyn Migration<T>> = self
            .locator
            .migrations_after(current.as_ref())
            .iter()
            .take_while(|m| m.version() <= version)
            .map(|m| &**m)
            .collect();

        if pending.is_empty() {
            debug!(target_store = %self.target_name, "No pending migrations");
        }

        let mut applied = Vec::with_capacity(pending.len());
        for migration in pending {
            let migration_version = migration.version();
            self.state = RunnerState::Applying {
                version: migration_version,
            };

            let outcome = apply(&mut self.target, &self.ledger, &self.target_name, migration).await;

            if let Err(err) = outcome {
                self.state = RunnerState::Failed {
                    version: migration_version,
                };
                warn!(
                    target_store = %self.target_name,
                    applied = applied.len(),
                    "Halting migration run at {}",
                    migration_version
                );
                return Err(err);
            }
            applied.push(migration_version);
        }

        self.state = RunnerState::Idle;
        let result = MigrationRunResult {
            target: self.target_name.clone(),
            from: current,
            to: version,
            applied,
            execution_time_ms: start_time.elapsed().as_millis(),
        };

        info!(
            target_store = %self.target_name,
            applied = result.applied_count(),
            elapsed_ms = result.execution_time_ms as u64,
            "Migration run finished"
        );
        Ok(result)
    }

    /// Apply the migration registered under `version`, whatever the ledger
    /// says about it
    ///
    /// Running an already applied migration again records a new entry.
    pub async fn apply_migration(&mut self, version: Version) -> MigrationResult<()> {
        let migration = self
            .locator
            .find(&version)
            .ok_or(MigrationError::UnknownVersion(version))?;

        self.ledger.prepare().await?;
        self.state = RunnerState::Applying { version };
        let outcome = apply(&mut self.target, &self.ledger, &self.target_name, migration).await;
        self.state = match &outcome {
            Ok(()) => RunnerState::Idle,
            Err(_) => RunnerState::Failed { version },
        };
        outcome
    }

    /// Record every pending migration up to `version` as completed without
    /// running it
    ///
    /// Used to adopt a store whose schema already matches those migrations.
    /// `version` must be a registered version.
    pub async fn mark_up_to(&mut self, version: Version) -> MigrationResult<MigrationRunResult> {
        let start_time = Instant::now();

        if self.locator.find(&version).is_none() {
            return Err(MigrationError::UnknownVersion(version));
        }

        self.ledger.prepare().await?;
        let current = self.ledger.last_applied_version().await?;

        let mut marked = Vec::new();
        for migration in self
            .locator
            .migrations_after(current.as_ref())
            .iter()
            .take_while(|m| m.version() <= version)
        {
            let entry = self
                .ledger
                .start_migration(&migration.version(), migration.description())
                .await?;
            self.ledger.complete_migration(entry).await?;
            info!(
                target_store = %self.target_name,
                version = %migration.version(),
                description = migration.description(),
                "Marked migration as applied"
            );
            marked.push(migration.version());
        }

        Ok(MigrationRunResult {
            target: self.target_name.clone(),
            from: current,
            to: version,
            applied: marked,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Status of every registered migration against the ledger
    pub async fn status(&self) -> MigrationResult<Vec<MigrationStatus>> {
        self.ledger.prepare().await?;
        let entries = self.ledger.entries().await?;
        Ok(summarize(
            self.locator
                .migrations()
                .iter()
                .map(|m| (m.version(), m.description())),
            &entries,
        ))
    }

    /// Whether the ledger has reached the latest registered version
    pub async fn is_up_to_date(&self) -> MigrationResult<bool> {
        let latest = self.locator.latest_version()?;
        self.ledger.prepare().await?;
        let current = self.ledger.last_applied_version().await?;
        Ok(current.map_or(false, |current| current >= latest))
    }

    /// Fail with [`MigrationError::NotUpToDate`] unless the ledger has reached
    /// the latest registered version
    pub async fn ensure_up_to_date(&self) -> MigrationResult<()> {
        let latest = self.locator.latest_version()?;
        self.ledger.prepare().await?;
        let current = self.ledger.last_applied_version().await?;
        if current.map_or(false, |current| current >= latest) {
            return Ok(());
        }
        Err(MigrationError::NotUpToDate {
            target: self.target_name.clone(),
            current: describe_version(current.as_ref()),
            latest,
        })
    }
}

/// Run one migration attempt: record the start, execute, record completion
async fn apply<T: Send, L: StatusLedger>(
    target: &mut T,
    ledger: &L,
    target_name: &str,
    migration: &dyn Migration<T>,
) -> MigrationResult<()> {
    let version = migration.version();
    let description = migration.description();
    info!(
        version = %version,
        description,
        target_store = target_name,
        "Applying migration"
    );

    let entry = ledger
        .start_migration(&version, description)
        .await
        .map_err(|e| {
            error!(version = %version, error = %e, "Could not record migration start");
            e
        })?;

    if let Err(cause) = migration.execute(target).await {
        error!(
            version = %version,
            description,
            target_store = target_name,
            error = %cause,
            "Migration failed to be applied"
        );
        return Err(MigrationError::MigrationFailed {
            version,
            description: description.to_string(),
            target: target_name.to_string(),
            source: cause,
        });
    }

    ledger.complete_migration(entry).await.map_err(|e| {
        error!(version = %version, entry = %entry, error = %e, "Could not record migration completion");
        e
    })?;
    debug!(version = %version, entry = %entry, "Migration completed");
    Ok(())
}

/// Await `run`, giving up after `timeout_secs` when set
///
/// An expired deadline is reported as [`LedgerError::Timeout`]: the attempt in
/// flight stays in the ledger as started but incomplete.
pub async fn with_deadline<F, R>(timeout_secs: Option<u64>, run: F) -> MigrationResult<R>
where
    F: Future<Output = MigrationResult<R>>,
{
    match timeout_secs {
        None => run.await,
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run)
            .await
            .map_err(|_| MigrationError::Ledger(LedgerError::Timeout(secs)))?,
    }
}
