//! Migration Definitions - The unit of work applied by the runner
//!
//! A migration is identified by its [`Version`], carries a free-text
//! description for the ledger and the logs, and performs its work through the
//! target handle the runner passes in.

use async_trait::async_trait;

use crate::version::Version;

/// One transformation of the target store
///
/// The runner calls [`Migration::execute`] exactly once per attempt, handing
/// it the target it owns for the duration of the run. The body must touch only
/// that handle. Returning `Ok(())` marks the attempt complete in the ledger;
/// returning an error leaves the attempt recorded as started but incomplete.
///
/// There is no rollback. If the process dies or the body fails halfway, the
/// same migration runs again from the start on the next run, so bodies must be
/// safe to re-run over a partially applied state.
#[async_trait]
pub trait Migration<T: Send>: Send + Sync {
    /// Version defining this migration's place in the sequence
    fn version(&self) -> Version;

    /// Human-readable description recorded in the ledger
    fn description(&self) -> &str;

    /// Apply the migration to the target
    async fn execute(&self, target: &mut T) -> anyhow::Result<()>;
}
