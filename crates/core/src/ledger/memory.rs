//! In-process ledger
//!
//! Keeps entries in memory behind a shared handle. Clones see the same
//! entries, which lets a caller inspect the ledger after handing a clone to a
//! runner.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{EntryId, LedgerEntry, StatusLedger};
use crate::error::{LedgerError, LedgerResult};
use crate::version::Version;

/// Ledger held in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger preloaded with existing entries
    pub fn with_entries(entries: Vec<LedgerEntry>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<LedgerEntry>>, String> {
        self.entries
            .lock()
            .map_err(|_| "memory ledger lock poisoned".to_string())
    }
}

#[async_trait]
impl StatusLedger for MemoryLedger {
    async fn entries(&self) -> LedgerResult<Vec<LedgerEntry>> {
        let entries = self.lock().map_err(LedgerError::Read)?;
        Ok(entries.clone())
    }

    async fn start_migration(
        &self,
        version: &Version,
        description: &str,
    ) -> LedgerResult<EntryId> {
        let mut entries = self.lock().map_err(|message| LedgerError::Start {
            version: *version,
            message,
        })?;

        let id = EntryId(entries.iter().map(|e| e.id.0).max().unwrap_or(0) + 1);
        entries.push(LedgerEntry {
            id,
            version: *version,
            description: description.to_string(),
            started_at: Utc::now(),
            completed_at: None,
        });
        Ok(id)
    }

    async fn complete_migration(&self, entry: EntryId) -> LedgerResult<()> {
        let mut entries = self
            .lock()
            .map_err(|message| LedgerError::Complete { entry, message })?;

        let record = entries
            .iter_mut()
            .find(|e| e.id == entry)
            .ok_or(LedgerError::UnknownEntry(entry))?;
        record.completed_at = Some(Utc::now());
        Ok(())
    }
}
