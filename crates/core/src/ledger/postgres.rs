//! PostgreSQL ledger
//!
//! Stores one row per migration attempt. Versions are written through the
//! configured [`VersionCodec`], so `ORDER BY version` in SQL agrees with the
//! ordering of [`Version`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;

use super::{EntryId, LedgerEntry, StatusLedger};
use crate::error::{LedgerError, LedgerResult};
use crate::version::{PaddedVersionCodec, Version, VersionCodec};

/// Table used when none is configured
pub const DEFAULT_LEDGER_TABLE: &str = "_tally_migrations";

/// Whether `name` can be spliced into SQL as a (optionally schema-qualified)
/// table name
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Ledger stored in a PostgreSQL table
pub struct PgLedger {
    pool: PgPool,
    table: String,
    codec: Arc<dyn VersionCodec>,
}

impl PgLedger {
    /// Ledger using the default zero-padded version encoding
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self::with_codec(pool, table, PaddedVersionCodec)
    }

    /// Ledger using a custom version encoding
    pub fn with_codec(
        pool: PgPool,
        table: impl Into<String>,
        codec: impl VersionCodec + 'static,
    ) -> Self {
        Self {
            pool,
            table: table.into(),
            codec: Arc::new(codec),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// SQL to create the ledger table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id BIGSERIAL PRIMARY KEY,\n    \
                version VARCHAR(64) NOT NULL,\n    \
                description TEXT NOT NULL,\n    \
                started_at TIMESTAMPTZ NOT NULL,\n    \
                completed_at TIMESTAMPTZ\n\
            )",
            self.table
        )
    }

    /// SQL to index the ledger by version
    pub fn create_index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {}_version_idx ON {} (version)",
            self.table.replace('.', "_"),
            self.table
        )
    }

    /// SQL to list every entry in attempt order
    pub fn entries_sql(&self) -> String {
        format!(
            "SELECT id, version, description, started_at, completed_at FROM {} ORDER BY id",
            self.table
        )
    }

    /// SQL to fetch the highest completed version
    pub fn last_applied_sql(&self) -> String {
        format!(
            "SELECT version FROM {} WHERE completed_at IS NOT NULL ORDER BY version DESC LIMIT 1",
            self.table
        )
    }

    /// SQL to append a started entry
    pub fn start_entry_sql(&self) -> String {
        format!(
            "INSERT INTO {} (version, description, started_at) VALUES ($1, $2, $3) RETURNING id",
            self.table
        )
    }

    /// SQL to stamp an entry as completed
    pub fn complete_entry_sql(&self) -> String {
        format!("UPDATE {} SET completed_at = $1 WHERE id = $2", self.table)
    }
}

#[async_trait]
impl StatusLedger for PgLedger {
    async fn prepare(&self) -> LedgerResult<()> {
        if !is_valid_table_name(&self.table) {
            return Err(LedgerError::Prepare(format!(
                "Invalid ledger table name '{}'",
                self.table
            )));
        }

        for sql in [self.create_table_sql(), self.create_index_sql()] {
            sqlx::query(&sql).execute(&self.pool).await.map_err(|e| {
                LedgerError::Prepare(format!("Failed to create ledger table {}: {}", self.table, e))
            })?;
        }
        Ok(())
    }

    async fn entries(&self) -> LedgerResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(&self.entries_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LedgerError::Read(format!("Failed to query ledger entries: {}", e)))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let read = |e: sqlx::Error| LedgerError::Read(format!("Malformed ledger row: {}", e));
            let id: i64 = row.try_get("id").map_err(read)?;
            let version: String = row.try_get("version").map_err(read)?;
            let description: String = row.try_get("description").map_err(read)?;
            let started_at: DateTime<Utc> = row.try_get("started_at").map_err(read)?;
            let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(read)?;

            entries.push(LedgerEntry {
                id: EntryId(id),
                version: self.codec.decode(&version)?,
                description,
                started_at,
                completed_at,
            });
        }

        Ok(entries)
    }

    async fn last_applied_version(&self) -> LedgerResult<Option<Version>> {
        let row = sqlx::query(&self.last_applied_sql())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::Read(format!("Failed to query applied version: {}", e)))?;

        match row {
            Some(row) => {
                let raw: String = row
                    .try_get("version")
                    .map_err(|e| LedgerError::Read(format!("Malformed ledger row: {}", e)))?;
                Ok(Some(self.codec.decode(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn start_migration(
        &self,
        version: &Version,
        description: &str,
    ) -> LedgerResult<EntryId> {
        let row = sqlx::query(&self.start_entry_sql())
            .bind(self.codec.encode(version))
            .bind(description)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LedgerError::Start {
                version: *version,
                message: e.to_string(),
            })?;

        let id: i64 = row.try_get("id").map_err(|e| LedgerError::Start {
            version: *version,
            message: format!("Insert returned no id: {}", e),
        })?;
        Ok(EntryId(id))
    }

    async fn complete_migration(&self, entry: EntryId) -> LedgerResult<()> {
        let result = sqlx::query(&self.complete_entry_sql())
            .bind(Utc::now())
            .bind(entry.0)
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Complete {
                entry,
                message: e.to_string(),
            })?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::UnknownEntry(entry));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(table: &str) -> PgLedger {
        let pool = PgPool::connect_lazy("postgres://localhost/tally_test").unwrap();
        PgLedger::new(pool, table)
    }

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("_tally_migrations"));
        assert!(is_valid_table_name("ops.schema_log"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("1table"));
        assert!(!is_valid_table_name("a.b.c"));
        assert!(!is_valid_table_name("log; DROP TABLE users"));
        assert!(!is_valid_table_name("log."));
    }

    #[tokio::test]
    async fn test_ledger_sql_generation() {
        let ledger = ledger(DEFAULT_LEDGER_TABLE);

        let create = ledger.create_table_sql();
        assert!(create.contains("CREATE TABLE IF NOT EXISTS _tally_migrations"));
        assert!(create.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(create.contains("completed_at TIMESTAMPTZ\n"));

        assert_eq!(
            ledger.create_index_sql(),
            "CREATE INDEX IF NOT EXISTS _tally_migrations_version_idx ON _tally_migrations (version)"
        );
        assert!(ledger
            .last_applied_sql()
            .contains("WHERE completed_at IS NOT NULL ORDER BY version DESC LIMIT 1"));
        assert!(ledger.start_entry_sql().ends_with("RETURNING id"));
        assert_eq!(
            ledger.complete_entry_sql(),
            "UPDATE _tally_migrations SET completed_at = $1 WHERE id = $2"
        );
    }

    #[tokio::test]
    async fn test_schema_qualified_index_name() {
        let ledger = ledger("ops.schema_log");
        assert_eq!(
            ledger.create_index_sql(),
            "CREATE INDEX IF NOT EXISTS ops_schema_log_version_idx ON ops.schema_log (version)"
        );
    }

    #[tokio::test]
    async fn test_prepare_rejects_invalid_table_before_touching_database() {
        let ledger = ledger("migrations; DROP TABLE users");
        let err = ledger.prepare().await.unwrap_err();
        assert!(matches!(err, LedgerError::Prepare(_)));
    }
}
