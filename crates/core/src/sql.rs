//! SQL Migrations - Migrations written as plain SQL text
//!
//! A [`SqlMigration`] runs its statements in one transaction against a
//! PostgreSQL pool.

use anyhow::Context;
use async_trait::async_trait;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlx::PgPool;

use crate::migration::Migration;
use crate::version::Version;

/// Migration whose body is a block of SQL statements
#[derive(Debug, Clone)]
pub struct SqlMigration {
    version: Version,
    description: String,
    sql: String,
}

impl SqlMigration {
    pub fn new(version: Version, description: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
            sql: sql.into(),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Individual statements of the body, in order
    pub fn statements(&self) -> Vec<String> {
        split_sql_statements(&self.sql)
    }
}

#[async_trait]
impl Migration<PgPool> for SqlMigration {
    fn version(&self) -> Version {
        self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, pool: &mut PgPool) -> anyhow::Result<()> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to start transaction")?;

        for statement in self.statements() {
            sqlx::query(&statement)
                .execute(&mut *transaction)
                .await
                .with_context(|| format!("Failed to execute statement: {}", statement))?;
        }

        transaction
            .commit()
            .await
            .context("Failed to commit transaction")?;
        Ok(())
    }
}

/// Split SQL text into statements using the PostgreSQL grammar
///
/// Text the parser does not understand is split on `;` instead.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(parsed) => parsed.into_iter().map(|stmt| format!("{};", stmt)).collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty() && !is_comment_only(s))
                .map(|s| format!("{};", s))
                .collect()
        }
    }
}

fn is_comment_only(fragment: &str) -> bool {
    fragment
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}
