//! Migration Source - Loading SQL migrations from a directory
//!
//! Files are named `<version>__<description>.sql`, for example
//! `1.2.0__add_email_index.sql`. Underscores in the description part become
//! spaces.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MigrationError, MigrationResult};
use crate::sql::SqlMigration;
use crate::version::Version;

/// Extension of migration files
pub const MIGRATION_EXTENSION: &str = "sql";

/// Separator between version and description in a file name
const NAME_SEPARATOR: &str = "__";

/// Version used for the first migration of an empty directory
const FIRST_VERSION: Version = Version::new(1, 0, 0);

/// Split a file stem into its version and description
pub fn parse_file_stem(stem: &str) -> MigrationResult<(Version, String)> {
    let (version, name) = stem.split_once(NAME_SEPARATOR).ok_or_else(|| {
        MigrationError::Source(format!(
            "Migration file '{}' must be named <version>__<description>.sql",
            stem
        ))
    })?;

    let version: Version = version.parse()?;
    let description = name.replace('_', " ").trim().to_string();
    if description.is_empty() {
        return Err(MigrationError::Source(format!(
            "Migration file '{}' has an empty description",
            stem
        )));
    }

    Ok((version, description))
}

/// Load every `.sql` migration in `dir`, ascending by version
///
/// A missing directory holds no migrations.
pub fn load_sql_migrations(dir: &Path) -> MigrationResult<Vec<SqlMigration>> {
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "Migrations directory does not exist");
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|e| {
        MigrationError::Source(format!("Failed to read migrations directory {}: {}", dir.display(), e))
    })?;

    let mut migrations = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| MigrationError::Source(format!("Failed to read directory entry: {}", e)))?
            .path();

        if !path.is_file() || path.extension().map_or(true, |ext| ext != MIGRATION_EXTENSION) {
            continue;
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                MigrationError::Source(format!("Invalid migration filename: {}", path.display()))
            })?;
        let (version, description) = parse_file_stem(stem)?;

        let sql = fs::read_to_string(&path).map_err(|e| {
            MigrationError::Source(format!("Failed to read migration file {}: {}", path.display(), e))
        })?;

        migrations.push(SqlMigration::new(version, description, sql));
    }

    migrations.sort_by_key(SqlMigration::version);
    Ok(migrations)
}

/// Write a new, empty migration file after the highest existing version
pub fn create_migration_file(dir: &Path, name: &str) -> MigrationResult<PathBuf> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(MigrationError::Source(
            "Migration name must contain letters or digits".to_string(),
        ));
    }

    fs::create_dir_all(dir).map_err(|e| {
        MigrationError::Source(format!("Failed to create migrations directory: {}", e))
    })?;

    let version = match load_sql_migrations(dir)?.last() {
        Some(latest) => latest.version().next_revision().ok_or_else(|| {
            MigrationError::Source(format!(
                "No revision left after {}; start a new minor version by hand",
                latest.version()
            ))
        })?,
        None => FIRST_VERSION,
    };

    let path = dir.join(format!(
        "{}{}{}.{}",
        version, NAME_SEPARATOR, slug, MIGRATION_EXTENSION
    ));
    fs::write(&path, migration_template(name, &version)).map_err(|e| {
        MigrationError::Source(format!("Failed to write migration file: {}", e))
    })?;

    tracing::info!(version = %version, path = %path.display(), "Created migration file");
    Ok(path)
}

fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn migration_template(name: &str, version: &Version) -> String {
    format!(
        "-- Migration: {}\n\
         -- Version: {}\n\
         -- Created: {}\n\
         --\n\
         -- Statements run in one transaction. A failed attempt is retried from\n\
         -- the first statement on the next run, so keep them re-runnable.\n\n",
        name.trim(),
        version,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_file_stem() {
        let (version, description) = parse_file_stem("1.2.0__add_email_index").unwrap();
        assert_eq!(version, Version::new(1, 2, 0));
        assert_eq!(description, "add email index");

        let (version, _) = parse_file_stem("7__backfill").unwrap();
        assert_eq!(version, Version::from(7));
    }

    #[test]
    fn test_parse_file_stem_rejects_bad_names() {
        assert!(matches!(
            parse_file_stem("add_index"),
            Err(MigrationError::Source(_))
        ));
        assert!(matches!(
            parse_file_stem("x.1__add_index"),
            Err(MigrationError::InvalidVersion { .. })
        ));
        assert!(matches!(parse_file_stem("1__"), Err(MigrationError::Source(_))));
    }

    #[test]
    fn test_load_migrations_sorted_by_version() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("1.10.0__drop_legacy_column.sql"),
            "ALTER TABLE accounts DROP COLUMN legacy;",
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("1.2.0__backfill_field.sql"),
            "UPDATE accounts SET active = true;",
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("1__add_index.sql"),
            "CREATE INDEX accounts_email_idx ON accounts (email);",
        )
        .unwrap();
        fs::write(temp_dir.path().join("README.md"), "not a migration").unwrap();

        let migrations = load_sql_migrations(temp_dir.path()).unwrap();
        let versions: Vec<Version> = migrations.iter().map(SqlMigration::version).collect();
        assert_eq!(
            versions,
            vec![Version::from(1), Version::new(1, 2, 0), Version::new(1, 10, 0)]
        );
        assert_eq!(migrations[2].description(), "drop legacy column");
        assert!(migrations[1].sql().contains("UPDATE accounts"));
    }

    #[test]
    fn test_load_from_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let migrations = load_sql_migrations(&temp_dir.path().join("absent")).unwrap();
        assert!(migrations.is_empty());
    }

    #[test]
    fn test_load_reports_badly_named_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("add_index.sql"), "SELECT 1;").unwrap();
        assert!(load_sql_migrations(temp_dir.path()).is_err());
    }

    #[test]
    fn test_create_migration_file_numbers_sequentially() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("migrations");

        let first = create_migration_file(&dir, "Add index").unwrap();
        assert_eq!(first.file_name().unwrap(), "1.0.0__add_index.sql");

        let second = create_migration_file(&dir, "backfill-field").unwrap();
        assert_eq!(second.file_name().unwrap(), "1.0.1__backfill_field.sql");

        let content = fs::read_to_string(&second).unwrap();
        assert!(content.contains("-- Migration: backfill-field"));
        assert!(content.contains("-- Version: 1.0.1"));

        let loaded = load_sql_migrations(&dir).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].statements().is_empty());
    }

    #[test]
    fn test_create_migration_file_at_last_revision() {
        let temp_dir = TempDir::new().unwrap();
        let last = temp_dir.path().join("1.0.4294967295__last.sql");
        fs::write(&last, "SELECT 1;").unwrap();

        let err = create_migration_file(temp_dir.path(), "next").unwrap_err();
        assert!(matches!(err, MigrationError::Source(_)));

        let loaded = load_sql_migrations(temp_dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_create_migration_file_requires_a_name() {
        let temp_dir = TempDir::new().unwrap();
        assert!(create_migration_file(temp_dir.path(), " -- ").is_err());
    }
}
