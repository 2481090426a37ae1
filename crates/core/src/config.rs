//! Runner configuration
//!
//! Values are layered: defaults, then an optional YAML file, then environment
//! variables. The CLI applies its flags on top.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::ledger::{postgres::is_valid_table_name, DEFAULT_LEDGER_TABLE};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Ok(LogFormat::Plain),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::invalid_value(
                "log_format",
                s,
                "plain, pretty, or json",
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = match self {
            LogFormat::Plain => "plain",
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        };
        write!(f, "{}", format)
    }
}

/// Settings for one migration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    pub database_url: Option<String>,
    pub migrations_dir: PathBuf,
    pub ledger_table: String,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Deadline for a whole run; unset means no deadline
    pub timeout_secs: Option<u64>,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            migrations_dir: PathBuf::from("migrations"),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            timeout_secs: None,
        }
    }
}

impl TallyConfig {
    /// Load a YAML configuration file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults, then `file` when given, then the process environment
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env()
    }

    /// Override values from the process environment
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(|key| env::var(key).ok())
    }

    /// Override values from `lookup`, which resolves variable names
    pub fn with_vars<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(dir) = lookup("TALLY_MIGRATIONS_DIR") {
            self.migrations_dir = PathBuf::from(dir);
        }
        if let Some(table) = lookup("TALLY_LEDGER_TABLE") {
            self.ledger_table = table;
        }
        if let Some(level) = lookup("TALLY_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(format) = lookup("TALLY_LOG_FORMAT") {
            self.log_format = format.parse()?;
        }
        if let Some(timeout) = lookup("TALLY_TIMEOUT_SECS") {
            let secs = timeout.parse().map_err(|_| {
                ConfigError::invalid_value("timeout_secs", &timeout, "number of seconds")
            })?;
            self.timeout_secs = Some(secs);
        }
        Ok(self)
    }

    /// Check values that do not depend on the command being run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_table_name(&self.ledger_table) {
            return Err(ConfigError::invalid_value(
                "ledger_table",
                &self.ledger_table,
                "a table name of letters, digits and underscores, optionally schema-qualified",
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::invalid_value(
                "timeout_secs",
                "0",
                "a positive number of seconds",
            ));
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "log_level",
                &self.log_level,
                "a level or filter such as info or tally=debug",
            ));
        }
        Ok(())
    }

    /// The database URL, for commands that talk to the database
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::missing_required(
                    "database_url",
                    "Set DATABASE_URL or pass --database-url",
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = TallyConfig::default();
        assert_eq!(config.ledger_table, "_tally_migrations");
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.require_database_url(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_variables_override_defaults() {
        let config = TallyConfig::default()
            .with_vars(vars(&[
                ("DATABASE_URL", "postgres://localhost/app"),
                ("TALLY_MIGRATIONS_DIR", "db/migrations"),
                ("TALLY_LEDGER_TABLE", "ops.schema_log"),
                ("TALLY_LOG_FORMAT", "JSON"),
                ("TALLY_TIMEOUT_SECS", "120"),
            ]))
            .unwrap();

        assert_eq!(config.require_database_url().unwrap(), "postgres://localhost/app");
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrations"));
        assert_eq!(config.ledger_table, "ops.schema_log");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.timeout_secs, Some(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_variables_are_reported() {
        let err = TallyConfig::default()
            .with_vars(vars(&[("TALLY_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));

        let err = TallyConfig::default()
            .with_vars(vars(&[("TALLY_LOG_FORMAT", "xml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = TallyConfig {
            ledger_table: "migrations; DROP TABLE users".to_string(),
            ..TallyConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TallyConfig {
            timeout_secs: Some(0),
            ..TallyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_file_keeps_defaults_for_missing_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tally.yaml");
        std::fs::write(
            &path,
            "database_url: postgres://db.internal/orders\nlog_format: pretty\n",
        )
        .unwrap();

        let config = TallyConfig::from_file(&path).unwrap();
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://db.internal/orders")
        );
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.ledger_table, DEFAULT_LEDGER_TABLE);
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = TallyConfig::from_file(Path::new("/nonexistent/tally.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tally.yaml");
        std::fs::write(&path, "ledger_table: from_file\nlog_level: warn\n").unwrap();

        env::set_var("TALLY_LEDGER_TABLE", "from_env");
        let config = TallyConfig::load(Some(&path));
        env::remove_var("TALLY_LEDGER_TABLE");

        let config = config.unwrap();
        assert_eq!(config.ledger_table, "from_env");
        assert_eq!(config.log_level, "warn");
    }
}
