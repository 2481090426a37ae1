//! Logging setup
//!
//! The library only emits `tracing` events; binaries call [`init_logging`]
//! once at startup to install a subscriber.

use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, TallyConfig};

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level or filter directive, e.g. "info" or "tally_core=debug"
    pub level: String,
    pub format: LogFormat,
    /// Include file and line number information
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Logging settings taken from a runner configuration
    pub fn from_config(config: &TallyConfig) -> Self {
        Self {
            level: config.log_level.clone(),
            format: config.log_format,
            include_location: false,
        }
    }

    /// Minimal output for tests
    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            format: LogFormat::Plain,
            include_location: false,
        }
    }

    pub fn with_location(mut self, include_location: bool) -> Self {
        self.include_location = include_location;
        self
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let layer = Layer::new()
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(layer.pretty())
            .try_init()?,
        LogFormat::Plain => tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()?,
    }

    tracing::debug!(
        level = %config.level,
        format = %config.format,
        "Logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = TallyConfig {
            log_level: "tally_core=debug".to_string(),
            log_format: LogFormat::Json,
            ..TallyConfig::default()
        };
        let logging = LoggingConfig::from_config(&config);
        assert_eq!(logging.level, "tally_core=debug");
        assert_eq!(logging.format, LogFormat::Json);
        assert!(!logging.include_location);
        assert!(logging.with_location(true).include_location);
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::test();
        // Another test may have installed a subscriber already; either way
        // the second call in this test must fail.
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
