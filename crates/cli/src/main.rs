mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tally_core::{init_logging, LogFormat, LoggingConfig, TallyConfig, Version};

use commands::migrate;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Apply version-ordered migrations and track them in a ledger table")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database connection URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Directory holding the .sql migration files
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Ledger table name
    #[arg(long, global = true)]
    table: Option<String>,

    /// Log level or filter directive
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Give up on a run after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Up {
        /// Stop after this version instead of the latest one
        #[arg(long)]
        to: Option<Version>,
    },

    /// Show every known migration and its ledger state
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List every ledger entry in attempt order
    History,

    /// Record migrations up to a version as applied without running them
    Baseline {
        /// Last version to record
        #[arg(long)]
        to: Version,
    },

    /// Create a new migration file
    New {
        /// Migration name
        name: String,
    },
}

impl Cli {
    /// Layer command-line flags over the file and environment settings
    fn apply_to(&self, mut config: TallyConfig) -> TallyConfig {
        if let Some(url) = &self.database_url {
            config.database_url = Some(url.clone());
        }
        if let Some(dir) = &self.dir {
            config.migrations_dir = dir.clone();
        }
        if let Some(table) = &self.table {
            config.ledger_table = table.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if self.json_logs {
            config.log_format = LogFormat::Json;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = Some(timeout);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = TallyConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let config = cli.apply_to(config);
    config.validate()?;

    init_logging(&LoggingConfig::from_config(&config))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    match cli.command {
        Commands::Up { to } => migrate::run(&config, to).await?,
        Commands::Status { json } => migrate::status(&config, json).await?,
        Commands::History => migrate::history(&config).await?,
        Commands::Baseline { to } => migrate::baseline(&config, to).await?,
        Commands::New { name } => migrate::create(&config, &name)?,
    }

    Ok(())
}
