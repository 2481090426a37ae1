use anyhow::Context;
use sqlx::PgPool;
use tally_core::{
    create_migration_file, load_sql_migrations, with_deadline, Migration, MigrationError,
    MigrationLocator, MigrationRunner, MigrationState, PgLedger, StatusLedger, TallyConfig,
    Version,
};
use tracing::info;
use url::Url;

type SqlRunner = MigrationRunner<PgPool, PgLedger>;

/// Connect to the configured database and load the migration directory
async fn connect(config: &TallyConfig) -> anyhow::Result<SqlRunner> {
    let database_url = config.require_database_url()?;
    let target_name = describe_target(database_url);

    let migrations = load_sql_migrations(&config.migrations_dir)?
        .into_iter()
        .map(|m| Box::new(m) as Box<dyn Migration<PgPool>>)
        .collect();
    let locator = MigrationLocator::new(migrations)?;

    let pool = PgPool::connect(database_url)
        .await
        .with_context(|| format!("Failed to connect to {}", target_name))?;
    let ledger = PgLedger::new(pool.clone(), config.ledger_table.clone());

    Ok(MigrationRunner::new(target_name, pool, locator, ledger))
}

/// Host, port and database of a connection URL, without credentials
pub fn describe_target(database_url: &str) -> String {
    match Url::parse(database_url) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("localhost");
            let database = url.path().trim_start_matches('/');
            match url.port() {
                Some(port) => format!("{}:{}/{}", host, port, database),
                None => format!("{}/{}", host, database),
            }
        }
        Err(_) => "database".to_string(),
    }
}

pub async fn run(config: &TallyConfig, to: Option<Version>) -> anyhow::Result<()> {
    let mut runner = connect(config).await?;

    let outcome = with_deadline(config.timeout_secs, async {
        match to {
            Some(version) => runner.update_to(version).await,
            None => runner.update_to_latest().await,
        }
    })
    .await;

    let result = match outcome {
        Ok(result) => result,
        Err(MigrationError::NoMigrationsFound) => {
            info!(
                dir = %config.migrations_dir.display(),
                "No migrations found, nothing to do"
            );
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    if result.applied.is_empty() {
        println!("{} is up to date", result.target);
    } else {
        println!(
            "Applied {} migration(s) to {} in {}ms",
            result.applied_count(),
            result.target,
            result.execution_time_ms
        );
        for version in &result.applied {
            println!("  ✅ {}", version);
        }
    }
    Ok(())
}

pub async fn status(config: &TallyConfig, json: bool) -> anyhow::Result<()> {
    let runner = connect(config).await?;
    let report = with_deadline(config.timeout_secs, runner.status()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Migration Status for {}:", runner.target_name());
    println!("================");

    if report.is_empty() {
        println!("No migrations found");
        return Ok(());
    }

    for entry in &report {
        let marker = match entry.state {
            MigrationState::Applied { .. } => "✅",
            MigrationState::Incomplete { .. } => "❌",
            MigrationState::Pending => "⏳",
            MigrationState::Skipped => "⚠️",
        };
        println!(
            "  {} {:<12} {:<40} {}",
            marker, entry.version, entry.description, entry.state
        );
    }
    Ok(())
}

pub async fn history(config: &TallyConfig) -> anyhow::Result<()> {
    let runner = connect(config).await?;
    let entries = with_deadline(config.timeout_secs, async {
        runner.ledger().prepare().await?;
        Ok::<_, MigrationError>(runner.ledger().entries().await?)
    })
    .await?;

    if entries.is_empty() {
        println!("No ledger entries in {}", config.ledger_table);
        return Ok(());
    }

    for entry in &entries {
        let finished = match entry.completed_at {
            Some(completed_at) => completed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => "never completed".to_string(),
        };
        println!(
            "  {:<6} {:<12} {:<40} {} -> {}",
            entry.id,
            entry.version,
            entry.description,
            entry.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            finished
        );
    }
    Ok(())
}

pub async fn baseline(config: &TallyConfig, to: Version) -> anyhow::Result<()> {
    let mut runner = connect(config).await?;
    let result = with_deadline(config.timeout_secs, runner.mark_up_to(to)).await?;

    println!(
        "Recorded {} migration(s) as applied on {} without running them",
        result.applied_count(),
        result.target
    );
    Ok(())
}

pub fn create(config: &TallyConfig, name: &str) -> anyhow::Result<()> {
    let path = create_migration_file(&config.migrations_dir, name)?;
    println!("Created migration: {}", path.display());
    Ok(())
}
