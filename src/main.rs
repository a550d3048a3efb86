use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dora_collector::collector::{Collector, RepositoryOutcome};
use dora_collector::config::AppConfig;
use dora_collector::database::{self, migrations, Storage};
use dora_collector::github::{ActivityFetcher, GitHubClient};
use dora_collector::team::TeamResolver;

const REQUIRED_RELATIONS: &[&str] = &[
    "teams",
    "team_memberships",
    "pr_metrics",
    "collection_metadata",
];

#[derive(Debug, Parser)]
#[command(
    name = "dora-collector",
    version,
    about = "Collect pull-request activity and derive DORA metrics per team"
)]
struct Cli {
    /// Lookback window for repositories collected for the first time
    #[arg(long)]
    lookback_days: Option<i64>,

    /// Repository to collect (owner/repo); repeatable, overrides REPOSITORIES
    #[arg(long = "repo", value_name = "OWNER/REPO")]
    repositories: Vec<String>,

    /// Apply migrations, verify the schema and exit
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dora_collector=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!("Starting DORA metrics collector");

    // Load configuration
    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(days) = cli.lookback_days {
        config.lookback_days = days;
    }
    if !cli.repositories.is_empty() {
        config.repositories = cli.repositories.clone();
    }
    config.validate()?;
    info!(
        "Configuration loaded: driver={}, teams={}, repositories={}",
        config.db_driver.as_str(),
        config.teams.len(),
        config.repositories.len()
    );

    // Initialize database
    let storage = database::connect(config.db_driver, &config.db_url)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    let report = migrations::run_migrations(storage.as_ref())
        .await
        .context("Failed to run migrations")?;
    info!(
        "Migrations complete ({} applied, {} already present)",
        report.applied.len(),
        report.already_applied
    );

    verify_schema(storage.as_ref()).await?;

    if cli.migrate_only {
        return Ok(());
    }

    let index = TeamResolver::new(storage.clone())
        .sync_and_load(&config.teams)
        .await
        .context("Failed to build team membership index")?;
    info!(
        "Membership index built: {} teams, {} members",
        index.all_team_ids().len(),
        index.member_count()
    );

    let token = config.require_github_token()?;
    let client = match &config.github_api_url {
        Some(url) => GitHubClient::with_base_uri(token, url)?,
        None => GitHubClient::new(token)?,
    };
    let fetcher = ActivityFetcher::with_threshold(client, config.rate_limit_threshold);

    let collector = Collector::from_config(&config, Arc::new(fetcher), storage, index);
    let summary = collector.run().await.context("Collection failed")?;

    for repo in &summary.repositories {
        match &repo.outcome {
            RepositoryOutcome::Completed => info!(
                "{}: {} PRs fetched, {} included, {} skipped, {} rows stored",
                repo.repository, repo.prs_fetched, repo.prs_included, repo.prs_skipped, repo.rows_upserted
            ),
            RepositoryOutcome::Skipped(reason) => warn!("{}: skipped ({})", repo.repository, reason),
            RepositoryOutcome::Failed(reason) => error!("{}: failed ({})", repo.repository, reason),
        }
    }

    if summary.has_failures() {
        bail!(
            "{} of {} repositories failed",
            summary.failed().count(),
            summary.repositories.len()
        );
    }

    Ok(())
}

async fn verify_schema(storage: &dyn Storage) -> Result<()> {
    for relation in REQUIRED_RELATIONS {
        let rows = storage
            .count_rows(relation)
            .await
            .with_context(|| format!("Table {} not found or inaccessible", relation))?;
        info!("Table '{}' present ({} rows)", relation, rows);
    }
    Ok(())
}
