//! Exactly-once migration runner.
//!
//! Every migration body is checked against the `schema_migrations` ledger
//! before it runs and is recorded only after it succeeds, so a body never runs
//! twice against the same storage, across restarts included.

use std::collections::HashSet;
use tracing::{debug, info};

use super::Storage;
use crate::config::DbDriver;
use crate::error::{CollectorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration<'a> {
    pub version: &'a str,
    pub sql: &'a str,
}

const SQLITE_MIGRATIONS: &[Migration<'static>] = &[
    Migration {
        version: "001_create_teams.sql",
        sql: include_str!("../../migrations/sqlite/001_create_teams.sql"),
    },
    Migration {
        version: "002_create_team_memberships.sql",
        sql: include_str!("../../migrations/sqlite/002_create_team_memberships.sql"),
    },
    Migration {
        version: "003_create_pr_metrics.sql",
        sql: include_str!("../../migrations/sqlite/003_create_pr_metrics.sql"),
    },
    Migration {
        version: "004_create_collection_metadata.sql",
        sql: include_str!("../../migrations/sqlite/004_create_collection_metadata.sql"),
    },
    Migration {
        version: "005_create_views.sql",
        sql: include_str!("../../migrations/sqlite/005_create_views.sql"),
    },
];

const POSTGRES_MIGRATIONS: &[Migration<'static>] = &[
    Migration {
        version: "001_create_teams.sql",
        sql: include_str!("../../migrations/postgres/001_create_teams.sql"),
    },
    Migration {
        version: "002_create_team_memberships.sql",
        sql: include_str!("../../migrations/postgres/002_create_team_memberships.sql"),
    },
    Migration {
        version: "003_create_pr_metrics.sql",
        sql: include_str!("../../migrations/postgres/003_create_pr_metrics.sql"),
    },
    Migration {
        version: "004_create_collection_metadata.sql",
        sql: include_str!("../../migrations/postgres/004_create_collection_metadata.sql"),
    },
    Migration {
        version: "005_create_views.sql",
        sql: include_str!("../../migrations/postgres/005_create_views.sql"),
    },
];

pub fn embedded(driver: DbDriver) -> &'static [Migration<'static>] {
    match driver {
        DbDriver::Sqlite => SQLITE_MIGRATIONS,
        DbDriver::Postgres => POSTGRES_MIGRATIONS,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub already_applied: usize,
}

/// Applies the embedded migrations for the storage's dialect.
pub async fn run_migrations(storage: &dyn Storage) -> Result<MigrationReport> {
    apply(storage, embedded(storage.driver())).await
}

/// Applies `migrations` in ascending lexical order of version.
pub async fn apply(storage: &dyn Storage, migrations: &[Migration<'_>]) -> Result<MigrationReport> {
    let mut ordered: Vec<&Migration<'_>> = migrations.iter().collect();
    ordered.sort_by(|a, b| a.version.cmp(b.version));

    let mut seen = HashSet::new();
    for migration in &ordered {
        if !seen.insert(migration.version) {
            return Err(CollectorError::migration(
                migration.version,
                "duplicate migration version",
            ));
        }
    }

    storage.ensure_ledger().await?;

    let mut report = MigrationReport::default();
    for migration in ordered {
        if storage.is_applied(migration.version).await? {
            debug!("Skipping applied migration: {}", migration.version);
            report.already_applied += 1;
            continue;
        }

        storage
            .execute_script(migration.sql)
            .await
            .map_err(|e| CollectorError::migration(migration.version, e))?;
        storage.record_applied(migration.version).await?;

        info!("Applied migration: {}", migration.version);
        report.applied.push(migration.version.to_string());
    }

    Ok(report)
}
