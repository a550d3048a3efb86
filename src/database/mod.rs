pub mod migrations;
pub mod models;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::DbDriver;
use crate::error::{CollectorError, Result};
use models::{MigrationRecord, PrMetric, Team, TeamMembership};
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;

/// Storage access shared by both SQL dialects. Implementations differ only in
/// placeholder style and column types; every write is a single statement with
/// built-in conflict handling.
#[async_trait]
pub trait Storage: Send + Sync {
    fn driver(&self) -> DbDriver;

    // Migration ledger
    async fn ensure_ledger(&self) -> Result<()>;
    async fn is_applied(&self, version: &str) -> Result<bool>;
    async fn record_applied(&self, version: &str) -> Result<()>;
    async fn applied_migrations(&self) -> Result<Vec<MigrationRecord>>;
    /// Runs a (possibly multi-statement) migration body.
    async fn execute_script(&self, sql: &str) -> Result<()>;

    // Roster
    async fn upsert_team(&self, id: i64, name: &str, now: DateTime<Utc>) -> Result<()>;
    async fn active_joined_at(&self, team_id: i64, username: &str)
        -> Result<Option<DateTime<Utc>>>;
    /// Conflict key is (team_id, github_username, joined_at).
    async fn upsert_membership(&self, membership: &TeamMembership, now: DateTime<Utc>)
        -> Result<()>;
    async fn load_teams(&self) -> Result<Vec<Team>>;
    async fn load_active_memberships(&self) -> Result<Vec<TeamMembership>>;

    // Metrics
    async fn upsert_metric(&self, metric: &PrMetric) -> Result<()>;
    async fn get_metric(
        &self,
        team_id: i64,
        repository: &str,
        pr_number: i64,
    ) -> Result<Option<PrMetric>>;

    // Watermarks
    async fn get_watermark(&self, repository: &str) -> Result<Option<DateTime<Utc>>>;
    async fn set_watermark(&self, repository: &str, at: DateTime<Utc>) -> Result<()>;

    /// Row count of a table or view; used for schema verification.
    async fn count_rows(&self, relation: &str) -> Result<i64>;
}

pub type Database = Arc<dyn Storage>;

pub async fn connect(driver: DbDriver, url: &str) -> Result<Database> {
    let storage: Database = match driver {
        DbDriver::Sqlite => Arc::new(SqliteStorage::connect(url).await?),
        DbDriver::Postgres => Arc::new(PostgresStorage::connect(url).await?),
    };
    Ok(storage)
}

/// Relation names are interpolated into SQL, so only plain identifiers pass.
pub(crate) fn checked_relation(relation: &str) -> Result<&str> {
    let valid = !relation.is_empty()
        && relation
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(relation)
    } else {
        Err(CollectorError::DatabaseError(format!(
            "Invalid relation name: {}",
            relation
        )))
    }
}
