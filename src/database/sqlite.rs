//! SQLite dialect of [`Storage`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use super::models::{MigrationRecord, PrMetric, Team, TeamMembership};
use super::{checked_relation, Storage};
use crate::config::DbDriver;
use crate::error::{CollectorError, Result};

#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Accepts `sqlite:` URLs or a bare file path; `:memory:` opens an
    /// in-memory database.
    pub async fn connect(url: &str) -> Result<Self> {
        if url == ":memory:" || url == "sqlite::memory:" {
            return Self::in_memory().await;
        }

        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)?
        } else {
            if let Some(parent) = Path::new(url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        CollectorError::DatabaseError(format!(
                            "Failed to create {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
            SqliteConnectOptions::new().filename(url)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options.create_if_missing(true))
            .await?;

        info!("Connected to SQLite database at {}", url);
        Ok(Self { pool })
    }

    /// Single pooled connection that never expires, so the database lives as
    /// long as the pool.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    fn driver(&self) -> DbDriver {
        DbDriver::Sqlite
    }

    async fn ensure_ledger(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version TEXT PRIMARY KEY,
                applied_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_applied(&self, version: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations WHERE version = ?")
                .bind(version)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn record_applied(&self, version: &str) -> Result<()> {
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| CollectorError::migration(version, e))?;
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<Vec<MigrationRecord>> {
        let records = sqlx::query_as::<_, MigrationRecord>(
            "SELECT version, applied_at FROM schema_migrations ORDER BY version",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn execute_script(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_team(&self, id: i64, name: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO teams (id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn active_joined_at(
        &self,
        team_id: i64,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let joined_at = sqlx::query_scalar(
            r#"
            SELECT joined_at FROM team_memberships
            WHERE team_id = ? AND github_username = ? AND left_at IS NULL
            ORDER BY joined_at DESC
            LIMIT 1
            "#,
        )
        .bind(team_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(joined_at)
    }

    async fn upsert_membership(
        &self,
        membership: &TeamMembership,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO team_memberships
                (team_id, github_username, allocation_weight, joined_at, left_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(team_id, github_username, joined_at) DO UPDATE SET
                allocation_weight = excluded.allocation_weight
            "#,
        )
        .bind(membership.team_id)
        .bind(&membership.github_username)
        .bind(membership.allocation_weight)
        .bind(membership.joined_at)
        .bind(membership.left_at)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_teams(&self) -> Result<Vec<Team>> {
        let teams = sqlx::query_as::<_, Team>(
            "SELECT id, name, created_at, updated_at FROM teams ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(teams)
    }

    async fn load_active_memberships(&self) -> Result<Vec<TeamMembership>> {
        let memberships = sqlx::query_as::<_, TeamMembership>(
            r#"
            SELECT team_id, github_username, allocation_weight, joined_at, left_at
            FROM team_memberships
            WHERE left_at IS NULL
            ORDER BY team_id, github_username
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(memberships)
    }

    async fn upsert_metric(&self, metric: &PrMetric) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pr_metrics (
                team_id, pr_number, repository, author, title,
                created_at, merged_at, closed_at, cycle_time_hours, state,
                first_review_at, review_turnaround_hours,
                review_comments_count, conversation_count,
                changes_requested_count, approved_count,
                reviewers_count, external_reviewers_count, reviewers_list
            ) VALUES (
                ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?,
                ?, ?,
                ?, ?,
                ?, ?,
                ?, ?, ?
            )
            ON CONFLICT(team_id, repository, pr_number) DO UPDATE SET
                author = excluded.author,
                title = excluded.title,
                created_at = excluded.created_at,
                merged_at = excluded.merged_at,
                closed_at = excluded.closed_at,
                cycle_time_hours = excluded.cycle_time_hours,
                state = excluded.state,
                first_review_at = excluded.first_review_at,
                review_turnaround_hours = excluded.review_turnaround_hours,
                review_comments_count = excluded.review_comments_count,
                conversation_count = excluded.conversation_count,
                changes_requested_count = excluded.changes_requested_count,
                approved_count = excluded.approved_count,
                reviewers_count = excluded.reviewers_count,
                external_reviewers_count = excluded.external_reviewers_count,
                reviewers_list = excluded.reviewers_list
            "#,
        )
        .bind(metric.team_id)
        .bind(metric.pr_number)
        .bind(&metric.repository)
        .bind(&metric.author)
        .bind(&metric.title)
        .bind(metric.created_at)
        .bind(metric.merged_at)
        .bind(metric.closed_at)
        .bind(metric.cycle_time_hours)
        .bind(&metric.state)
        .bind(metric.first_review_at)
        .bind(metric.review_turnaround_hours)
        .bind(metric.review_comments_count)
        .bind(metric.conversation_count)
        .bind(metric.changes_requested_count)
        .bind(metric.approved_count)
        .bind(metric.reviewers_count)
        .bind(metric.external_reviewers_count)
        .bind(&metric.reviewers_list)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_metric(
        &self,
        team_id: i64,
        repository: &str,
        pr_number: i64,
    ) -> Result<Option<PrMetric>> {
        let metric = sqlx::query_as::<_, PrMetric>(
            r#"
            SELECT team_id, pr_number, repository, author, title,
                   created_at, merged_at, closed_at, cycle_time_hours, state,
                   first_review_at, review_turnaround_hours,
                   review_comments_count, conversation_count,
                   changes_requested_count, approved_count,
                   reviewers_count, external_reviewers_count, reviewers_list
            FROM pr_metrics
            WHERE team_id = ? AND repository = ? AND pr_number = ?
            "#,
        )
        .bind(team_id)
        .bind(repository)
        .bind(pr_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(metric)
    }

    async fn get_watermark(&self, repository: &str) -> Result<Option<DateTime<Utc>>> {
        let last_collected_at =
            sqlx::query_scalar("SELECT last_collected_at FROM collection_metadata WHERE repository = ?")
                .bind(repository)
                .fetch_optional(&self.pool)
                .await?;
        Ok(last_collected_at)
    }

    async fn set_watermark(&self, repository: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collection_metadata (repository, last_collected_at)
            VALUES (?, ?)
            ON CONFLICT(repository) DO UPDATE SET
                last_collected_at = excluded.last_collected_at
            "#,
        )
        .bind(repository)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_rows(&self, relation: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", checked_relation(relation)?);
        let count: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(count)
    }
}
