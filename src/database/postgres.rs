//! PostgreSQL dialect of [`Storage`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use super::models::{MigrationRecord, PrMetric, Team, TeamMembership};
use super::{checked_relation, Storage};
use crate::config::DbDriver;
use crate::error::{CollectorError, Result};

#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        info!("Connected to PostgreSQL database");
        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    fn driver(&self) -> DbDriver {
        DbDriver::Postgres
    }

    async fn ensure_ledger(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_applied(&self, version: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations WHERE version = $1")
                .bind(version)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn record_applied(&self, version: &str) -> Result<()> {
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES ($1, $2)")
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
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(id) DO UPDATE SET
                name = EXCLUDED.name,
                updated_at = EXCLUDED.updated_at
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
            WHERE team_id = $1 AND github_username = $2 AND left_at IS NULL
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
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT(team_id, github_username, joined_at) DO UPDATE SET
                allocation_weight = EXCLUDED.allocation_weight
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
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10,
                $11, $12,
                $13, $14,
                $15, $16,
                $17, $18, $19
            )
            ON CONFLICT(team_id, repository, pr_number) DO UPDATE SET
                author = EXCLUDED.author,
                title = EXCLUDED.title,
                created_at = EXCLUDED.created_at,
                merged_at = EXCLUDED.merged_at,
                closed_at = EXCLUDED.closed_at,
                cycle_time_hours = EXCLUDED.cycle_time_hours,
                state = EXCLUDED.state,
                first_review_at = EXCLUDED.first_review_at,
                review_turnaround_hours = EXCLUDED.review_turnaround_hours,
                review_comments_count = EXCLUDED.review_comments_count,
                conversation_count = EXCLUDED.conversation_count,
                changes_requested_count = EXCLUDED.changes_requested_count,
                approved_count = EXCLUDED.approved_count,
                reviewers_count = EXCLUDED.reviewers_count,
                external_reviewers_count = EXCLUDED.external_reviewers_count,
                reviewers_list = EXCLUDED.reviewers_list
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
            WHERE team_id = $1 AND repository = $2 AND pr_number = $3
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
            sqlx::query_scalar("SELECT last_collected_at FROM collection_metadata WHERE repository = $1")
                .bind(repository)
                .fetch_optional(&self.pool)
                .await?;
        Ok(last_collected_at)
    }

    async fn set_watermark(&self, repository: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collection_metadata (repository, last_collected_at)
            VALUES ($1, $2)
            ON CONFLICT(repository) DO UPDATE SET
                last_collected_at = EXCLUDED.last_collected_at
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
