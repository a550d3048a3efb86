#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use dora_collector::config::{DbDriver, TeamConfig, TeamMemberConfig};
use dora_collector::database::models::{MigrationRecord, PrMetric, Team, TeamMembership};
use dora_collector::database::{migrations, Database, SqliteStorage, Storage};
use dora_collector::error::{CollectorError, Result};
use dora_collector::github::types::User;
use dora_collector::github::{ActivitySource, CommentRecord, PullRequestRecord, ReviewRecord};

/// Setup a migrated in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    let storage = SqliteStorage::in_memory()
        .await
        .expect("Failed to create test database");
    migrations::run_migrations(&storage)
        .await
        .expect("Failed to run migrations");
    Arc::new(storage)
}

pub fn team(team_id: i64, name: &str, members: &[&str]) -> TeamConfig {
    TeamConfig {
        team_id: Some(team_id),
        name: name.to_string(),
        members: members
            .iter()
            .map(|username| TeamMemberConfig {
                username: username.to_string(),
                allocation: 1.0,
                joined_at: None,
            })
            .collect(),
    }
}

fn user(login: &str) -> Option<User> {
    Some(User {
        login: login.to_string(),
    })
}

/// Create a test pull request updated `updated_hours_ago` hours ago
pub fn pull_request(number: i64, author: &str, updated_hours_ago: i64) -> PullRequestRecord {
    let updated_at = Utc::now() - Duration::hours(updated_hours_ago);
    PullRequestRecord {
        number,
        title: Some(format!("Change #{}", number)),
        user: user(author),
        state: "open".to_string(),
        created_at: updated_at - Duration::hours(30),
        updated_at,
        merged_at: None,
        closed_at: None,
    }
}

pub fn review(id: i64, reviewer: &str, state: &str, submitted_at: DateTime<Utc>) -> ReviewRecord {
    ReviewRecord {
        id,
        user: user(reviewer),
        state: state.to_string(),
        submitted_at: Some(submitted_at),
    }
}

pub fn comment(id: i64, in_reply_to_id: Option<i64>) -> CommentRecord {
    CommentRecord {
        id,
        in_reply_to_id,
        user: user("someone"),
    }
}

/// In-process activity source. PRs are filtered by `since` the same way the
/// live fetcher stops at the window start.
#[derive(Default)]
pub struct FakeSource {
    pub pulls: HashMap<String, Vec<PullRequestRecord>>,
    pub reviews: HashMap<(String, i64), Vec<ReviewRecord>>,
    pub comments: HashMap<(String, i64), Vec<CommentRecord>>,
    pub failing_repos: HashSet<String>,
    pub failing_reviews: HashSet<(String, i64)>,
    pub failing_comments: HashSet<(String, i64)>,
    pub since_calls: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pr(mut self, repository: &str, pr: PullRequestRecord, reviews: Vec<ReviewRecord>) -> Self {
        self.reviews.insert((repository.to_string(), pr.number), reviews);
        self.pulls.entry(repository.to_string()).or_default().push(pr);
        self
    }

    pub fn with_comments(mut self, repository: &str, pr_number: i64, comments: Vec<CommentRecord>) -> Self {
        self.comments.insert((repository.to_string(), pr_number), comments);
        self
    }

    pub fn failing_repo(mut self, repository: &str) -> Self {
        self.failing_repos.insert(repository.to_string());
        self
    }

    pub fn failing_reviews(mut self, repository: &str, pr_number: i64) -> Self {
        self.failing_reviews.insert((repository.to_string(), pr_number));
        self
    }

    pub fn failing_comments(mut self, repository: &str, pr_number: i64) -> Self {
        self.failing_comments.insert((repository.to_string(), pr_number));
        self
    }

    pub fn since_for(&self, repository: &str) -> Vec<DateTime<Utc>> {
        self.since_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(repo, _)| repo == repository)
            .map(|(_, since)| *since)
            .collect()
    }
}

#[async_trait]
impl ActivitySource for FakeSource {
    async fn fetch_prs(
        &self,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PullRequestRecord>> {
        let key = format!("{}/{}", owner, repo);
        self.since_calls.lock().unwrap().push((key.clone(), since));
        if self.failing_repos.contains(&key) {
            return Err(CollectorError::GitHubError(format!("{}: 502 Bad Gateway", key)));
        }
        Ok(self
            .pulls
            .get(&key)
            .map(|prs| prs.iter().filter(|pr| pr.updated_at >= since).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_reviews(&self, owner: &str, repo: &str, pr_number: i64) -> Result<Vec<ReviewRecord>> {
        let key = (format!("{}/{}", owner, repo), pr_number);
        if self.failing_reviews.contains(&key) {
            return Err(CollectorError::GitHubError("reviews unavailable".to_string()));
        }
        Ok(self.reviews.get(&key).cloned().unwrap_or_default())
    }

    async fn fetch_comments(&self, owner: &str, repo: &str, pr_number: i64) -> Result<Vec<CommentRecord>> {
        let key = (format!("{}/{}", owner, repo), pr_number);
        if self.failing_comments.contains(&key) {
            return Err(CollectorError::GitHubError("comments unavailable".to_string()));
        }
        Ok(self.comments.get(&key).cloned().unwrap_or_default())
    }
}

/// Storage that delegates to a real database but fails selected writes.
pub struct FlakyStorage {
    inner: Database,
    failing_metrics: HashSet<(i64, String, i64)>,
    failing_watermarks: HashSet<String>,
}

impl FlakyStorage {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            failing_metrics: HashSet::new(),
            failing_watermarks: HashSet::new(),
        }
    }

    pub fn failing_metric(mut self, team_id: i64, repository: &str, pr_number: i64) -> Self {
        self.failing_metrics
            .insert((team_id, repository.to_string(), pr_number));
        self
    }

    pub fn failing_watermark(mut self, repository: &str) -> Self {
        self.failing_watermarks.insert(repository.to_string());
        self
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    fn driver(&self) -> DbDriver {
        self.inner.driver()
    }

    async fn ensure_ledger(&self) -> Result<()> {
        self.inner.ensure_ledger().await
    }

    async fn is_applied(&self, version: &str) -> Result<bool> {
        self.inner.is_applied(version).await
    }

    async fn record_applied(&self, version: &str) -> Result<()> {
        self.inner.record_applied(version).await
    }

    async fn applied_migrations(&self) -> Result<Vec<MigrationRecord>> {
        self.inner.applied_migrations().await
    }

    async fn execute_script(&self, sql: &str) -> Result<()> {
        self.inner.execute_script(sql).await
    }

    async fn upsert_team(&self, id: i64, name: &str, now: DateTime<Utc>) -> Result<()> {
        self.inner.upsert_team(id, name, now).await
    }

    async fn active_joined_at(&self, team_id: i64, username: &str) -> Result<Option<DateTime<Utc>>> {
        self.inner.active_joined_at(team_id, username).await
    }

    async fn upsert_membership(&self, membership: &TeamMembership, now: DateTime<Utc>) -> Result<()> {
        self.inner.upsert_membership(membership, now).await
    }

    async fn load_teams(&self) -> Result<Vec<Team>> {
        self.inner.load_teams().await
    }

    async fn load_active_memberships(&self) -> Result<Vec<TeamMembership>> {
        self.inner.load_active_memberships().await
    }

    async fn upsert_metric(&self, metric: &PrMetric) -> Result<()> {
        let key = (metric.team_id, metric.repository.clone(), metric.pr_number);
        if self.failing_metrics.contains(&key) {
            return Err(CollectorError::DatabaseError("disk I/O error".to_string()));
        }
        self.inner.upsert_metric(metric).await
    }

    async fn get_metric(&self, team_id: i64, repository: &str, pr_number: i64) -> Result<Option<PrMetric>> {
        self.inner.get_metric(team_id, repository, pr_number).await
    }

    async fn get_watermark(&self, repository: &str) -> Result<Option<DateTime<Utc>>> {
        self.inner.get_watermark(repository).await
    }

    async fn set_watermark(&self, repository: &str, at: DateTime<Utc>) -> Result<()> {
        if self.failing_watermarks.contains(repository) {
            return Err(CollectorError::DatabaseError("database is locked".to_string()));
        }
        self.inner.set_watermark(repository, at).await
    }

    async fn count_rows(&self, relation: &str) -> Result<i64> {
        self.inner.count_rows(relation).await
    }
}
