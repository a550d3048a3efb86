//! Collection orchestration
//!
//! Repositories are processed one after another, and PRs within a repository
//! likewise. A repository's watermark only moves after its whole pass has
//! finished, and it moves to the run's start time, so the next window always
//! overlaps anything that changed while this run was in flight.

pub mod metrics;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::database::Database;
use crate::error::{CollectorError, Result};
use crate::github::types::{PullRequestRecord, ReviewRecord};
use crate::github::ActivitySource;
use crate::team::MembershipIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectionPhase {
    NotStarted,
    Fetching,
    Deriving,
    Persisting,
    WatermarkAdvanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectionKind {
    /// No watermark yet; the window starts at now minus the lookback.
    Initial,
    /// The window starts at the stored watermark.
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RepositoryOutcome {
    Completed,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryReport {
    pub repository: String,
    pub kind: Option<CollectionKind>,
    pub window_start: Option<DateTime<Utc>>,
    pub phase: CollectionPhase,
    pub prs_fetched: usize,
    pub prs_included: usize,
    pub prs_skipped: usize,
    pub rows_upserted: usize,
    pub rows_failed: usize,
    pub watermark_advanced: bool,
    pub outcome: RepositoryOutcome,
}

impl RepositoryReport {
    fn new(repository: &str) -> Self {
        Self {
            repository: repository.to_string(),
            kind: None,
            window_start: None,
            phase: CollectionPhase::NotStarted,
            prs_fetched: 0,
            prs_included: 0,
            prs_skipped: 0,
            rows_upserted: 0,
            rows_failed: 0,
            watermark_advanced: false,
            outcome: RepositoryOutcome::Completed,
        }
    }

    fn enter(&mut self, phase: CollectionPhase) {
        debug!("{}: {:?} -> {:?}", self.repository, self.phase, phase);
        self.phase = phase;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub repositories: Vec<RepositoryReport>,
}

impl RunSummary {
    pub fn total_rows_upserted(&self) -> usize {
        self.repositories.iter().map(|r| r.rows_upserted).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RepositoryReport> {
        self.repositories
            .iter()
            .filter(|r| matches!(r.outcome, RepositoryOutcome::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}

/// Splits `owner/repo`.
pub fn parse_repository(full_name: &str) -> Result<(&str, &str)> {
    match full_name.split('/').collect::<Vec<_>>().as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok((*owner, *repo)),
        _ => Err(CollectorError::InvalidRepository(format!(
            "{} (expected owner/repo)",
            full_name
        ))),
    }
}

/// A PR is in scope when its author or any reviewer belongs to some team.
pub fn should_include_pr(
    pr: &PullRequestRecord,
    reviews: &[ReviewRecord],
    index: &MembershipIndex,
) -> bool {
    index.is_member(pr.author_login())
        || reviews
            .iter()
            .any(|review| index.is_member(review.reviewer_login()))
}

/// Union of the author's and every reviewer's teams.
pub fn relevant_teams(
    pr: &PullRequestRecord,
    reviews: &[ReviewRecord],
    index: &MembershipIndex,
) -> BTreeSet<i64> {
    let mut teams = index.teams_for_user(pr.author_login());
    for review in reviews {
        teams.extend(index.teams_for_user(review.reviewer_login()));
    }
    teams
}

pub struct Collector {
    source: Arc<dyn ActivitySource>,
    storage: Database,
    index: MembershipIndex,
    repositories: Vec<String>,
    lookback_days: i64,
}

impl Collector {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        storage: Database,
        index: MembershipIndex,
        repositories: Vec<String>,
        lookback_days: i64,
    ) -> Self {
        Self {
            source,
            storage,
            index,
            repositories,
            lookback_days,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        source: Arc<dyn ActivitySource>,
        storage: Database,
        index: MembershipIndex,
    ) -> Self {
        Self::new(
            source,
            storage,
            index,
            config.repositories.clone(),
            config.lookback_days,
        )
    }

    /// Runs one pass over every configured repository. Repository-level
    /// failures are reported in the summary; storage failures outside a
    /// single PR abort the run.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        info!(
            "Collecting {} repositories for {} teams",
            self.repositories.len(),
            self.index.all_team_ids().len()
        );

        let mut reports = Vec::with_capacity(self.repositories.len());
        for full_name in &self.repositories {
            let mut report = RepositoryReport::new(full_name);

            let (owner, repo) = match parse_repository(full_name) {
                Ok(parts) => parts,
                Err(e) => {
                    warn!("Skipping repository: {}", e);
                    report.outcome = RepositoryOutcome::Skipped(e.to_string());
                    reports.push(report);
                    continue;
                }
            };

            match self
                .collect_repository(owner, repo, full_name, started_at, &mut report)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_repository_scoped() => {
                    error!("Failed to collect {}: {}", full_name, e);
                    report.outcome = RepositoryOutcome::Failed(e.to_string());
                }
                Err(e) => return Err(e),
            }
            reports.push(report);
        }

        let summary = RunSummary {
            started_at,
            repositories: reports,
        };
        info!(
            "Collection complete: {} metric rows upserted",
            summary.total_rows_upserted()
        );
        Ok(summary)
    }

    async fn collect_repository(
        &self,
        owner: &str,
        repo: &str,
        full_name: &str,
        started_at: DateTime<Utc>,
        report: &mut RepositoryReport,
    ) -> Result<()> {
        info!("Processing repository: {}", full_name);
        report.enter(CollectionPhase::Fetching);

        let previous = self.storage.get_watermark(full_name).await?;
        let (since, kind) = match previous {
            Some(watermark) => (watermark, CollectionKind::Incremental),
            None => (
                started_at - Duration::days(self.lookback_days),
                CollectionKind::Initial,
            ),
        };
        report.kind = Some(kind);
        report.window_start = Some(since);
        info!(
            "{:?} collection of {} since {}",
            kind,
            full_name,
            since.format("%Y-%m-%d %H:%M")
        );

        let prs = self.source.fetch_prs(owner, repo, since).await?;
        report.prs_fetched = prs.len();

        for (i, pr) in prs.iter().enumerate() {
            if (i + 1) % 10 == 0 {
                debug!("Processing PR {}/{}", i + 1, prs.len());
            }

            let reviews = match self.source.fetch_reviews(owner, repo, pr.number).await {
                Ok(reviews) => reviews,
                Err(e) => {
                    warn!("Failed to fetch reviews for PR #{}: {}", pr.number, e);
                    report.prs_skipped += 1;
                    continue;
                }
            };
            let comments = match self.source.fetch_comments(owner, repo, pr.number).await {
                Ok(comments) => comments,
                Err(e) => {
                    warn!("Failed to fetch comments for PR #{}: {}", pr.number, e);
                    report.prs_skipped += 1;
                    continue;
                }
            };

            if !should_include_pr(pr, &reviews, &self.index) {
                continue;
            }
            report.prs_included += 1;
            report.enter(CollectionPhase::Deriving);

            for team_id in relevant_teams(pr, &reviews, &self.index) {
                let metric = match metrics::derive_metric(
                    pr,
                    &reviews,
                    &comments,
                    team_id,
                    full_name,
                    &self.index,
                ) {
                    Ok(metric) => metric,
                    Err(e) => {
                        warn!("Failed to derive PR #{} for team {}: {}", pr.number, team_id, e);
                        report.rows_failed += 1;
                        continue;
                    }
                };

                report.enter(CollectionPhase::Persisting);
                match self.storage.upsert_metric(&metric).await {
                    Ok(()) => report.rows_upserted += 1,
                    Err(e) => {
                        warn!("Failed to store PR #{} for team {}: {}", pr.number, team_id, e);
                        report.rows_failed += 1;
                    }
                }
            }
        }

        info!(
            "{}: {} of {} PRs involved team members, {} rows stored",
            full_name, report.prs_included, report.prs_fetched, report.rows_upserted
        );

        // Never move backwards, even if the clock did.
        let watermark = previous.map_or(started_at, |prev| prev.max(started_at));
        match self.storage.set_watermark(full_name, watermark).await {
            Ok(()) => {
                report.enter(CollectionPhase::WatermarkAdvanced);
                report.watermark_advanced = true;
            }
            Err(e) => warn!("Failed to advance watermark for {}: {}", full_name, e),
        }

        Ok(())
    }
}
