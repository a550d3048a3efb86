//! Activity fetching
//!
//! Walks the paginated list endpoints of a [`RemoteApi`]. Pull request listing
//! relies on the API returning PRs most-recently-updated first: the walk stops
//! at the first PR older than the window start, and a page that breaks the
//! ordering fails the fetch instead of being silently truncated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::{debug, info, warn};

use super::client::RemoteApi;
use super::types::{CommentRecord, PullRequestRecord, RemotePage, ReviewRecord};
use crate::config::DEFAULT_RATE_LIMIT_THRESHOLD;
use crate::error::{CollectorError, Result};

/// What the orchestrator needs from the hosting API.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn fetch_prs(
        &self,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PullRequestRecord>>;

    async fn fetch_reviews(&self, owner: &str, repo: &str, pr_number: i64)
        -> Result<Vec<ReviewRecord>>;

    async fn fetch_comments(
        &self,
        owner: &str,
        repo: &str,
        pr_number: i64,
    ) -> Result<Vec<CommentRecord>>;
}

pub struct ActivityFetcher<A> {
    api: A,
    rate_limit_threshold: u64,
}

impl<A: RemoteApi> ActivityFetcher<A> {
    pub fn new(api: A) -> Self {
        Self::with_threshold(api, DEFAULT_RATE_LIMIT_THRESHOLD)
    }

    pub fn with_threshold(api: A, rate_limit_threshold: u64) -> Self {
        Self {
            api,
            rate_limit_threshold,
        }
    }

    /// Blocks until the quota resets when remaining calls are below the
    /// threshold. Runs once per page; there is no retry.
    async fn wait_for_quota(&self) -> Result<()> {
        let rate = self
            .api
            .rate_limit()
            .await
            .map_err(|e| CollectorError::RateLimitError(e.to_string()))?;

        if rate.remaining < self.rate_limit_threshold {
            let wait = (rate.reset_at - Utc::now()).to_std().unwrap_or_default();
            warn!(
                "Rate limit low ({} remaining), waiting {}s for reset",
                rate.remaining,
                wait.as_secs()
            );
            tokio::time::sleep(wait).await;
        }

        Ok(())
    }
}

async fn collect_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<RemotePage<T>>>,
{
    let mut all = Vec::new();
    let mut page = 1;
    loop {
        let result = fetch_page(page).await?;
        all.extend(result.items);
        match result.next_page {
            Some(next) => page = next,
            None => break,
        }
    }
    Ok(all)
}

#[async_trait]
impl<A: RemoteApi> ActivitySource for ActivityFetcher<A> {
    async fn fetch_prs(
        &self,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PullRequestRecord>> {
        info!("Fetching PRs from {}/{} (since {})", owner, repo, since.format("%Y-%m-%d"));

        let mut all_prs: Vec<PullRequestRecord> = Vec::new();
        let mut previous_update: Option<DateTime<Utc>> = None;
        let mut page = 1;

        loop {
            let result = self.api.list_pulls(owner, repo, page).await?;

            for pr in result.items {
                if let Some(previous) = previous_update {
                    if pr.updated_at > previous {
                        return Err(CollectorError::OutOfOrderError(format!(
                            "{}/{} PR #{} updated {} after PR updated {}",
                            owner, repo, pr.number, pr.updated_at, previous
                        )));
                    }
                }
                previous_update = Some(pr.updated_at);

                if pr.updated_at < since {
                    info!(
                        "Stopped at PR #{} (updated {}, before window start); fetched {} PRs",
                        pr.number,
                        pr.updated_at.format("%Y-%m-%d"),
                        all_prs.len()
                    );
                    return Ok(all_prs);
                }
                all_prs.push(pr);
            }

            match result.next_page {
                Some(next) => {
                    page = next;
                    self.wait_for_quota().await?;
                }
                None => break,
            }
        }

        info!("Fetched {} PRs", all_prs.len());
        Ok(all_prs)
    }

    async fn fetch_reviews(
        &self,
        owner: &str,
        repo: &str,
        pr_number: i64,
    ) -> Result<Vec<ReviewRecord>> {
        let reviews = collect_pages(move |page| self.api.list_reviews(owner, repo, pr_number, page)).await?;
        debug!("PR #{}: {} reviews", pr_number, reviews.len());
        Ok(reviews)
    }

    async fn fetch_comments(
        &self,
        owner: &str,
        repo: &str,
        pr_number: i64,
    ) -> Result<Vec<CommentRecord>> {
        let comments =
            collect_pages(move |page| self.api.list_review_comments(owner, repo, pr_number, page))
                .await?;
        debug!("PR #{}: {} review comments", pr_number, comments.len());
        Ok(comments)
    }
}
