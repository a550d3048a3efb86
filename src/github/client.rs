use async_trait::async_trait;
use octocrab::{Octocrab, Page};
use serde::Serialize;
use tracing::debug;

use super::types::{
    CommentRecord, PullRequestRecord, RateLimit, RateLimitResponse, RemotePage, ReviewRecord,
};
use crate::error::{CollectorError, Result};

pub const PAGE_SIZE: u8 = 100;

/// Single-page access to the hosting API. Pagination policy lives in the
/// fetcher so it can be exercised without a network.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Pull requests in all states, most recently updated first.
    async fn list_pulls(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
    ) -> Result<RemotePage<PullRequestRecord>>;

    async fn list_reviews(
        &self,
        owner: &str,
        repo: &str,
        pr_number: i64,
        page: u32,
    ) -> Result<RemotePage<ReviewRecord>>;

    async fn list_review_comments(
        &self,
        owner: &str,
        repo: &str,
        pr_number: i64,
        page: u32,
    ) -> Result<RemotePage<CommentRecord>>;

    async fn rate_limit(&self) -> Result<RateLimit>;
}

#[derive(Debug, Serialize)]
struct ListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    direction: Option<&'static str>,
    per_page: u8,
    page: u32,
}

impl ListParams {
    fn plain(page: u32) -> Self {
        Self {
            state: None,
            sort: None,
            direction: None,
            per_page: PAGE_SIZE,
            page,
        }
    }
}

/// `page` value of a `rel="next"` link's query string.
fn page_param(query: &str) -> Option<u32> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("page="))
        .and_then(|value| value.parse().ok())
}

pub struct GitHubClient {
    client: Octocrab,
}

impl GitHubClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::build(token, None)
    }

    /// Points the client at a different API root (GitHub Enterprise, test servers).
    pub fn with_base_uri(token: &str, base_uri: &str) -> Result<Self> {
        Self::build(token, Some(base_uri))
    }

    fn build(token: &str, base_uri: Option<&str>) -> Result<Self> {
        let mut builder = Octocrab::builder().personal_token(token.to_string());
        if let Some(uri) = base_uri {
            builder = builder.base_uri(uri).map_err(|e| {
                CollectorError::ConfigError(format!("Invalid GitHub API URL {}: {}", uri, e))
            })?;
        }

        let client = builder.build().map_err(|e| {
            CollectorError::GitHubError(format!("Failed to create GitHub client: {}", e))
        })?;

        Ok(Self { client })
    }

    async fn get_page<T>(&self, route: String, params: &ListParams) -> Result<RemotePage<T>>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        debug!("GET {} page {}", route, params.page);
        let page: Page<T> = self
            .client
            .get(&route, Some(params))
            .await
            .map_err(|e| CollectorError::GitHubError(format!("{}: {}", route, e)))?;

        let next_page = page
            .next
            .as_ref()
            .and_then(|uri| uri.query())
            .and_then(page_param);

        Ok(RemotePage {
            items: page.items,
            next_page,
        })
    }
}

#[async_trait]
impl RemoteApi for GitHubClient {
    async fn list_pulls(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
    ) -> Result<RemotePage<PullRequestRecord>> {
        let params = ListParams {
            state: Some("all"),
            sort: Some("updated"),
            direction: Some("desc"),
            per_page: PAGE_SIZE,
            page,
        };
        self.get_page(format!("/repos/{}/{}/pulls", owner, repo), &params)
            .await
    }

    async fn list_reviews(
        &self,
        owner: &str,
        repo: &str,
        pr_number: i64,
        page: u32,
    ) -> Result<RemotePage<ReviewRecord>> {
        self.get_page(
            format!("/repos/{}/{}/pulls/{}/reviews", owner, repo, pr_number),
            &ListParams::plain(page),
        )
        .await
    }

    async fn list_review_comments(
        &self,
        owner: &str,
        repo: &str,
        pr_number: i64,
        page: u32,
    ) -> Result<RemotePage<CommentRecord>> {
        self.get_page(
            format!("/repos/{}/{}/pulls/{}/comments", owner, repo, pr_number),
            &ListParams::plain(page),
        )
        .await
    }

    async fn rate_limit(&self) -> Result<RateLimit> {
        let response: RateLimitResponse = self
            .client
            .get("/rate_limit", None::<&()>)
            .await
            .map_err(|e| CollectorError::RateLimitError(e.to_string()))?;

        Ok(response.resources.core.into())
    }
}
