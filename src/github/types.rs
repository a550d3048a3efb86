use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub number: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl PullRequestRecord {
    pub fn author_login(&self) -> &str {
        self.user.as_ref().map(|u| u.login.as_str()).unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: i64,
    #[serde(default)]
    pub user: Option<User>,
    pub state: String,
    /// Absent for pending reviews.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl ReviewRecord {
    pub fn reviewer_login(&self) -> &str {
        self.user.as_ref().map(|u| u.login.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: i64,
    #[serde(default)]
    pub in_reply_to_id: Option<i64>,
    #[serde(default)]
    pub user: Option<User>,
}

impl CommentRecord {
    /// Root comment id of the thread this comment belongs to.
    pub fn thread_id(&self) -> i64 {
        match self.in_reply_to_id {
            Some(parent) if parent != 0 => parent,
            _ => self.id,
        }
    }
}

/// One page of a list endpoint plus the page number to request next, if any.
#[derive(Debug, Clone)]
pub struct RemotePage<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

/// Shape of GET /rate_limit; only the core bucket is consulted.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RateLimitResponse {
    pub resources: RateLimitResources,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RateLimitResources {
    pub core: RateLimitBucket,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RateLimitBucket {
    pub remaining: u64,
    pub reset: i64,
}

impl From<RateLimitBucket> for RateLimit {
    fn from(bucket: RateLimitBucket) -> Self {
        let reset_at = Utc
            .timestamp_opt(bucket.reset, 0)
            .single()
            .unwrap_or_else(Utc::now);
        RateLimit {
            remaining: bucket.remaining,
            reset_at,
        }
    }
}
