use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `left_at = None` means the membership is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamMembership {
    pub team_id: i64,
    pub github_username: String,
    pub allocation_weight: f64,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

/// One row of `pr_metrics`, keyed by (team_id, repository, pr_number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PrMetric {
    pub team_id: i64,
    pub pr_number: i64,
    pub repository: String,
    pub author: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub cycle_time_hours: Option<i64>,
    pub state: String,

    // Review metrics
    pub first_review_at: Option<DateTime<Utc>>,
    pub review_turnaround_hours: Option<i64>,
    pub review_comments_count: i64,
    pub conversation_count: i64,
    pub changes_requested_count: i64,
    pub approved_count: i64,
    pub reviewers_count: i64,
    pub external_reviewers_count: i64,
    pub reviewers_list: String, // JSON array
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: String,
    pub applied_at: DateTime<Utc>,
}
