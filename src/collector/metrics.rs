//! Metric derivation
//!
//! Pure functions from a pull request, its reviews and its review comments to
//! the fields of a [`PrMetric`] row. No I/O happens here.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

use crate::database::models::PrMetric;
use crate::error::Result;
use crate::github::types::{CommentRecord, PullRequestRecord, ReviewRecord};
use crate::team::MembershipIndex;

pub const STATE_APPROVED: &str = "APPROVED";
pub const STATE_CHANGES_REQUESTED: &str = "CHANGES_REQUESTED";
pub const STATE_MERGED: &str = "merged";

/// Whole hours from `from` to `to`, rounded down.
fn floor_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().div_euclid(3600)
}

pub fn cycle_time_hours(created_at: DateTime<Utc>, merged_at: DateTime<Utc>) -> i64 {
    floor_hours(created_at, merged_at)
}

pub fn review_turnaround_hours(created_at: DateTime<Utc>, first_review_at: DateTime<Utc>) -> i64 {
    floor_hours(created_at, first_review_at)
}

/// Earliest submission time; pending reviews have none and are ignored.
pub fn first_review_at(reviews: &[ReviewRecord]) -> Option<DateTime<Utc>> {
    reviews.iter().filter_map(|r| r.submitted_at).min()
}

/// Unique reviewer logins in sorted order, so the stored list is stable
/// across runs.
pub fn unique_reviewers(reviews: &[ReviewRecord]) -> Vec<String> {
    reviews
        .iter()
        .map(ReviewRecord::reviewer_login)
        .filter(|login| !login.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Exact, case-sensitive match against the API's review state vocabulary.
pub fn count_reviews_by_state(reviews: &[ReviewRecord], state: &str) -> i64 {
    reviews.iter().filter(|r| r.state == state).count() as i64
}

/// Number of distinct threads: a top-level comment is its own thread, a reply
/// belongs to its parent's.
pub fn conversation_count(comments: &[CommentRecord]) -> i64 {
    comments
        .iter()
        .map(CommentRecord::thread_id)
        .collect::<HashSet<_>>()
        .len() as i64
}

pub fn count_external_reviewers(reviewers: &[String], team_id: i64, index: &MembershipIndex) -> i64 {
    reviewers
        .iter()
        .filter(|reviewer| index.is_external_reviewer(reviewer, team_id))
        .count() as i64
}

/// Builds the metric row for one PR as seen by one team.
pub fn derive_metric(
    pr: &PullRequestRecord,
    reviews: &[ReviewRecord],
    comments: &[CommentRecord],
    team_id: i64,
    repository: &str,
    index: &MembershipIndex,
) -> Result<PrMetric> {
    let state = if pr.merged_at.is_some() {
        STATE_MERGED.to_string()
    } else {
        pr.state.clone()
    };

    let first_review = first_review_at(reviews);
    let reviewers = unique_reviewers(reviews);

    Ok(PrMetric {
        team_id,
        pr_number: pr.number,
        repository: repository.to_string(),
        author: pr.author_login().to_string(),
        title: pr.title().to_string(),
        created_at: pr.created_at,
        merged_at: pr.merged_at,
        closed_at: pr.closed_at,
        cycle_time_hours: pr.merged_at.map(|merged| cycle_time_hours(pr.created_at, merged)),
        state,
        first_review_at: first_review,
        review_turnaround_hours: first_review
            .map(|first| review_turnaround_hours(pr.created_at, first)),
        review_comments_count: comments.len() as i64,
        conversation_count: conversation_count(comments),
        changes_requested_count: count_reviews_by_state(reviews, STATE_CHANGES_REQUESTED),
        approved_count: count_reviews_by_state(reviews, STATE_APPROVED),
        reviewers_count: reviewers.len() as i64,
        external_reviewers_count: count_external_reviewers(&reviewers, team_id, index),
        reviewers_list: serde_json::to_string(&reviewers)?,
    })
}
