use chrono::{DateTime, TimeZone, Utc};

use dora_collector::database::migrations::{self, Migration};
use dora_collector::database::models::PrMetric;
use dora_collector::database::{SqliteStorage, Storage};
use dora_collector::error::CollectorError;

mod common;
use common::*;

fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
}

fn metric(team_id: i64, pr_number: i64) -> PrMetric {
    PrMetric {
        team_id,
        pr_number,
        repository: "acme/api".to_string(),
        author: "alice".to_string(),
        title: "Add retries".to_string(),
        created_at: ts(1, 9),
        merged_at: Some(ts(2, 15)),
        closed_at: Some(ts(2, 15)),
        cycle_time_hours: Some(30),
        state: "merged".to_string(),
        first_review_at: Some(ts(1, 13)),
        review_turnaround_hours: Some(4),
        review_comments_count: 3,
        conversation_count: 2,
        changes_requested_count: 1,
        approved_count: 1,
        reviewers_count: 2,
        external_reviewers_count: 1,
        reviewers_list: r#"["bob","carol"]"#.to_string(),
    }
}

#[tokio::test]
async fn test_migrations_create_schema() {
    let db = setup_test_db().await;

    for relation in [
        "teams",
        "team_memberships",
        "pr_metrics",
        "collection_metadata",
        "view_team_velocity",
        "view_dora_lead_time",
        "view_review_turnaround",
        "view_review_engagement",
        "view_knowledge_sharing",
    ] {
        assert_eq!(db.count_rows(relation).await.unwrap(), 0, "{}", relation);
    }
}

#[tokio::test]
async fn test_migrations_run_exactly_once() {
    let db = setup_test_db().await;

    let second = migrations::run_migrations(db.as_ref()).await.unwrap();
    assert!(second.applied.is_empty());
    assert_eq!(second.already_applied, 5);

    let applied = db.applied_migrations().await.unwrap();
    let versions: Vec<&str> = applied.iter().map(|m| m.version.as_str()).collect();
    assert_eq!(
        versions,
        vec![
            "001_create_teams.sql",
            "002_create_team_memberships.sql",
            "003_create_pr_metrics.sql",
            "004_create_collection_metadata.sql",
            "005_create_views.sql",
        ]
    );
    assert_eq!(db.count_rows("schema_migrations").await.unwrap(), 5);
}

#[tokio::test]
async fn test_non_idempotent_body_runs_once() {
    let storage = SqliteStorage::in_memory().await.unwrap();
    let seed = [Migration {
        version: "001_seed.sql",
        sql: "CREATE TABLE IF NOT EXISTS seed_log (n INTEGER); INSERT INTO seed_log (n) VALUES (1);",
    }];

    let first = migrations::apply(&storage, &seed).await.unwrap();
    let second = migrations::apply(&storage, &seed).await.unwrap();

    assert_eq!(first.applied, vec!["001_seed.sql".to_string()]);
    assert_eq!(second.already_applied, 1);
    assert_eq!(storage.count_rows("seed_log").await.unwrap(), 1);
}

#[tokio::test]
async fn test_migrations_apply_in_version_order() {
    let storage = SqliteStorage::in_memory().await.unwrap();
    let unordered = [
        Migration {
            version: "002_fill.sql",
            sql: "INSERT INTO items (n) VALUES (1);",
        },
        Migration {
            version: "001_items.sql",
            sql: "CREATE TABLE items (n INTEGER);",
        },
    ];

    let report = migrations::apply(&storage, &unordered).await.unwrap();

    assert_eq!(report.applied, vec!["001_items.sql", "002_fill.sql"]);
    assert_eq!(storage.count_rows("items").await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_migration_is_not_recorded() {
    let storage = SqliteStorage::in_memory().await.unwrap();
    let broken = [Migration {
        version: "001_broken.sql",
        sql: "CREATE TABL nothing;",
    }];

    let result = migrations::apply(&storage, &broken).await;

    assert!(matches!(result, Err(CollectorError::MigrationError { .. })));
    assert!(!storage.is_applied("001_broken.sql").await.unwrap());
}

#[tokio::test]
async fn test_duplicate_migration_versions_rejected() {
    let storage = SqliteStorage::in_memory().await.unwrap();
    let duplicated = [
        Migration {
            version: "001_a.sql",
            sql: "CREATE TABLE a (n INTEGER);",
        },
        Migration {
            version: "001_a.sql",
            sql: "CREATE TABLE b (n INTEGER);",
        },
    ];

    let result = migrations::apply(&storage, &duplicated).await;
    assert!(matches!(result, Err(CollectorError::MigrationError { .. })));
    // nothing ran
    assert!(storage.count_rows("a").await.is_err());
}

#[tokio::test]
async fn test_ledger_setup_is_idempotent() {
    let storage = SqliteStorage::in_memory().await.unwrap();
    storage.ensure_ledger().await.unwrap();
    storage.record_applied("001_x.sql").await.unwrap();
    storage.ensure_ledger().await.unwrap();

    assert!(storage.is_applied("001_x.sql").await.unwrap());
    assert!(!storage.is_applied("002_y.sql").await.unwrap());
}

#[tokio::test]
async fn test_metric_upsert_is_idempotent() {
    let db = setup_test_db().await;
    db.upsert_team(1, "Platform", Utc::now()).await.unwrap();

    db.upsert_metric(&metric(1, 42)).await.unwrap();
    db.upsert_metric(&metric(1, 42)).await.unwrap();

    assert_eq!(db.count_rows("pr_metrics").await.unwrap(), 1);
    let stored = db.get_metric(1, "acme/api", 42).await.unwrap().unwrap();
    assert_eq!(stored, metric(1, 42));
}

#[tokio::test]
async fn test_metric_upsert_overwrites_on_conflict() {
    let db = setup_test_db().await;
    db.upsert_team(1, "Platform", Utc::now()).await.unwrap();
    db.upsert_metric(&metric(1, 42)).await.unwrap();

    let mut updated = metric(1, 42);
    updated.title = "Add retries with backoff".to_string();
    updated.approved_count = 2;
    updated.reviewers_list = r#"["bob","carol","dave"]"#.to_string();
    db.upsert_metric(&updated).await.unwrap();

    let stored = db.get_metric(1, "acme/api", 42).await.unwrap().unwrap();
    assert_eq!(stored, updated);
    assert_eq!(db.count_rows("pr_metrics").await.unwrap(), 1);
}

#[tokio::test]
async fn test_metric_rows_are_keyed_per_team() {
    let db = setup_test_db().await;
    db.upsert_team(1, "Platform", Utc::now()).await.unwrap();
    db.upsert_team(2, "Payments", Utc::now()).await.unwrap();

    db.upsert_metric(&metric(1, 42)).await.unwrap();
    db.upsert_metric(&metric(2, 42)).await.unwrap();

    assert_eq!(db.count_rows("pr_metrics").await.unwrap(), 2);
    assert_eq!(db.count_rows("view_team_velocity").await.unwrap(), 2);
    assert!(db.get_metric(3, "acme/api", 42).await.unwrap().is_none());
}

#[tokio::test]
async fn test_watermark_round_trip() {
    let db = setup_test_db().await;
    assert!(db.get_watermark("acme/api").await.unwrap().is_none());

    db.set_watermark("acme/api", ts(3, 8)).await.unwrap();
    assert_eq!(db.get_watermark("acme/api").await.unwrap(), Some(ts(3, 8)));

    db.set_watermark("acme/api", ts(4, 8)).await.unwrap();
    assert_eq!(db.get_watermark("acme/api").await.unwrap(), Some(ts(4, 8)));
    assert!(db.get_watermark("acme/web").await.unwrap().is_none());
    assert_eq!(db.count_rows("collection_metadata").await.unwrap(), 1);
}

#[tokio::test]
async fn test_count_rows_rejects_unsafe_names() {
    let db = setup_test_db().await;
    assert!(db.count_rows("teams; DROP TABLE teams").await.is_err());
    assert!(db.count_rows("missing_table").await.is_err());
}
