//! Backfill engine integration tests: additive merge and idempotence

use std::sync::Arc;

use serde_json::json;
use sqlx::SqlitePool;

use gpscanon_common::{db::init_database_pool, CanonicalRegistry};
use gpscanon_gi::db::{profiles, reports};
use gpscanon_gi::models::profile::{ColumnMapping, GpsProfile, MappingEntry};
use gpscanon_gi::models::report::{
    CanonicalBlock, CanonicalRow, GpsReport, ParsedTable, ProcessedData,
};
use gpscanon_gi::services::snapshot::build_snapshot;
use gpscanon_rc::{BackfillEngine, BackfillOptions, BackfillSummary};

fn column(header: &str, key: &str, order: i64) -> MappingEntry {
    MappingEntry::Column(ColumnMapping {
        source_header: header.to_string(),
        canonical_key: key.to_string(),
        display_name: header.to_string(),
        order,
        is_visible: true,
        source_unit: None,
        display_unit: None,
        source_index: None,
    })
}

fn test_profile() -> GpsProfile {
    GpsProfile::new(
        "Vendor",
        "B-SIGHT",
        vec![
            column("Name", "athlete_name", 0),
            column("TD", "total_distance_m", 1),
            column("MaxSpeed", "max_speed_ms", 2),
        ],
    )
}

fn raw_table() -> ParsedTable {
    ParsedTable {
        headers: vec!["Name".to_string(), "TD".to_string(), "MaxSpeed".to_string()],
        rows: vec![
            vec![json!("John Doe"), json!("5000"), json!("7.5")],
            vec![json!("Jane Smith"), json!("6200"), json!("8.0")],
        ],
    }
}

/// Canonical rows as an older registry version would have written them:
/// names and distance only, no derived speed
fn legacy_canonical_rows() -> Vec<CanonicalRow> {
    vec![
        CanonicalRow::from([
            ("athlete_name".to_string(), json!("John Doe")),
            ("total_distance_m".to_string(), json!(5000.0)),
            ("max_speed_ms".to_string(), json!(7.5)),
        ]),
        CanonicalRow::from([
            ("athlete_name".to_string(), json!("jane  smith")),
            ("total_distance_m".to_string(), json!(6200.0)),
            ("max_speed_ms".to_string(), json!(8.0)),
        ]),
    ]
}

async fn setup() -> (tempfile::TempDir, SqlitePool, Arc<CanonicalRegistry>) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database_pool(&dir.path().join("backfill.db")).await.unwrap();
    let registry = Arc::new(CanonicalRegistry::load_embedded().unwrap());
    (dir, pool, registry)
}

async fn seed_report_with_legacy_canonical(
    pool: &SqlitePool,
    registry: &CanonicalRegistry,
    with_snapshot: bool,
) -> GpsReport {
    let profile = test_profile();
    profiles::insert_profile(pool, &profile, registry).await.unwrap();

    let mut report = GpsReport::new("Session 1", profile.id, "B-SIGHT", raw_table());
    if with_snapshot {
        report.profile_snapshot = Some(build_snapshot(&profile));
    }
    report.processed_data = Some(ProcessedData {
        canonical: CanonicalBlock {
            rows: legacy_canonical_rows(),
            columns: vec![
                "athlete_name".to_string(),
                "total_distance_m".to_string(),
                "max_speed_ms".to_string(),
            ],
            version: "0.9.0".to_string(),
            units: Default::default(),
            warnings: vec![],
        },
        profile: None,
    });
    reports::insert_report(pool, &report).await.unwrap();
    report
}

fn counts(summary: &BackfillSummary) -> (u64, u64, u64, u64) {
    (
        summary.processed,
        summary.with_issues,
        summary.added_cells,
        summary.reports_written,
    )
}

#[tokio::test]
async fn dry_run_reports_changes_without_writing() {
    let (_dir, pool, registry) = setup().await;
    let report = seed_report_with_legacy_canonical(&pool, &registry, true).await;

    let engine = BackfillEngine::new(
        pool.clone(),
        registry.clone(),
        BackfillOptions {
            commit: false,
            batch_size: 200,
            new_keys: vec!["max_speed_kmh".to_string()],
        },
    );
    let (summary, results) = engine.run().await.unwrap();

    assert_eq!(summary.total_reports, 1);
    assert_eq!(summary.processed, 1);
    // Two rows, one new key each
    assert_eq!(summary.added_cells, 2);
    assert_eq!(summary.reports_written, 0);
    assert!(results[0].will_write);
    assert!(!results[0].wrote);

    // Zero writes: stored canonical block untouched
    let stored = reports::get_report(&pool, report.id).await.unwrap().unwrap();
    let rows = &stored.processed_data.unwrap().canonical.rows;
    assert!(!rows[0].contains_key("max_speed_kmh"));
}

#[tokio::test]
async fn dry_run_twice_produces_identical_counts() {
    let (_dir, pool, registry) = setup().await;
    seed_report_with_legacy_canonical(&pool, &registry, true).await;

    let options = BackfillOptions {
        commit: false,
        batch_size: 200,
        new_keys: vec!["max_speed_kmh".to_string()],
    };
    let engine = BackfillEngine::new(pool.clone(), registry.clone(), options.clone());
    let (first, _) = engine.run().await.unwrap();
    let engine = BackfillEngine::new(pool, registry, options);
    let (second, _) = engine.run().await.unwrap();

    assert_eq!(counts(&first), counts(&second));
}

#[tokio::test]
async fn commit_merges_additively_and_is_idempotent() {
    let (_dir, pool, registry) = setup().await;
    let report = seed_report_with_legacy_canonical(&pool, &registry, true).await;

    let options = BackfillOptions {
        commit: true,
        batch_size: 200,
        new_keys: vec!["max_speed_kmh".to_string()],
    };
    let engine = BackfillEngine::new(pool.clone(), registry.clone(), options.clone());
    let (summary, _) = engine.run().await.unwrap();
    assert_eq!(summary.added_cells, 2);
    assert_eq!(summary.reports_written, 1);

    let stored = reports::get_report(&pool, report.id).await.unwrap().unwrap();
    let processed = stored.processed_data.unwrap();
    // Normalized-name matching: " jane  smith" matched "Jane Smith"
    assert_eq!(processed.canonical.rows[0]["max_speed_kmh"], json!(27.0));
    assert_eq!(processed.canonical.rows[1]["max_speed_kmh"], json!(28.8));
    // Existing keys untouched, columns extended, version stamped
    assert_eq!(processed.canonical.rows[0]["total_distance_m"], json!(5000.0));
    assert!(processed.canonical.columns.contains(&"max_speed_kmh".to_string()));
    assert_eq!(processed.canonical.version, registry.version());

    // Second commit run is a no-op
    let engine = BackfillEngine::new(pool.clone(), registry, options);
    let (second, results) = engine.run().await.unwrap();
    assert_eq!(second.added_cells, 0);
    assert_eq!(second.reports_written, 0);
    assert!(!results[0].will_write);

    let after = reports::get_report(&pool, report.id).await.unwrap().unwrap();
    assert_eq!(
        serde_json::to_string(&after.processed_data).unwrap(),
        serde_json::to_string(&Some(processed)).unwrap()
    );
}

#[tokio::test]
async fn missing_snapshot_is_rebuilt_from_profile_on_commit() {
    let (_dir, pool, registry) = setup().await;
    let report = seed_report_with_legacy_canonical(&pool, &registry, false).await;

    let engine = BackfillEngine::new(
        pool.clone(),
        registry.clone(),
        BackfillOptions {
            commit: true,
            batch_size: 200,
            new_keys: vec![],
        },
    );
    let (summary, results) = engine.run().await.unwrap();
    assert_eq!(summary.missing_snapshot, 1);
    assert_eq!(summary.orphan_reports, 0);
    assert_eq!(results[0].snapshot_source, "profile");

    let stored = reports::get_report(&pool, report.id).await.unwrap().unwrap();
    let snapshot = stored.profile_snapshot.unwrap();
    assert!(!snapshot.meta.recovered);
    assert_eq!(snapshot.columns.len(), 3);
}

#[tokio::test]
async fn orphan_report_is_recovered() {
    let (_dir, pool, registry) = setup().await;
    let report = seed_report_with_legacy_canonical(&pool, &registry, false).await;

    // Delete the owning profile directly; the guard would refuse, which is
    // exactly how orphans arose before it existed
    sqlx::query("DELETE FROM gps_profiles WHERE id = ?")
        .bind(report.profile_id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let engine = BackfillEngine::new(
        pool.clone(),
        registry.clone(),
        BackfillOptions {
            commit: true,
            batch_size: 200,
            new_keys: vec![],
        },
    );
    let (summary, results) = engine.run().await.unwrap();
    assert_eq!(summary.orphan_reports, 1);
    assert_eq!(summary.recovery_ready, 1);
    assert_eq!(results[0].snapshot_source, "recovered:canonical.columns");
    assert!(results[0].issues.contains(&"PROFILE_NOT_FOUND".to_string()));

    let stored = reports::get_report(&pool, report.id).await.unwrap().unwrap();
    let snapshot = stored.profile_snapshot.unwrap();
    assert!(snapshot.meta.recovered);
    assert_eq!(snapshot.meta.reason.as_deref(), Some("PROFILE_NOT_FOUND"));
}

#[tokio::test]
async fn unknown_new_key_is_a_fatal_configuration_error() {
    let (_dir, pool, registry) = setup().await;
    seed_report_with_legacy_canonical(&pool, &registry, true).await;

    let engine = BackfillEngine::new(
        pool,
        registry,
        BackfillOptions {
            commit: false,
            batch_size: 200,
            new_keys: vec!["metric_from_the_future".to_string()],
        },
    );
    let err = engine.run().await.unwrap_err();
    assert!(err.to_string().contains("metric_from_the_future"));
}

#[tokio::test]
async fn batching_covers_all_reports() {
    let (_dir, pool, registry) = setup().await;
    let profile = test_profile();
    profiles::insert_profile(&pool, &profile, &registry).await.unwrap();
    for i in 0..5 {
        let mut report = GpsReport::new(format!("r{}", i), profile.id, "B-SIGHT", raw_table());
        report.profile_snapshot = Some(build_snapshot(&profile));
        reports::insert_report(&pool, &report).await.unwrap();
    }

    // Batch size smaller than the report count forces several batches
    let engine = BackfillEngine::new(
        pool,
        registry,
        BackfillOptions {
            commit: false,
            batch_size: 2,
            new_keys: vec![],
        },
    );
    let (summary, results) = engine.run().await.unwrap();
    assert_eq!(summary.processed, 5);
    assert_eq!(results.len(), 5);
}
