//! HTTP surface tests via tower::ServiceExt::oneshot

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use gpscanon_common::{db::init_database_pool, CanonicalRegistry};
use gpscanon_gi::{build_router, AppState};

async fn test_app() -> (tempfile::TempDir, axum::Router) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database_pool(&dir.path().join("api.db")).await.unwrap();
    let registry = Arc::new(CanonicalRegistry::load_embedded().unwrap());
    let app = build_router(AppState::new(pool, registry));
    (dir, app)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn profile_body() -> Value {
    json!({
        "name": "B-SIGHT default",
        "gps_system": "B-SIGHT",
        "column_mapping": [
            {
                "type": "column",
                "source_header": "Name",
                "canonical_key": "athlete_name",
                "display_name": "Player",
                "order": 0
            },
            {
                "type": "column",
                "source_header": "TD",
                "canonical_key": "total_distance_m",
                "display_name": "Total Distance",
                "order": 1
            },
            {
                "type": "column",
                "source_header": "MaxSpeed",
                "canonical_key": "max_speed_ms",
                "display_name": "Max Speed",
                "order": 2
            }
        ]
    })
}

#[tokio::test]
async fn health_reports_registry_version() {
    let (_dir, app) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "gpscanon-gi");
    assert_eq!(body["registry_version"], "1.0.0");
}

#[tokio::test]
async fn ingest_end_to_end() {
    let (_dir, app) = test_app().await;

    // Create the profile
    let response = app
        .clone()
        .oneshot(post_json("/api/profiles", profile_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let profile = body_json(response).await;
    let profile_id = profile["id"].as_str().unwrap().to_string();

    // Ingest a pre-parsed upload with one good row and one summary row
    let ingest = json!({
        "name": "Match vs Rivals",
        "profile_id": profile_id,
        "parsed": {
            "headers": ["Name", "TD", "MaxSpeed"],
            "rows": [
                ["John Doe", "5000", "7.5"],
                ["Итого", "9000", "8.0"]
            ]
        }
    });
    let response = app
        .clone()
        .oneshot(post_json("/api/reports", ingest))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    let rows = body["canon_rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["athlete_name"], "John Doe");
    assert_eq!(rows[0]["total_distance_m"], 5000.0);
    assert_eq!(rows[0]["max_speed_ms"], 7.5);
    assert_eq!(rows[0]["max_speed_kmh"], 27.0);

    let warnings = body["warnings"].as_array().unwrap();
    assert!(warnings
        .iter()
        .any(|w| w["code"] == "SUMMARY_ROWS_DROPPED"));
    assert!(warnings
        .iter()
        .any(|w| w["code"] == "PLAYER_MAPPINGS_IGNORED"));

    // Fetch the stored report: snapshot and canonical block persisted
    let report_id = body["report_id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/reports/{}", report_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert!(report["profile_snapshot"]["columns"].is_array());
    assert_eq!(
        report["processed_data"]["canonical"]["rows"]
            .as_array()
            .unwrap()
            .len(),
        1
    );

    // Profile usage count was bumped in the same transaction
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/profiles/{}", profile_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let profile = body_json(response).await;
    assert_eq!(profile["usage_count"], 1);
}

#[tokio::test]
async fn ingest_with_missing_profile_returns_step_tagged_error() {
    let (_dir, app) = test_app().await;

    let ingest = json!({
        "name": "Orphan upload",
        "profile_id": "00000000-0000-0000-0000-000000000000",
        "parsed": { "headers": ["A"], "rows": [] }
    });
    let response = app.oneshot(post_json("/api/reports", ingest)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "PROFILE_NOT_FOUND");
    assert_eq!(body["error"]["step"], "parse-file");
}

#[tokio::test]
async fn guarded_update_returns_conflict() {
    let (_dir, app) = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/api/profiles", profile_body()))
        .await
        .unwrap();
    let profile = body_json(response).await;
    let profile_id = profile["id"].as_str().unwrap().to_string();

    // Use the profile once
    let ingest = json!({
        "name": "Session",
        "profile_id": profile_id,
        "parsed": { "headers": ["Name", "TD", "MaxSpeed"], "rows": [["John", "100", "5"]] }
    });
    let response = app
        .clone()
        .oneshot(post_json("/api/reports", ingest))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Try to drop a mapped pair
    let mut update = profile_body();
    update["column_mapping"].as_array_mut().unwrap().pop();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/profiles/{}", profile_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(update.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "PROFILE_GUARD");
}

#[tokio::test]
async fn empty_headers_fail_at_parse_file_stage() {
    let (_dir, app) = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/api/profiles", profile_body()))
        .await
        .unwrap();
    let profile = body_json(response).await;
    let profile_id = profile["id"].as_str().unwrap().to_string();

    let ingest = json!({
        "name": "Empty",
        "profile_id": profile_id,
        "parsed": { "headers": [], "rows": [] }
    });
    let response = app.oneshot(post_json("/api/reports", ingest)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "EMPTY_HEADERS");
    assert_eq!(body["error"]["step"], "parse-file");
}
