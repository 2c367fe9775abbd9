//! GPS report endpoints
//!
//! Ingestion accepts pre-parsed `{headers, rows}` payloads from the
//! file-parsing collaborator, freezes the profile into a snapshot, runs
//! the pipeline and persists everything in one transaction. An upload with
//! imperfect source data still succeeds: data-quality issues come back as
//! warnings in the response metadata, not as failures.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use gpscanon_common::DataQualityWarning;

use crate::db::{profiles, reports};
use crate::error::{ApiError, ApiResult};
use crate::models::report::{CanonicalRow, GpsReport, ParsedTable, ProcessedData};
use crate::services::snapshot::build_snapshot;
use crate::workflow::{IngestPipeline, StageError, Step};
use crate::AppState;

/// Request body for ingesting one uploaded file
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub name: String,
    pub profile_id: Uuid,
    /// Pre-parsed table from the spreadsheet-parsing collaborator
    pub parsed: ParsedTable,
}

/// Ingestion response: ok even when rows were dropped or unmapped
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub report_id: Uuid,
    pub canon_rows: Vec<CanonicalRow>,
    pub warnings: Vec<DataQualityWarning>,
    pub debug: Value,
}

/// POST /api/reports
pub async fn ingest_report(
    State(state): State<AppState>,
    Json(body): Json<IngestRequest>,
) -> ApiResult<Json<IngestResponse>> {
    let profile = profiles::get_profile(&state.db, body.profile_id)
        .await?
        .ok_or_else(|| {
            ApiError::Stage(StageError::new(
                "PROFILE_NOT_FOUND",
                Step::ParseFile,
                format!("profile '{}' not found", body.profile_id),
            ))
        })?;

    let snapshot = build_snapshot(&profile);

    let pipeline = IngestPipeline::new(state.registry.clone());
    let outcome = pipeline.run(&body.parsed, &snapshot)?;

    let mut report = GpsReport::new(body.name, profile.id, profile.gps_system.clone(), body.parsed);
    report.profile_snapshot = Some(snapshot);
    report.processed_data = Some(ProcessedData {
        canonical: outcome.canonical.clone(),
        profile: None,
    });
    report.import_meta = outcome.import_meta.clone();

    reports::insert_report(&state.db, &report).await.map_err(|e| {
        ApiError::Stage(StageError::new(
            "PERSIST_FAILED",
            Step::Persist,
            e.to_string(),
        ))
    })?;

    Ok(Json(IngestResponse {
        ok: true,
        report_id: report.id,
        canon_rows: outcome.canonical.rows,
        warnings: outcome.import_meta.warnings,
        debug: outcome.debug,
    }))
}

/// GET /api/reports/:id
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GpsReport>> {
    let report = reports::get_report(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("report '{}' not found", id)))?;
    Ok(Json(report))
}

/// Build report routes
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/api/reports", post(ingest_report))
        .route("/api/reports/:id", get(get_report))
}
