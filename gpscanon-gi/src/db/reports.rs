//! GPS report database operations
//!
//! A report insert and its profile's usage-count increment share one
//! transaction: persistence after ingestion is all-or-nothing. Canonical
//! rewrites by the recalculation engine likewise update processed data and
//! import metadata atomically per report.

use chrono::Utc;
use gpscanon_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::report::{GpsReport, ImportMeta, ProcessedData};
use crate::models::snapshot::ProfileSnapshot;

fn json_field<T: serde::de::DeserializeOwned>(raw: Option<String>, what: &str) -> Result<Option<T>> {
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| Error::Internal(format!("failed to deserialize {}: {}", what, e)))
    })
    .transpose()
}

fn row_to_report(row: &sqlx::sqlite::SqliteRow) -> Result<GpsReport> {
    let id: String = row.get("id");
    let profile_id: String = row.get("profile_id");
    let raw_data: String = row.get("raw_data");
    let import_meta: String = row.get("import_meta");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(GpsReport {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("invalid report id '{}': {}", id, e)))?,
        name: row.get("name"),
        profile_id: Uuid::parse_str(&profile_id)
            .map_err(|e| Error::Internal(format!("invalid profile id '{}': {}", profile_id, e)))?,
        gps_system: row.get("gps_system"),
        raw_data: serde_json::from_str(&raw_data)
            .map_err(|e| Error::Internal(format!("failed to deserialize raw data: {}", e)))?,
        profile_snapshot: json_field(row.get("profile_snapshot"), "profile snapshot")?,
        processed_data: json_field(row.get("processed_data"), "processed data")?,
        import_meta: serde_json::from_str(&import_meta)
            .map_err(|e| Error::Internal(format!("failed to deserialize import meta: {}", e)))?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| Error::Internal(format!("failed to parse created_at: {}", e)))?
            .with_timezone(&Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| Error::Internal(format!("failed to parse updated_at: {}", e)))?
            .with_timezone(&Utc),
    })
}

/// Persist an ingested report and bump its profile's usage count
pub async fn insert_report(pool: &SqlitePool, report: &GpsReport) -> Result<()> {
    let raw_data = serde_json::to_string(&report.raw_data)
        .map_err(|e| Error::Internal(format!("failed to serialize raw data: {}", e)))?;
    let profile_snapshot = report
        .profile_snapshot
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("failed to serialize snapshot: {}", e)))?;
    let processed_data = report
        .processed_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("failed to serialize processed data: {}", e)))?;
    let import_meta = serde_json::to_string(&report.import_meta)
        .map_err(|e| Error::Internal(format!("failed to serialize import meta: {}", e)))?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO gps_reports (
            id, name, profile_id, gps_system, raw_data,
            profile_snapshot, processed_data, import_meta, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(report.id.to_string())
    .bind(&report.name)
    .bind(report.profile_id.to_string())
    .bind(&report.gps_system)
    .bind(&raw_data)
    .bind(&profile_snapshot)
    .bind(&processed_data)
    .bind(&import_meta)
    .bind(report.created_at.to_rfc3339())
    .bind(report.updated_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE gps_profiles SET usage_count = usage_count + 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(report.profile_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(report_id = %report.id, profile_id = %report.profile_id, "Report persisted");
    Ok(())
}

/// Load one report
pub async fn get_report(pool: &SqlitePool, id: Uuid) -> Result<Option<GpsReport>> {
    let row = sqlx::query("SELECT * FROM gps_reports WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_report).transpose()
}

/// Total number of stored reports
pub async fn count_reports(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM gps_reports")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Keyset cursor over `(created_at, id)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportCursor {
    pub created_at: String,
    pub id: String,
}

/// Fetch the next batch of reports ordered by `(created_at, id)`
///
/// Keyset pagination keeps backfill batches stable under concurrent
/// inserts and lets an interrupted job resume from its last cursor.
pub async fn next_batch(
    pool: &SqlitePool,
    after: Option<&ReportCursor>,
    limit: i64,
) -> Result<Vec<GpsReport>> {
    let rows = match after {
        Some(cursor) => {
            sqlx::query(
                r#"
                SELECT * FROM gps_reports
                WHERE (created_at, id) > (?, ?)
                ORDER BY created_at, id
                LIMIT ?
                "#,
            )
            .bind(&cursor.created_at)
            .bind(&cursor.id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT * FROM gps_reports ORDER BY created_at, id LIMIT ?")
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
    };

    rows.iter().map(row_to_report).collect()
}

/// Cursor pointing at a report, for [`next_batch`]
pub fn cursor_of(report: &GpsReport) -> ReportCursor {
    ReportCursor {
        created_at: report.created_at.to_rfc3339(),
        id: report.id.to_string(),
    }
}

/// Rewrite a report's canonical block, snapshot and import metadata
///
/// Used by the recalculation engine in commit mode; one transaction per
/// report so an interrupted job never leaves a half-written report.
pub async fn update_processed(
    pool: &SqlitePool,
    id: Uuid,
    processed: &ProcessedData,
    import_meta: &ImportMeta,
    snapshot: Option<&ProfileSnapshot>,
) -> Result<()> {
    let processed_json = serde_json::to_string(processed)
        .map_err(|e| Error::Internal(format!("failed to serialize processed data: {}", e)))?;
    let import_meta_json = serde_json::to_string(import_meta)
        .map_err(|e| Error::Internal(format!("failed to serialize import meta: {}", e)))?;
    let snapshot_json = snapshot
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("failed to serialize snapshot: {}", e)))?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE gps_reports
        SET processed_data = ?,
            import_meta = ?,
            profile_snapshot = COALESCE(?, profile_snapshot),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&processed_json)
    .bind(&import_meta_json)
    .bind(&snapshot_json)
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
