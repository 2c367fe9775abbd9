//! Shared SQLite database access
//!
//! Profiles and reports store their structured payloads (column mappings,
//! raw rows, snapshots, canonical blocks) as JSON TEXT columns; the
//! relational part carries identity, ordering and usage bookkeeping.

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create gpscanon tables if they don't exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gps_profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            gps_system TEXT NOT NULL,
            column_mapping TEXT NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gps_reports (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            profile_id TEXT NOT NULL,
            gps_system TEXT NOT NULL,
            raw_data TEXT NOT NULL,
            profile_snapshot TEXT,
            processed_data TEXT,
            import_meta TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Keyset pagination for the backfill engine
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_gps_reports_created ON gps_reports(created_at, id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (gps_profiles, gps_reports)");

    Ok(())
}
