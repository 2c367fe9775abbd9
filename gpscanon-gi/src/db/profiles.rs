//! GPS profile database operations
//!
//! The profile guard runs inside the update/delete transactions here, so a
//! guarded write can never land partially: either the whole new mapping is
//! stored or the previous state remains byte-identical.

use chrono::Utc;
use gpscanon_common::{CanonicalRegistry, Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::profile::{validate_mapping, GpsProfile, MappingEntry};
use crate::services::guard;

fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<GpsProfile> {
    let id: String = row.get("id");
    let column_mapping: String = row.get("column_mapping");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(GpsProfile {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("invalid profile id '{}': {}", id, e)))?,
        name: row.get("name"),
        gps_system: row.get("gps_system"),
        column_mapping: serde_json::from_str(&column_mapping)
            .map_err(|e| Error::Internal(format!("failed to deserialize column mapping: {}", e)))?,
        usage_count: row.get("usage_count"),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| Error::Internal(format!("failed to parse created_at: {}", e)))?
            .with_timezone(&Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| Error::Internal(format!("failed to parse updated_at: {}", e)))?
            .with_timezone(&Utc),
    })
}

/// Insert a new profile after validating its mapping against the registry
pub async fn insert_profile(
    pool: &SqlitePool,
    profile: &GpsProfile,
    registry: &CanonicalRegistry,
) -> Result<()> {
    validate_mapping(&profile.column_mapping, registry)?;

    let column_mapping = serde_json::to_string(&profile.column_mapping)
        .map_err(|e| Error::Internal(format!("failed to serialize column mapping: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO gps_profiles (id, name, gps_system, column_mapping, usage_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(profile.id.to_string())
    .bind(&profile.name)
    .bind(&profile.gps_system)
    .bind(&column_mapping)
    .bind(profile.usage_count)
    .bind(profile.created_at.to_rfc3339())
    .bind(profile.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    tracing::info!(profile_id = %profile.id, gps_system = %profile.gps_system, "Profile created");
    Ok(())
}

/// Load one profile
pub async fn get_profile(pool: &SqlitePool, id: Uuid) -> Result<Option<GpsProfile>> {
    let row = sqlx::query("SELECT * FROM gps_profiles WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_profile).transpose()
}

/// Update a profile's name, gps_system and mapping under the guard
///
/// The read, guard check and write share one transaction; a guard conflict
/// rolls back and leaves the stored mapping untouched.
pub async fn update_profile(
    pool: &SqlitePool,
    id: Uuid,
    name: &str,
    gps_system: &str,
    new_mapping: &[MappingEntry],
    registry: &CanonicalRegistry,
) -> Result<GpsProfile> {
    validate_mapping(new_mapping, registry)?;

    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT * FROM gps_profiles WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("profile '{}' not found", id)))?;
    let existing = row_to_profile(&row)?;

    guard::check_profile_update(&existing, new_mapping, gps_system)?;

    let column_mapping = serde_json::to_string(new_mapping)
        .map_err(|e| Error::Internal(format!("failed to serialize column mapping: {}", e)))?;
    let updated_at = Utc::now();

    sqlx::query(
        r#"
        UPDATE gps_profiles
        SET name = ?, gps_system = ?, column_mapping = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(gps_system)
    .bind(&column_mapping)
    .bind(updated_at.to_rfc3339())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(GpsProfile {
        name: name.to_string(),
        gps_system: gps_system.to_string(),
        column_mapping: new_mapping.to_vec(),
        updated_at,
        ..existing
    })
}

/// Delete a profile; refused while any report still uses it
pub async fn delete_profile(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT * FROM gps_profiles WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("profile '{}' not found", id)))?;
    let existing = row_to_profile(&row)?;

    guard::check_profile_delete(&existing)?;

    sqlx::query("DELETE FROM gps_profiles WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
