//! GPS profile endpoints
//!
//! Creation validates the mapping against the active registry; updates and
//! deletes run under the profile guard inside the repository transaction.
//! Guard violations surface as 409 conflicts, never as silent rewrites.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::profiles;
use crate::error::ApiResult;
use crate::models::profile::{GpsProfile, MappingEntry};
use crate::AppState;

/// Request body for creating or updating a profile
#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub name: String,
    pub gps_system: String,
    pub column_mapping: Vec<MappingEntry>,
}

/// POST /api/profiles
pub async fn create_profile(
    State(state): State<AppState>,
    Json(body): Json<ProfileRequest>,
) -> ApiResult<(StatusCode, Json<GpsProfile>)> {
    let profile = GpsProfile::new(body.name, body.gps_system, body.column_mapping);
    profiles::insert_profile(&state.db, &profile, &state.registry).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// GET /api/profiles/:id
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GpsProfile>> {
    let profile = profiles::get_profile(&state.db, id)
        .await?
        .ok_or_else(|| crate::error::ApiError::NotFound(format!("profile '{}' not found", id)))?;
    Ok(Json(profile))
}

/// PUT /api/profiles/:id
pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ProfileRequest>,
) -> ApiResult<Json<GpsProfile>> {
    let updated = profiles::update_profile(
        &state.db,
        id,
        &body.name,
        &body.gps_system,
        &body.column_mapping,
        &state.registry,
    )
    .await?;
    Ok(Json(updated))
}

/// DELETE /api/profiles/:id
pub async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    profiles::delete_profile(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Build profile routes
pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/api/profiles", post(create_profile))
        .route(
            "/api/profiles/:id",
            get(get_profile).put(update_profile).delete(delete_profile),
        )
}
