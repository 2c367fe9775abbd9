//! gpscanon-gi library interface
//!
//! Exposes the ingestion core (models, workflow, services, repositories)
//! for the service binary, the recalculation engine and integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use gpscanon_common::CanonicalRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Process-wide read-only canonical registry
    pub registry: Arc<CanonicalRegistry>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, registry: Arc<CanonicalRegistry>) -> Self {
        Self {
            db,
            registry,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::profile_routes())
        .merge(api::report_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
