//! gpscanon-gi - GPS Ingest Service
//!
//! Normalizes heterogeneous GPS-tracking exports into the canonical metric
//! space: profile management under the write guard, snapshot capture, and
//! the normalize -> map-to-canon -> sanitize -> persist pipeline.
//!
//! The canonical registry is loaded and validated before the server binds;
//! a broken registry aborts startup instead of serving broken lookups.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gpscanon_common::{config, CanonicalRegistry};
use gpscanon_gi::AppState;

const DEFAULT_BIND: &str = "127.0.0.1:5810";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting gpscanon-gi (GPS Ingest) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Registry load is fatal on any validation error
    let registry = Arc::new(
        CanonicalRegistry::load_embedded().context("canonical registry failed validation")?,
    );

    // Resolve root folder and open the shared database
    let root_folder = config::resolve_root_folder(None, "GPSCANON_ROOT")
        .context("failed to resolve root folder")?;
    let db_path = config::database_path(&root_folder)?;
    info!("Database: {}", db_path.display());

    let db_pool = gpscanon_common::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let state = AppState::new(db_pool, registry);
    let app = gpscanon_gi::build_router(state);

    let bind = std::env::var("GPSCANON_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
