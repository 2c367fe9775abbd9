//! gpscanon-rc - Recalculation / Backfill Tool
//!
//! Re-derives canonical data for already-ingested reports after the
//! registry or a profile's mapping changes. Dry-run is the default mode
//! and performs zero writes; `--commit` applies the additive merge. Every
//! invocation leaves a JSON + text artifact pair in the reports directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gpscanon_common::{config, CanonicalRegistry};
use gpscanon_rc::{artifacts, BackfillEngine, BackfillOptions};

#[derive(Parser, Debug)]
#[command(
    name = "gpscanon-rc",
    about = "Recalculate canonical GPS data for historical reports",
    version
)]
struct Cli {
    /// Apply changes; without this flag the run is a dry run with zero writes
    #[arg(long)]
    commit: bool,

    /// Reports per processing batch
    #[arg(long, default_value_t = 200)]
    batch_size: usize,

    /// Canonical keys to add to existing reports (comma-separated)
    #[arg(long, value_delimiter = ',')]
    new_keys: Vec<String>,

    /// Directory for the JSON + text diagnostic artifacts
    #[arg(long, default_value = "reports")]
    report_dir: PathBuf,

    /// SQLite database path; defaults to the resolved root folder
    #[arg(long)]
    db: Option<PathBuf>,

    /// Root folder override (otherwise GPSCANON_ROOT / config / OS default)
    #[arg(long)]
    root_folder: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let registry = Arc::new(
        CanonicalRegistry::load_embedded().context("canonical registry failed validation")?,
    );

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => {
            let root = config::resolve_root_folder(cli.root_folder.as_deref(), "GPSCANON_ROOT")
                .context("failed to resolve root folder")?;
            config::database_path(&root)?
        }
    };
    info!("Database: {}", db_path.display());

    let pool = gpscanon_common::db::init_database_pool(&db_path).await?;

    let options = BackfillOptions {
        commit: cli.commit,
        batch_size: cli.batch_size,
        new_keys: cli.new_keys,
    };
    let engine = BackfillEngine::new(pool, registry, options);
    let (summary, results) = engine.run().await?;

    let (json_path, text_path) = artifacts::write_artifacts(&cli.report_dir, &summary, &results)?;
    info!("Artifacts: {} / {}", json_path.display(), text_path.display());

    info!(
        mode = %summary.mode,
        processed = summary.processed,
        with_issues = summary.with_issues,
        added_cells = summary.added_cells,
        "Done"
    );

    Ok(())
}
