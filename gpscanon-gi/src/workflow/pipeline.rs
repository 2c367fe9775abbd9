//! Ingestion pipeline orchestrator
//!
//! Sequences normalize -> map-to-canon -> sanitize for one uploaded file.
//! Each stage carries a `step` identifier for diagnostics; a stage failure
//! returns `{code, step, message}` and nothing is persisted. Persistence
//! itself (the `persist` step) is the caller's single transaction after
//! the pipeline succeeds, so writes are all-or-nothing.

use std::sync::Arc;

use gpscanon_common::{CanonicalRegistry, DataQualityWarning, WarningCode};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::report::{CanonicalBlock, ImportCounts, ImportMeta, ParsedTable};
use crate::models::snapshot::ProfileSnapshot;
use crate::workflow::{mapper, normalizer, sanitizer, SanitizerConfig};

/// Pipeline stage identifier attached to failures for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    ParseFile,
    Normalize,
    MapToCanon,
    Sanitize,
    Persist,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseFile => "parse-file",
            Self::Normalize => "normalize",
            Self::MapToCanon => "map-to-canon",
            Self::Sanitize => "sanitize",
            Self::Persist => "persist",
        }
    }
}

/// Structural pipeline failure; per-row issues are warnings, not errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    pub code: String,
    pub step: Step,
    pub message: String,
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.step.as_str(), self.code, self.message)
    }
}

impl std::error::Error for StageError {}

impl StageError {
    pub fn new(code: impl Into<String>, step: Step, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            step,
            message: message.into(),
        }
    }
}

/// Successful pipeline result, ready to persist
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Canonical block with sanitized rows
    pub canonical: CanonicalBlock,
    /// Warnings and row accounting for the report's import metadata
    pub import_meta: ImportMeta,
    /// Header resolutions and table sizes for the upload response
    pub debug: serde_json::Value,
}

/// Ingestion pipeline for one report
pub struct IngestPipeline {
    registry: Arc<CanonicalRegistry>,
    sanitizer: SanitizerConfig,
}

impl IngestPipeline {
    pub fn new(registry: Arc<CanonicalRegistry>) -> Self {
        Self {
            registry,
            sanitizer: SanitizerConfig::default(),
        }
    }

    pub fn with_sanitizer(registry: Arc<CanonicalRegistry>, sanitizer: SanitizerConfig) -> Self {
        Self { registry, sanitizer }
    }

    /// Run the core stages for one pre-parsed upload
    ///
    /// Pure and synchronous: safe to run concurrently across reports.
    pub fn run(
        &self,
        parsed: &ParsedTable,
        snapshot: &ProfileSnapshot,
    ) -> Result<IngestOutcome, StageError> {
        // The parsing collaborator delivered the table; an upload without a
        // header row is structurally unusable and charged to its stage.
        if parsed.headers.is_empty() {
            return Err(StageError::new(
                "EMPTY_HEADERS",
                Step::ParseFile,
                "uploaded file contains no header row",
            ));
        }

        let normalized = normalizer::normalize(parsed, snapshot);

        let block = mapper::map_to_canonical(&normalized.rows, snapshot, &self.registry);

        let metric_keys = snapshot.metric_keys(&self.registry);
        let sanitized = sanitizer::sanitize(&block.rows, &metric_keys, &self.registry, &self.sanitizer);

        let mut warnings: Vec<DataQualityWarning> = Vec::new();
        warnings.extend(normalized.warnings.clone());
        warnings.extend(block.warnings.clone());
        warnings.extend(sanitized.warnings.clone());
        // Player-identity resolution is deferred out of ingestion by design
        warnings.push(DataQualityWarning::new(
            WarningCode::PlayerMappingsIgnored,
            "player-identity resolution is deferred; canonical rows carry names only",
        ));

        let counts = ImportCounts {
            input: normalized.sizes.input_rows as u32,
            filtered: sanitized.dropped_count,
            canonical: sanitized.filtered_rows.len() as u32,
        };

        info!(
            input_rows = counts.input,
            filtered = counts.filtered,
            canonical_rows = counts.canonical,
            warnings = warnings.len(),
            "Ingestion pipeline complete"
        );

        let debug = serde_json::json!({
            "sizes": normalized.sizes,
            "resolutions": normalized.resolutions,
            "counts": counts,
        });

        let canonical = CanonicalBlock {
            rows: sanitized.filtered_rows,
            columns: block.columns,
            version: block.version,
            units: block.units,
            warnings: block.warnings,
        };

        Ok(IngestOutcome {
            canonical,
            import_meta: ImportMeta { warnings, counts },
            debug,
        })
    }
}
