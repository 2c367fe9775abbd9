//! Backfill / recalculation engine
//!
//! Re-runs the canonical mapper against historical raw data and merges the
//! result into stored canonical rows. Merging is additive by construction:
//! rows are matched by a stable athlete identifier (normalized name as
//! fallback), only explicitly requested keys are added, and a key already
//! present on an existing row is never overwritten. Re-running either mode
//! on already-migrated data is a no-op.
//!
//! Reports are processed in fixed-size batches with a cooperative yield in
//! between, so a long backfill does not starve concurrent work. Each
//! commit writes one report in its own transaction; an interrupted job can
//! simply be re-run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use gpscanon_common::{CanonicalRegistry, Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use gpscanon_gi::db::reports::{self, ReportCursor};
use gpscanon_gi::db::profiles;
use gpscanon_gi::models::report::{CanonicalRow, Cell, GpsReport, ProcessedData};
use gpscanon_gi::models::snapshot::ProfileSnapshot;
use gpscanon_gi::services::snapshot::{build_snapshot, recover_snapshot};
use gpscanon_gi::workflow::{mapper, normalizer, sanitizer, SanitizerConfig};

/// Engine options
#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Write changes; the default is a dry run with zero writes
    pub commit: bool,
    /// Reports per batch
    pub batch_size: usize,
    /// Canonical keys to add to existing canonical rows
    pub new_keys: Vec<String>,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            commit: false,
            batch_size: 200,
            new_keys: Vec::new(),
        }
    }
}

/// Per-report outcome
#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub report_id: String,
    pub profile_id: String,
    /// Where the authoritative snapshot came from:
    /// "stored", "profile", "recovered:<strategy>" or "none"
    pub snapshot_source: String,
    pub issues: Vec<String>,
    /// Existing canonical rows matched to recomputed rows
    pub matched_rows: u32,
    /// Cells added across all rows
    pub added_cells: u32,
    pub will_write: bool,
    pub wrote: bool,
}

/// Per-profile aggregation bucket
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProfileBucket {
    pub count: u64,
    pub issues_count: u64,
}

/// Aggregate summary written to the diagnostic artifacts
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillSummary {
    pub mode: String,
    pub registry_version: String,
    pub total_reports: u64,
    pub processed: u64,
    pub missing_snapshot: u64,
    pub orphan_reports: u64,
    pub can_backfill: u64,
    pub recovery_ready: u64,
    pub with_issues: u64,
    pub added_cells: u64,
    pub reports_written: u64,
    pub by_profile_id: BTreeMap<String, ProfileBucket>,
    pub top_issues: BTreeMap<String, u64>,
}

/// Stable merge key: athlete id when present, normalized name otherwise
fn merge_key(row: &CanonicalRow) -> Option<String> {
    if let Some(id) = row.get("athlete_id").and_then(Cell::as_str) {
        if !id.trim().is_empty() {
            return Some(format!("id:{}", id.trim()));
        }
    }
    let name = row.get("athlete_name").and_then(Cell::as_str)?;
    let normalized = name
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.is_empty() {
        None
    } else {
        Some(format!("name:{}", normalized))
    }
}

/// Additively merge requested keys from fresh rows into existing rows
///
/// Returns `(matched_rows, added_cells)`. Keys already present on an
/// existing row are never touched.
fn merge_rows(
    existing: &mut [CanonicalRow],
    fresh: &[CanonicalRow],
    new_keys: &[String],
) -> (u32, u32) {
    let fresh_by_key: HashMap<String, &CanonicalRow> = fresh
        .iter()
        .filter_map(|row| merge_key(row).map(|k| (k, row)))
        .collect();

    let mut matched = 0u32;
    let mut added = 0u32;
    for row in existing.iter_mut() {
        let Some(key) = merge_key(row) else {
            continue;
        };
        let Some(fresh_row) = fresh_by_key.get(&key) else {
            continue;
        };
        matched += 1;
        for new_key in new_keys {
            if row.contains_key(new_key) {
                continue;
            }
            if let Some(value) = fresh_row.get(new_key) {
                if !value.is_null() {
                    row.insert(new_key.clone(), value.clone());
                    added += 1;
                }
            }
        }
    }
    (matched, added)
}

/// Backfill engine over one database
pub struct BackfillEngine {
    pool: SqlitePool,
    registry: Arc<CanonicalRegistry>,
    options: BackfillOptions,
}

impl BackfillEngine {
    pub fn new(pool: SqlitePool, registry: Arc<CanonicalRegistry>, options: BackfillOptions) -> Self {
        Self {
            pool,
            registry,
            options,
        }
    }

    /// Process every report in batches; returns the aggregate summary and
    /// the per-report results
    pub async fn run(&self) -> Result<(BackfillSummary, Vec<ReportResult>)> {
        // Requested keys must exist in the active registry; a typo here is
        // a malformed migration, not a data-quality warning
        for key in &self.options.new_keys {
            if self.registry.metric(key).is_none() {
                return Err(Error::InvalidInput(format!(
                    "requested key '{}' does not exist in registry version {}",
                    key,
                    self.registry.version()
                )));
            }
        }

        let mut summary = BackfillSummary {
            mode: (if self.options.commit { "commit" } else { "dry-run" }).to_string(),
            registry_version: self.registry.version().to_string(),
            total_reports: reports::count_reports(&self.pool).await? as u64,
            ..Default::default()
        };
        let mut results = Vec::new();

        info!(
            mode = %summary.mode,
            total_reports = summary.total_reports,
            new_keys = ?self.options.new_keys,
            "Backfill started"
        );

        let mut cursor: Option<ReportCursor> = None;
        loop {
            let batch =
                reports::next_batch(&self.pool, cursor.as_ref(), self.options.batch_size as i64)
                    .await?;
            if batch.is_empty() {
                break;
            }
            cursor = batch.last().map(reports::cursor_of);

            for report in &batch {
                let result = self.process_report(report, &mut summary).await?;

                let bucket = summary
                    .by_profile_id
                    .entry(result.profile_id.clone())
                    .or_default();
                bucket.count += 1;
                if !result.issues.is_empty() {
                    bucket.issues_count += 1;
                    summary.with_issues += 1;
                }
                for issue in &result.issues {
                    *summary.top_issues.entry(issue.clone()).or_default() += 1;
                }
                summary.added_cells += result.added_cells as u64;
                if result.wrote {
                    summary.reports_written += 1;
                }
                summary.processed += 1;
                results.push(result);
            }

            // Let concurrent work run between batches
            tokio::task::yield_now().await;
        }

        info!(
            processed = summary.processed,
            with_issues = summary.with_issues,
            added_cells = summary.added_cells,
            reports_written = summary.reports_written,
            "Backfill complete"
        );

        Ok((summary, results))
    }

    /// Resolve the authoritative snapshot for one report
    async fn resolve_snapshot(
        &self,
        report: &GpsReport,
        summary: &mut BackfillSummary,
        issues: &mut Vec<String>,
    ) -> Result<Option<(ProfileSnapshot, String)>> {
        if let Some(snapshot) = &report.profile_snapshot {
            return Ok(Some((snapshot.clone(), "stored".to_string())));
        }

        summary.missing_snapshot += 1;

        if let Some(profile) = profiles::get_profile(&self.pool, report.profile_id).await? {
            return Ok(Some((build_snapshot(&profile), "profile".to_string())));
        }

        // Orphan report: owning profile is gone, reconstruct best-effort
        summary.orphan_reports += 1;
        issues.push("PROFILE_NOT_FOUND".to_string());
        match recover_snapshot(report.processed_data.as_ref(), &report.raw_data, &self.registry) {
            Some((snapshot, strategy)) => {
                summary.recovery_ready += 1;
                Ok(Some((snapshot, format!("recovered:{}", strategy))))
            }
            None => {
                issues.push("RECOVERY_FAILED".to_string());
                Ok(None)
            }
        }
    }

    async fn process_report(
        &self,
        report: &GpsReport,
        summary: &mut BackfillSummary,
    ) -> Result<ReportResult> {
        let mut issues = Vec::new();

        let Some((snapshot, snapshot_source)) =
            self.resolve_snapshot(report, summary, &mut issues).await?
        else {
            return Ok(ReportResult {
                report_id: report.id.to_string(),
                profile_id: report.profile_id.to_string(),
                snapshot_source: "none".to_string(),
                issues,
                matched_rows: 0,
                added_cells: 0,
                will_write: false,
                wrote: false,
            });
        };

        // Re-derive canonical rows from raw data under the current registry
        let normalized = normalizer::normalize(&report.raw_data, &snapshot);
        let block = mapper::map_to_canonical(&normalized.rows, &snapshot, &self.registry);
        let metric_keys = snapshot.metric_keys(&self.registry);
        let sanitized = sanitizer::sanitize(
            &block.rows,
            &metric_keys,
            &self.registry,
            &SanitizerConfig::default(),
        );
        let fresh_rows = sanitized.filtered_rows;

        let mut processed = report.processed_data.clone().unwrap_or_default();
        let had_canonical = !processed.canonical.rows.is_empty();

        let (matched_rows, added_cells, will_write) = if had_canonical {
            let (matched, added) =
                merge_rows(&mut processed.canonical.rows, &fresh_rows, &self.options.new_keys);
            if matched == 0 && !fresh_rows.is_empty() && !self.options.new_keys.is_empty() {
                issues.push("NO_MATCHED_ROWS".to_string());
            }
            (matched, added, added > 0)
        } else {
            // No canonical data at all: the whole block can be written
            summary.can_backfill += 1;
            if fresh_rows.is_empty() {
                issues.push("NO_CANONICAL_ROWS".to_string());
                (0, 0, false)
            } else {
                let cells = fresh_rows.iter().map(|r| r.len() as u32).sum();
                processed.canonical = gpscanon_gi::models::report::CanonicalBlock {
                    rows: fresh_rows.clone(),
                    columns: block.columns.clone(),
                    version: block.version.clone(),
                    units: block.units.clone(),
                    warnings: block.warnings.clone(),
                };
                (0, cells, true)
            }
        };

        if will_write {
            // Additive schema evolution: requested keys join the column
            // list and the block is stamped with the current registry
            for key in &self.options.new_keys {
                if !processed.canonical.columns.iter().any(|c| c == key) {
                    processed.canonical.columns.push(key.clone());
                }
            }
            processed.canonical.version = self.registry.version().to_string();
            processed.canonical.units = self.registry.canonical_units();
        }

        let writes_snapshot = snapshot_source != "stored";
        let mut wrote = false;
        if self.options.commit && (will_write || writes_snapshot) {
            let snapshot_to_store = writes_snapshot.then_some(&snapshot);
            reports::update_processed(
                &self.pool,
                report.id,
                &processed,
                &report.import_meta,
                snapshot_to_store,
            )
            .await?;
            wrote = true;
            debug!(report_id = %report.id, added_cells, "Report updated");
        }

        if !issues.is_empty() {
            warn!(report_id = %report.id, issues = ?issues, "Report has backfill issues");
        }

        Ok(ReportResult {
            report_id: report.id.to_string(),
            profile_id: report.profile_id.to_string(),
            snapshot_source,
            issues,
            matched_rows,
            added_cells,
            will_write,
            wrote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Cell)]) -> CanonicalRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn merge_prefers_athlete_id_over_name() {
        let mut existing = vec![row(&[
            ("athlete_id", json!("p-1")),
            ("athlete_name", json!("Somebody Else")),
            ("total_distance_m", json!(5000.0)),
        ])];
        let fresh = vec![row(&[
            ("athlete_id", json!("p-1")),
            ("athlete_name", json!("John Doe")),
            ("max_speed_kmh", json!(27.0)),
        ])];

        let (matched, added) =
            merge_rows(&mut existing, &fresh, &["max_speed_kmh".to_string()]);
        assert_eq!(matched, 1);
        assert_eq!(added, 1);
        assert_eq!(existing[0]["max_speed_kmh"], json!(27.0));
    }

    #[test]
    fn merge_falls_back_to_normalized_name() {
        let mut existing = vec![row(&[
            ("athlete_name", json!("  john   DOE ")),
            ("total_distance_m", json!(5000.0)),
        ])];
        let fresh = vec![row(&[
            ("athlete_name", json!("John Doe")),
            ("max_speed_kmh", json!(27.0)),
        ])];

        let (matched, added) =
            merge_rows(&mut existing, &fresh, &["max_speed_kmh".to_string()]);
        assert_eq!(matched, 1);
        assert_eq!(added, 1);
    }

    #[test]
    fn merge_never_overwrites_present_keys() {
        let mut existing = vec![row(&[
            ("athlete_name", json!("John Doe")),
            ("max_speed_kmh", json!(25.0)),
        ])];
        let fresh = vec![row(&[
            ("athlete_name", json!("John Doe")),
            ("max_speed_kmh", json!(27.0)),
        ])];

        let (matched, added) =
            merge_rows(&mut existing, &fresh, &["max_speed_kmh".to_string()]);
        assert_eq!(matched, 1);
        assert_eq!(added, 0);
        assert_eq!(existing[0]["max_speed_kmh"], json!(25.0));
    }

    #[test]
    fn merge_ignores_keys_not_requested() {
        let mut existing = vec![row(&[("athlete_name", json!("John Doe"))])];
        let fresh = vec![row(&[
            ("athlete_name", json!("John Doe")),
            ("max_speed_kmh", json!(27.0)),
            ("minutes_played", json!(90.0)),
        ])];

        let (_, added) = merge_rows(&mut existing, &fresh, &["minutes_played".to_string()]);
        assert_eq!(added, 1);
        assert!(!existing[0].contains_key("max_speed_kmh"));
    }

    #[test]
    fn merge_skips_null_fresh_values() {
        let mut existing = vec![row(&[("athlete_name", json!("John Doe"))])];
        let fresh = vec![row(&[
            ("athlete_name", json!("John Doe")),
            ("minutes_played", Cell::Null),
        ])];

        let (_, added) = merge_rows(&mut existing, &fresh, &["minutes_played".to_string()]);
        assert_eq!(added, 0);
        assert!(!existing[0].contains_key("minutes_played"));
    }
}
