//! Diagnostic artifact writer
//!
//! After every dry-run or commit invocation the engine's summary and
//! per-report results are written to the reports directory twice: a
//! machine-readable JSON document and a companion human-readable text
//! summary (counts, top issues, per-profile breakdown).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::engine::{BackfillSummary, ReportResult};

/// Write both artifacts; returns `(json_path, text_path)`
pub fn write_artifacts(
    dir: &Path,
    summary: &BackfillSummary,
    results: &[ReportResult],
) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create report directory {}", dir.display()))?;

    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let base = format!("backfill-{}-{}", summary.mode, stamp);
    let json_path = dir.join(format!("{}.json", base));
    let text_path = dir.join(format!("{}.txt", base));

    let document = serde_json::json!({
        "summary": summary,
        "reports": results,
    });
    std::fs::write(&json_path, serde_json::to_string_pretty(&document)?)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    std::fs::write(&text_path, render_text_summary(summary))
        .with_context(|| format!("failed to write {}", text_path.display()))?;

    Ok((json_path, text_path))
}

fn render_text_summary(summary: &BackfillSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Backfill {} (registry {})\n\n",
        summary.mode, summary.registry_version
    ));
    out.push_str(&format!("Total reports:     {}\n", summary.total_reports));
    out.push_str(&format!("Processed:         {}\n", summary.processed));
    out.push_str(&format!("Missing snapshot:  {}\n", summary.missing_snapshot));
    out.push_str(&format!("Orphan reports:    {}\n", summary.orphan_reports));
    out.push_str(&format!("Can backfill:      {}\n", summary.can_backfill));
    out.push_str(&format!("Recovery ready:    {}\n", summary.recovery_ready));
    out.push_str(&format!("With issues:       {}\n", summary.with_issues));
    out.push_str(&format!("Added cells:       {}\n", summary.added_cells));
    out.push_str(&format!("Reports written:   {}\n", summary.reports_written));

    if !summary.top_issues.is_empty() {
        out.push_str("\nTop issues:\n");
        let mut issues: Vec<(&String, &u64)> = summary.top_issues.iter().collect();
        issues.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (issue, count) in issues {
            out.push_str(&format!("  {:>6}  {}\n", count, issue));
        }
    }

    if !summary.by_profile_id.is_empty() {
        out.push_str("\nBy profile:\n");
        for (profile_id, bucket) in &summary.by_profile_id {
            out.push_str(&format!(
                "  {}  reports={} with_issues={}\n",
                profile_id, bucket.count, bucket.issues_count
            ));
        }
    }

    out
}
