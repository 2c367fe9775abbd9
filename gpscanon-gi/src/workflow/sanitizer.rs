//! Row sanitizer
//!
//! Discards non-athlete rows from canonical data: vendor service/blank
//! rows, total/average summary rows, rows with physiologically impossible
//! values, and rows whose metrics are all empty. Classification is driven
//! by a data table ([`SanitizerConfig`]), not scattered pattern matching,
//! so it stays testable and language-neutral. The sanitizer never fails;
//! every outcome is a counted, typed warning.

use std::collections::BTreeMap;

use gpscanon_common::{CanonicalRegistry, DataQualityWarning, WarningCode};
use once_cell::sync::Lazy;

use crate::models::report::{CanonicalRow, Cell};

/// Keywords marking summary rows, matched case-insensitively as substrings
/// in any text field
const SUMMARY_KEYWORDS: &[&str] = &[
    "total", "sum", "average", "mean", "summary", "report", "итог", "всего", "средн", "сводка",
];

/// Placeholder values a name field may carry on service rows
const NAME_PLACEHOLDERS: &[&str] = &["-", "—", "n/a", "n\\a", "na"];

/// Physiologically implausible upper bound per dimension, in canonical units
static EXTREME_BOUNDS: Lazy<BTreeMap<&'static str, f64>> = Lazy::new(|| {
    BTreeMap::from([
        ("time", 18_000.0),
        ("time_min", 300.0),
        ("distance", 50_000.0),
        ("speed", 13.89),
        ("speed_kmh", 50.0),
        ("tempo", 400.0),
        ("ratio", 1.0),
        ("heart_rate", 240.0),
        ("count", 500.0),
        ("acceleration", 20.0),
        ("load", 2_000.0),
    ])
});

/// Data-driven sanitizer configuration
#[derive(Debug, Clone)]
pub struct SanitizerConfig {
    pub summary_keywords: Vec<String>,
    pub name_placeholders: Vec<String>,
    /// Dimension name -> maximum plausible value in the canonical unit
    pub extreme_bounds: BTreeMap<String, f64>,
    /// Canonical key of the athlete-name field
    pub name_key: String,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            summary_keywords: SUMMARY_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            name_placeholders: NAME_PLACEHOLDERS.iter().map(|s| s.to_string()).collect(),
            extreme_bounds: EXTREME_BOUNDS
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            name_key: "athlete_name".to_string(),
        }
    }
}

/// Sanitizer output: surviving rows plus counted warnings
#[derive(Debug, Clone, Default)]
pub struct SanitizeOutcome {
    pub filtered_rows: Vec<CanonicalRow>,
    pub dropped_count: u32,
    pub warnings: Vec<DataQualityWarning>,
}

/// Why a row was dropped; the first matching rule wins
enum DropReason {
    Service,
    Summary,
    Extreme { metric: String, value: f64 },
    EmptyMetrics,
}

/// Empty, placeholder ("-", "n/a", ...) or zero: a cell carrying no value
fn is_empty_or_zero(cell: &Cell, config: &SanitizerConfig) -> bool {
    match cell {
        Cell::Null => true,
        Cell::String(s) => {
            let trimmed = s.trim().to_lowercase();
            trimmed.is_empty()
                || config.name_placeholders.iter().any(|p| p == &trimmed)
                || trimmed.replace(',', ".").parse::<f64>().map(|n| n == 0.0).unwrap_or(false)
        }
        Cell::Number(n) => n.as_f64().map(|v| v == 0.0).unwrap_or(false),
        _ => false,
    }
}

fn cell_as_f64(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) => n.as_f64(),
        Cell::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn is_placeholder_name(name: &str, config: &SanitizerConfig) -> bool {
    let trimmed = name.trim().to_lowercase();
    trimmed.is_empty() || config.name_placeholders.iter().any(|p| p == &trimmed)
}

fn classify(row: &CanonicalRow, metric_keys: &[String], registry: &CanonicalRegistry, config: &SanitizerConfig) -> Option<DropReason> {
    // Rule 1: service/empty row - placeholder name and nothing else of value
    let name = row
        .get(&config.name_key)
        .and_then(|c| c.as_str())
        .unwrap_or("");
    if is_placeholder_name(name, config) {
        let rest_empty = row
            .iter()
            .filter(|(key, _)| key.as_str() != config.name_key)
            .all(|(_, cell)| is_empty_or_zero(cell, config));
        if rest_empty {
            return Some(DropReason::Service);
        }
    }

    // Rule 2: summary row - keyword in any text field
    for cell in row.values() {
        if let Some(text) = cell.as_str() {
            let lowered = text.to_lowercase();
            if config.summary_keywords.iter().any(|kw| lowered.contains(kw.as_str())) {
                return Some(DropReason::Summary);
            }
        }
    }

    // Rule 3: extreme value - any metric beyond its dimension's bound
    for key in metric_keys {
        let Some(value) = row.get(key).and_then(cell_as_f64) else {
            continue;
        };
        let Some(metric) = registry.metric(key) else {
            continue;
        };
        if let Some(&bound) = config.extreme_bounds.get(&metric.dimension) {
            if value > bound {
                return Some(DropReason::Extreme {
                    metric: key.clone(),
                    value,
                });
            }
        }
    }

    // Rule 4: named row whose metrics are all empty or zero
    if !metric_keys.is_empty()
        && metric_keys
            .iter()
            .all(|key| row.get(key).map(|c| is_empty_or_zero(c, config)).unwrap_or(true))
    {
        return Some(DropReason::EmptyMetrics);
    }

    None
}

/// Drop service, summary, extreme-value and empty-metric rows
pub fn sanitize(
    rows: &[CanonicalRow],
    metric_keys: &[String],
    registry: &CanonicalRegistry,
    config: &SanitizerConfig,
) -> SanitizeOutcome {
    let mut filtered_rows = Vec::with_capacity(rows.len());
    let mut service = 0u32;
    let mut summary = 0u32;
    let mut extreme = 0u32;
    let mut empty_metrics = 0u32;
    let mut extreme_details = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        match classify(row, metric_keys, registry, config) {
            None => filtered_rows.push(row.clone()),
            Some(DropReason::Service) => service += 1,
            Some(DropReason::Summary) => summary += 1,
            Some(DropReason::Extreme { metric, value }) => {
                extreme += 1;
                extreme_details.push(serde_json::json!({
                    "row_index": index,
                    "metric": metric,
                    "value": value,
                }));
            }
            Some(DropReason::EmptyMetrics) => empty_metrics += 1,
        }
    }

    let mut warnings = Vec::new();
    if service > 0 {
        warnings.push(
            DataQualityWarning::new(
                WarningCode::ServiceRowsDropped,
                format!("dropped {} service/empty row(s)", service),
            )
            .with_count(service),
        );
    }
    if summary > 0 {
        warnings.push(
            DataQualityWarning::new(
                WarningCode::SummaryRowsDropped,
                format!("dropped {} summary row(s)", summary),
            )
            .with_count(summary),
        );
    }
    if extreme > 0 {
        let first = &extreme_details[0];
        warnings.push(
            DataQualityWarning::new(
                WarningCode::ExtremeValueRowsDropped,
                format!(
                    "dropped {} row(s) with implausible values, first: {} = {}",
                    extreme, first["metric"], first["value"]
                ),
            )
            .with_count(extreme)
            .with_details(serde_json::Value::Array(extreme_details)),
        );
    }
    if empty_metrics > 0 {
        warnings.push(
            DataQualityWarning::new(
                WarningCode::EmptyMetricsRowsDropped,
                format!("dropped {} row(s) with all metrics empty", empty_metrics),
            )
            .with_count(empty_metrics),
        );
    }

    let dropped_count = service + summary + extreme + empty_metrics;
    if dropped_count > 0 {
        warnings.push(
            DataQualityWarning::new(
                WarningCode::RowsSanitized,
                format!("{} of {} row(s) removed by sanitizer", dropped_count, rows.len()),
            )
            .with_count(dropped_count),
        );
    }

    SanitizeOutcome {
        filtered_rows,
        dropped_count,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> CanonicalRegistry {
        CanonicalRegistry::load_embedded().unwrap()
    }

    fn row(name: &str, distance: Cell) -> CanonicalRow {
        let mut r = CanonicalRow::new();
        r.insert("athlete_name".to_string(), json!(name));
        r.insert("total_distance_m".to_string(), distance);
        r
    }

    #[test]
    fn drops_summary_empty_and_extreme_rows() {
        let rows = vec![
            row("John", json!(1000)),
            row("Итого", json!(9000)),
            row("", json!(0)),
            row("Bob", json!(400000)),
        ];
        let keys = vec!["total_distance_m".to_string()];

        let out = sanitize(&rows, &keys, &registry(), &SanitizerConfig::default());

        assert_eq!(out.filtered_rows.len(), 1);
        assert_eq!(
            out.filtered_rows[0]["athlete_name"],
            json!("John")
        );
        assert_eq!(out.dropped_count, 3);

        let codes: Vec<WarningCode> = out.warnings.iter().map(|w| w.code).collect();
        assert!(codes.contains(&WarningCode::SummaryRowsDropped));
        assert!(codes.contains(&WarningCode::ServiceRowsDropped));
        assert!(codes.contains(&WarningCode::ExtremeValueRowsDropped));
        assert!(codes.contains(&WarningCode::RowsSanitized));
    }

    #[test]
    fn english_and_russian_summary_keywords() {
        for name in ["Total", "Average", "Sum", "Summary", "Итого", "Всего", "Среднее"] {
            let rows = vec![row(name, json!(1000))];
            let out = sanitize(
                &rows,
                &["total_distance_m".to_string()],
                &registry(),
                &SanitizerConfig::default(),
            );
            assert_eq!(out.filtered_rows.len(), 0, "'{}' should be dropped", name);
        }
    }

    #[test]
    fn summary_detected_in_any_text_field() {
        let mut r = row("John", json!(1000));
        r.insert("position".to_string(), json!("total distance note"));
        let out = sanitize(
            &[r],
            &["total_distance_m".to_string()],
            &registry(),
            &SanitizerConfig::default(),
        );
        assert_eq!(out.dropped_count, 1);
        assert_eq!(out.warnings[0].code, WarningCode::SummaryRowsDropped);
    }

    #[test]
    fn placeholder_names_with_data_survive() {
        // Dash name but real metrics: not a service row
        let rows = vec![row("-", json!(4000))];
        let out = sanitize(
            &rows,
            &["total_distance_m".to_string()],
            &registry(),
            &SanitizerConfig::default(),
        );
        assert_eq!(out.filtered_rows.len(), 1);
    }

    #[test]
    fn na_placeholder_rows_are_service_rows() {
        let mut r = CanonicalRow::new();
        r.insert("athlete_name".to_string(), json!("N/A"));
        r.insert("total_distance_m".to_string(), json!("n/a"));
        let out = sanitize(
            &[r],
            &["total_distance_m".to_string()],
            &registry(),
            &SanitizerConfig::default(),
        );
        assert_eq!(out.filtered_rows.len(), 0);
        assert_eq!(out.dropped_count, 1);
        assert_eq!(out.warnings[0].code, WarningCode::ServiceRowsDropped);
    }

    #[test]
    fn extreme_ratio_above_one_is_dropped() {
        let mut r = row("John", json!(1000));
        r.insert("hsr_ratio".to_string(), json!(1.4));
        let keys = vec!["total_distance_m".to_string(), "hsr_ratio".to_string()];
        let out = sanitize(&[r], &keys, &registry(), &SanitizerConfig::default());
        assert_eq!(out.dropped_count, 1);
        let warning = out
            .warnings
            .iter()
            .find(|w| w.code == WarningCode::ExtremeValueRowsDropped)
            .unwrap();
        assert!(warning.message.contains("hsr_ratio"));
    }

    #[test]
    fn zero_metric_rows_with_name_are_empty_metric_drops() {
        let rows = vec![row("John", json!(0))];
        let out = sanitize(
            &rows,
            &["total_distance_m".to_string()],
            &registry(),
            &SanitizerConfig::default(),
        );
        assert_eq!(out.dropped_count, 1);
        assert_eq!(out.warnings[0].code, WarningCode::EmptyMetricsRowsDropped);
    }

    #[test]
    fn clean_rows_produce_no_warnings() {
        let rows = vec![row("John", json!(1000)), row("Jane", json!(2000))];
        let out = sanitize(
            &rows,
            &["total_distance_m".to_string()],
            &registry(),
            &SanitizerConfig::default(),
        );
        assert_eq!(out.filtered_rows.len(), 2);
        assert_eq!(out.dropped_count, 0);
        assert!(out.warnings.is_empty());
    }
}
