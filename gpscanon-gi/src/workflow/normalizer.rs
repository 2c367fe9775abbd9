//! Row normalizer
//!
//! Reconciles raw spreadsheet headers against a snapshot's expected
//! columns. Each snapshot column resolves its source header through a
//! fixed ladder: exact match, case/whitespace-normalized match, positional
//! fallback, then a non-fatal `MISSING_HEADER` warning. Output rows are
//! header-keyed records in input order; unconsumed original headers are
//! carried through untouched so later stages can still see them.

use std::collections::{BTreeMap, HashMap};

use gpscanon_common::{DataQualityWarning, WarningCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::report::{Cell, ParsedTable};
use crate::models::snapshot::ProfileSnapshot;

/// How one snapshot column's header was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum HeaderResolution {
    /// Header text matched exactly
    Exact { index: usize },
    /// Matched after trim/lowercase/whitespace collapse
    Normalized { index: usize },
    /// Fell back to the column's recorded position
    Positional { index: usize },
    /// No match; the field is absent from every output row
    Missing,
}

/// Row/column accounting for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSizes {
    pub input_rows: usize,
    pub header_count: usize,
}

/// Normalizer output
#[derive(Debug, Clone, Default)]
pub struct NormalizedTable {
    /// One header-keyed record per input data row, input order preserved
    pub rows: Vec<HashMap<String, Cell>>,
    /// Winning strategy per snapshot source header
    pub resolutions: BTreeMap<String, HeaderResolution>,
    pub sizes: TableSizes,
    pub warnings: Vec<DataQualityWarning>,
}

/// Collapse a header for fuzzy comparison: trim, lowercase, single spaces
fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reconcile parsed headers with the snapshot's expected columns
pub fn normalize(parsed: &ParsedTable, snapshot: &ProfileSnapshot) -> NormalizedTable {
    let mut warnings = Vec::new();
    let mut resolutions = BTreeMap::new();

    // Index actual headers: exact text and normalized form -> position.
    // First occurrence wins for duplicated headers.
    let mut exact_index: HashMap<&str, usize> = HashMap::new();
    let mut normalized_index: HashMap<String, usize> = HashMap::new();
    for (i, header) in parsed.headers.iter().enumerate() {
        exact_index.entry(header.as_str()).or_insert(i);
        normalized_index.entry(normalize_header(header)).or_insert(i);
    }

    for column in snapshot.column_entries() {
        let expected = column.source_header.as_str();
        let resolution = if let Some(&index) = exact_index.get(expected) {
            HeaderResolution::Exact { index }
        } else if let Some(&index) = normalized_index.get(&normalize_header(expected)) {
            HeaderResolution::Normalized { index }
        } else if let Some(index) = column.source_index.filter(|&i| i < parsed.headers.len()) {
            HeaderResolution::Positional { index }
        } else {
            warnings.push(
                DataQualityWarning::new(
                    WarningCode::MissingHeader,
                    format!(
                        "expected column '{}' (canonical key '{}') not found in uploaded headers",
                        expected, column.canonical_key
                    ),
                )
                .with_details(serde_json::json!({
                    "source_header": expected,
                    "canonical_key": column.canonical_key,
                })),
            );
            HeaderResolution::Missing
        };
        resolutions.insert(expected.to_string(), resolution);
    }

    debug!(
        columns = resolutions.len(),
        missing = warnings.len(),
        rows = parsed.rows.len(),
        "Header resolution complete"
    );

    // Build header-keyed records. Every original header is carried under
    // its own (trimmed) name; resolved snapshot columns additionally land
    // under their expected header so the mapper's lookups are uniform.
    let rows = parsed
        .rows
        .iter()
        .map(|row| {
            let mut record: HashMap<String, Cell> = HashMap::new();
            for (i, header) in parsed.headers.iter().enumerate() {
                if let Some(cell) = row.get(i) {
                    record.insert(header.trim().to_string(), cell.clone());
                }
            }
            for (expected, resolution) in &resolutions {
                let index = match resolution {
                    HeaderResolution::Exact { index }
                    | HeaderResolution::Normalized { index }
                    | HeaderResolution::Positional { index } => *index,
                    HeaderResolution::Missing => continue,
                };
                if let Some(cell) = row.get(index) {
                    record.insert(expected.clone(), cell.clone());
                }
            }
            record
        })
        .collect();

    NormalizedTable {
        rows,
        resolutions,
        sizes: TableSizes {
            input_rows: parsed.rows.len(),
            header_count: parsed.headers.len(),
        },
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::{ColumnMapping, MappingEntry};
    use crate::models::snapshot::SnapshotMeta;
    use serde_json::json;

    fn snapshot_with(columns: Vec<ColumnMapping>) -> ProfileSnapshot {
        ProfileSnapshot {
            profile_id: None,
            gps_system: Some("Test".to_string()),
            sport: None,
            columns: columns.into_iter().map(MappingEntry::Column).collect(),
            profile_version: None,
            created_at_iso: None,
            meta: SnapshotMeta::default(),
        }
    }

    fn column(header: &str, key: &str, source_index: Option<usize>) -> ColumnMapping {
        ColumnMapping {
            source_header: header.to_string(),
            canonical_key: key.to_string(),
            display_name: header.to_string(),
            order: 0,
            is_visible: true,
            source_unit: None,
            display_unit: None,
            source_index,
        }
    }

    #[test]
    fn exact_match_wins() {
        let parsed = ParsedTable {
            headers: vec!["TD".to_string(), "Name".to_string()],
            rows: vec![vec![json!(5000), json!("John")]],
        };
        let snapshot = snapshot_with(vec![column("TD", "total_distance_m", None)]);

        let out = normalize(&parsed, &snapshot);
        assert_eq!(
            out.resolutions["TD"],
            HeaderResolution::Exact { index: 0 }
        );
        assert!(out.warnings.is_empty());
        assert_eq!(out.rows[0]["TD"], json!(5000));
        // Unconsumed headers are carried through
        assert_eq!(out.rows[0]["Name"], json!("John"));
    }

    #[test]
    fn normalized_match_is_second() {
        let parsed = ParsedTable {
            headers: vec!["  total   distance ".to_string()],
            rows: vec![vec![json!("9000")]],
        };
        let snapshot = snapshot_with(vec![column("Total Distance", "total_distance_m", None)]);

        let out = normalize(&parsed, &snapshot);
        assert_eq!(
            out.resolutions["Total Distance"],
            HeaderResolution::Normalized { index: 0 }
        );
        assert_eq!(out.rows[0]["Total Distance"], json!("9000"));
    }

    #[test]
    fn positional_fallback_is_third() {
        let parsed = ParsedTable {
            headers: vec!["A".to_string(), "B".to_string()],
            rows: vec![vec![json!(1), json!(2)]],
        };
        let snapshot = snapshot_with(vec![column("Distance", "total_distance_m", Some(1))]);

        let out = normalize(&parsed, &snapshot);
        assert_eq!(
            out.resolutions["Distance"],
            HeaderResolution::Positional { index: 1 }
        );
        assert_eq!(out.rows[0]["Distance"], json!(2));
    }

    #[test]
    fn missing_header_is_non_fatal() {
        let parsed = ParsedTable {
            headers: vec!["A".to_string()],
            rows: vec![vec![json!(1)], vec![json!(2)]],
        };
        let snapshot = snapshot_with(vec![column("Distance", "total_distance_m", None)]);

        let out = normalize(&parsed, &snapshot);
        assert_eq!(out.resolutions["Distance"], HeaderResolution::Missing);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].code, WarningCode::MissingHeader);
        // Field absent for every row, rows themselves survive
        assert_eq!(out.rows.len(), 2);
        assert!(!out.rows[0].contains_key("Distance"));
    }

    #[test]
    fn row_order_is_preserved() {
        let parsed = ParsedTable {
            headers: vec!["N".to_string()],
            rows: vec![vec![json!("a")], vec![json!("b")], vec![json!("c")]],
        };
        let snapshot = snapshot_with(vec![]);

        let out = normalize(&parsed, &snapshot);
        let order: Vec<&str> = out
            .rows
            .iter()
            .map(|r| r["N"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(out.sizes.input_rows, 3);
        assert_eq!(out.sizes.header_count, 1);
    }
}
