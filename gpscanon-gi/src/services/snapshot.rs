//! Profile snapshot builder and orphan-report recovery
//!
//! `build_snapshot` freezes a live profile into the immutable record stored
//! with each report. `recover_snapshot` reconstructs a best-effort snapshot
//! for orphan reports whose owning profile was deleted before a snapshot
//! was written; the result is tagged `meta.recovered` so downstream
//! consumers know it is inferred, not authoritative.

use gpscanon_common::CanonicalRegistry;
use tracing::debug;

use crate::models::{
    profile::{ColumnMapping, GpsProfile, MappingEntry},
    report::{ParsedTable, ProcessedData},
    snapshot::{ProfileSnapshot, SnapshotMeta},
};

/// Placeholder source header on recovered snapshot columns
const RECOVERED_HEADER: &str = "(recovered)";

/// Row fields that identify or index a row rather than measure anything
const IDENTITY_FIELDS: &[&str] = &["athlete_id", "player_id", "row_index"];

/// Freeze a profile's mapping into an immutable snapshot
///
/// Copies every entry, column and formula alike, ordered ascending by
/// `order` - a snapshot excludes nothing silently.
pub fn build_snapshot(profile: &GpsProfile) -> ProfileSnapshot {
    let mut columns = profile.column_mapping.clone();
    columns.sort_by_key(MappingEntry::order);

    ProfileSnapshot {
        profile_id: Some(profile.id),
        gps_system: Some(profile.gps_system.clone()),
        sport: None,
        columns,
        profile_version: None,
        created_at_iso: Some(profile.created_at.to_rfc3339()),
        meta: SnapshotMeta::default(),
    }
}

/// Reconstruct a snapshot for an orphan report
///
/// Strategies are tried in order; the first yielding at least one column
/// wins:
/// (a) canonical block column list,
/// (b) keys of the first canonical row minus identity/index fields,
/// (c) the profile columns embedded in processed data,
/// (d) the raw header row.
///
/// Returns `None` when no strategy yields a column.
pub fn recover_snapshot(
    processed: Option<&ProcessedData>,
    raw: &ParsedTable,
    registry: &CanonicalRegistry,
) -> Option<(ProfileSnapshot, &'static str)> {
    let (keys, strategy) = extract_canonical_columns(processed, raw)?;
    debug!(strategy, columns = keys.len(), "Recovered snapshot columns");

    let columns = keys
        .into_iter()
        .enumerate()
        .map(|(index, canonical_key)| {
            let display_name = registry
                .metric(&canonical_key)
                .map(|m| {
                    if m.labels.en.is_empty() {
                        canonical_key.clone()
                    } else {
                        m.labels.en.clone()
                    }
                })
                .unwrap_or_else(|| canonical_key.clone());
            MappingEntry::Column(ColumnMapping {
                source_header: RECOVERED_HEADER.to_string(),
                canonical_key,
                display_name,
                order: index as i64,
                is_visible: true,
                source_unit: None,
                display_unit: None,
                source_index: None,
            })
        })
        .collect();

    let snapshot = ProfileSnapshot {
        profile_id: None,
        gps_system: None,
        sport: None,
        columns,
        profile_version: None,
        created_at_iso: None,
        meta: SnapshotMeta {
            recovered: true,
            reason: Some("PROFILE_NOT_FOUND".to_string()),
        },
    };
    Some((snapshot, strategy))
}

fn extract_canonical_columns(
    processed: Option<&ProcessedData>,
    raw: &ParsedTable,
) -> Option<(Vec<String>, &'static str)> {
    // Strategy (a): canonical block column list
    if let Some(processed) = processed {
        let columns = &processed.canonical.columns;
        if !columns.is_empty() {
            return Some((columns.clone(), "canonical.columns"));
        }

        // Strategy (b): keys of the first canonical row minus identity fields
        if let Some(first_row) = processed.canonical.rows.first() {
            let keys: Vec<String> = first_row
                .keys()
                .filter(|k| !IDENTITY_FIELDS.contains(&k.as_str()))
                .cloned()
                .collect();
            if !keys.is_empty() {
                return Some((keys, "canonical.rows[0]"));
            }
        }
    }

    // Strategy (c): profile columns embedded in processed data
    if let Some(profile) = processed.and_then(|p| p.profile.as_ref()) {
        let keys: Vec<String> = profile
            .columns
            .iter()
            .filter(|c| !c.canonical_key.is_empty())
            .map(|c| c.canonical_key.clone())
            .collect();
        if !keys.is_empty() {
            return Some((keys, "profile.columns"));
        }
    }

    // Strategy (d): raw header row
    if !raw.headers.is_empty() {
        return Some((raw.headers.clone(), "raw.headers"));
    }

    None
}
