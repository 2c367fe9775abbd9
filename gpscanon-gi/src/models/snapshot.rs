//! Profile snapshot model
//!
//! An immutable copy of a profile's mapping, frozen at the moment a report
//! is ingested. Historical reports always render and recalculate from the
//! snapshot that existed at ingestion time; a snapshot is never recomputed
//! from the live profile.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::profile::{ColumnMapping, MappingEntry};

/// Provenance of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// True when the snapshot was reconstructed for an orphan report
    #[serde(default)]
    pub recovered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Immutable copy of a profile's columns captured at ingestion time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    /// Owning profile; absent on recovered snapshots
    pub profile_id: Option<Uuid>,
    pub gps_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport: Option<String>,
    /// Every profile entry, ordered ascending by `order` - nothing is
    /// excluded silently
    pub columns: Vec<MappingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_version: Option<String>,
    pub created_at_iso: Option<String>,
    #[serde(default)]
    pub meta: SnapshotMeta,
}

impl ProfileSnapshot {
    /// Column entries in snapshot order
    pub fn column_entries(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter_map(MappingEntry::as_column)
    }

    /// Visible column entries in snapshot order
    pub fn visible_columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.column_entries().filter(|c| c.is_visible)
    }

    /// Canonical keys of visible non-identity columns, the metric set the
    /// sanitizer inspects
    pub fn metric_keys(&self, registry: &gpscanon_common::CanonicalRegistry) -> Vec<String> {
        self.visible_columns()
            .filter(|c| {
                registry
                    .metric(&c.canonical_key)
                    .map(|m| !m.is_identity())
                    .unwrap_or(true)
            })
            .map(|c| c.canonical_key.clone())
            .collect()
    }
}
