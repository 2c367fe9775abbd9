//! GPS report model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gpscanon_common::DataQualityWarning;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::snapshot::ProfileSnapshot;

/// One spreadsheet cell as delivered by the parsing collaborator:
/// a string, a number or null
pub type Cell = serde_json::Value;

/// Pre-parsed upload payload; the core never decodes CSV/XLSX bytes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// One athlete-session record keyed by canonical key
pub type CanonicalRow = BTreeMap<String, Cell>;

/// Canonical result persisted as part of a report's processed data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanonicalBlock {
    pub rows: Vec<CanonicalRow>,
    /// Canonical keys in output order (snapshot order, derived appended)
    pub columns: Vec<String>,
    /// Registry version the block was computed under
    pub version: String,
    /// Dimension name -> canonical unit
    pub units: BTreeMap<String, String>,
    #[serde(default)]
    pub warnings: Vec<DataQualityWarning>,
}

/// Profile column copy embedded in reports written before snapshots
/// existed; kept only so orphan-report recovery can read it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyProfileData {
    #[serde(default)]
    pub columns: Vec<LegacyProfileColumn>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyProfileColumn {
    #[serde(default)]
    pub canonical_key: String,
}

/// Processed payload of one report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedData {
    pub canonical: CanonicalBlock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<LegacyProfileData>,
}

/// Row counts recorded with every import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
    pub input: u32,
    pub filtered: u32,
    pub canonical: u32,
}

/// Import metadata: counted warnings and row accounting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportMeta {
    #[serde(default)]
    pub warnings: Vec<DataQualityWarning>,
    #[serde(default)]
    pub counts: ImportCounts,
}

/// One uploaded file's result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsReport {
    pub id: Uuid,
    pub name: String,
    pub profile_id: Uuid,
    pub gps_system: String,
    pub raw_data: ParsedTable,
    /// Frozen mapping, the sole source of truth for this report
    pub profile_snapshot: Option<ProfileSnapshot>,
    pub processed_data: Option<ProcessedData>,
    pub import_meta: ImportMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GpsReport {
    pub fn new(name: impl Into<String>, profile_id: Uuid, gps_system: impl Into<String>, raw_data: ParsedTable) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            profile_id,
            gps_system: gps_system.into(),
            raw_data,
            profile_snapshot: None,
            processed_data: None,
            import_meta: ImportMeta::default(),
            created_at: now,
            updated_at: now,
        }
    }
}
