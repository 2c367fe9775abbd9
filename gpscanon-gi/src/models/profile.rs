//! GPS profile model
//!
//! A profile is the user-editable mapping from one vendor's export columns
//! to canonical keys. Mapping entries are a tagged union: `column` entries
//! bind a source header to a canonical key, `formula` entries carry a
//! display-level formula and no canonical key. Each variant holds only the
//! fields it needs and is validated at construction, not at use sites.

use chrono::{DateTime, Utc};
use gpscanon_common::{CanonicalRegistry, Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Column-type mapping entry: one vendor column -> one canonical key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Header of the vendor column this entry reads from
    pub source_header: String,
    /// Registry key the column maps to
    pub canonical_key: String,
    pub display_name: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_visible")]
    pub is_visible: bool,
    /// Unit the vendor exports this column in, when it differs from canonical
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_unit: Option<String>,
    /// Presentation unit override; must be allowed for the metric's dimension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_unit: Option<String>,
    /// Zero-based column position, used as a last-resort header fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_index: Option<usize>,
}

fn default_visible() -> bool {
    true
}

/// Formula-type mapping entry: display-level computed column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaMapping {
    pub display_name: String,
    /// Free-text formula kept for display; derived values are computed from
    /// the registry's typed formulas, never by evaluating this string
    pub formula: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_visible")]
    pub is_visible: bool,
}

/// One entry of a profile's column mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MappingEntry {
    Column(ColumnMapping),
    Formula(FormulaMapping),
}

impl MappingEntry {
    pub fn order(&self) -> i64 {
        match self {
            Self::Column(c) => c.order,
            Self::Formula(f) => f.order,
        }
    }

    pub fn is_visible(&self) -> bool {
        match self {
            Self::Column(c) => c.is_visible,
            Self::Formula(f) => f.is_visible,
        }
    }

    pub fn as_column(&self) -> Option<&ColumnMapping> {
        match self {
            Self::Column(c) => Some(c),
            Self::Formula(_) => None,
        }
    }
}

/// User-editable column-mapping configuration for one vendor export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsProfile {
    pub id: Uuid,
    pub name: String,
    pub gps_system: String,
    pub column_mapping: Vec<MappingEntry>,
    /// Number of reports ingested with this profile; mapping history
    /// becomes append-only once this is >= 1
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GpsProfile {
    pub fn new(name: impl Into<String>, gps_system: impl Into<String>, mapping: Vec<MappingEntry>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            gps_system: gps_system.into(),
            column_mapping: mapping,
            usage_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Column entries in mapping order
    pub fn columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.column_mapping.iter().filter_map(MappingEntry::as_column)
    }
}

/// Validate a column mapping against the active registry
///
/// Column entries need a non-empty source header and a canonical key that
/// exists in the registry at authoring time; canonical keys must be unique
/// among column entries. Formula entries only need a display formula.
pub fn validate_mapping(mapping: &[MappingEntry], registry: &CanonicalRegistry) -> Result<()> {
    let mut seen_keys = std::collections::HashSet::new();
    for entry in mapping {
        match entry {
            MappingEntry::Column(col) => {
                if col.source_header.trim().is_empty() {
                    return Err(Error::InvalidInput(format!(
                        "column mapping for '{}' has an empty source header",
                        col.canonical_key
                    )));
                }
                if col.canonical_key.trim().is_empty() {
                    return Err(Error::InvalidInput(format!(
                        "column mapping for header '{}' has an empty canonical key",
                        col.source_header
                    )));
                }
                if registry.metric(&col.canonical_key).is_none() {
                    return Err(Error::InvalidInput(format!(
                        "canonical key '{}' does not exist in registry version {}",
                        col.canonical_key,
                        registry.version()
                    )));
                }
                if !seen_keys.insert(col.canonical_key.as_str()) {
                    return Err(Error::InvalidInput(format!(
                        "canonical key '{}' is mapped more than once",
                        col.canonical_key
                    )));
                }
            }
            MappingEntry::Formula(formula) => {
                if formula.formula.trim().is_empty() {
                    return Err(Error::InvalidInput(format!(
                        "formula mapping '{}' has an empty formula",
                        formula.display_name
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CanonicalRegistry {
        CanonicalRegistry::load_embedded().unwrap()
    }

    fn column(header: &str, key: &str, order: i64) -> MappingEntry {
        MappingEntry::Column(ColumnMapping {
            source_header: header.to_string(),
            canonical_key: key.to_string(),
            display_name: header.to_string(),
            order,
            is_visible: true,
            source_unit: None,
            display_unit: None,
            source_index: None,
        })
    }

    #[test]
    fn mapping_entry_tagged_serialization() {
        let entry = column("TD", "total_distance_m", 1);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "column");
        assert_eq!(json["source_header"], "TD");

        let formula = MappingEntry::Formula(FormulaMapping {
            display_name: "Doubled".to_string(),
            formula: "distance * 2".to_string(),
            order: 9,
            is_visible: true,
        });
        let json = serde_json::to_value(&formula).unwrap();
        assert_eq!(json["type"], "formula");
        assert!(json.get("canonical_key").is_none());
    }

    #[test]
    fn valid_mapping_passes() {
        let mapping = vec![
            column("Name", "athlete_name", 0),
            column("TD", "total_distance_m", 1),
        ];
        assert!(validate_mapping(&mapping, &registry()).is_ok());
    }

    #[test]
    fn unknown_canonical_key_rejected_at_authoring() {
        let mapping = vec![column("TD", "not_a_metric", 0)];
        let err = validate_mapping(&mapping, &registry()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn duplicate_canonical_key_rejected() {
        let mapping = vec![
            column("TD", "total_distance_m", 0),
            column("Dist", "total_distance_m", 1),
        ];
        let err = validate_mapping(&mapping, &registry()).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn formula_entries_need_no_canonical_key() {
        let mapping = vec![MappingEntry::Formula(FormulaMapping {
            display_name: "Custom".to_string(),
            formula: "a / b".to_string(),
            order: 0,
            is_visible: true,
        })];
        assert!(validate_mapping(&mapping, &registry()).is_ok());
    }
}
