//! Data-quality warning types
//!
//! Everything discovered per-row during normalization, sanitization and
//! mapping is reported as a counted, typed warning attached to import
//! metadata — never as an error. Structural failures use [`crate::Error`].

use serde::{Deserialize, Serialize};

/// Warning code attached to import metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// Snapshot column's expected header absent from the uploaded file
    MissingHeader,
    /// Empty/placeholder rows dropped by the sanitizer
    ServiceRowsDropped,
    /// Total/average/summary rows dropped by the sanitizer
    SummaryRowsDropped,
    /// Rows dropped because a metric exceeded its dimension's bound
    ExtremeValueRowsDropped,
    /// Rows with a real name but all metrics empty or zero
    EmptyMetricsRowsDropped,
    /// Aggregate count of all rows removed by the sanitizer
    RowsSanitized,
    /// Snapshot column's canonical key is unknown to the active registry
    UnknownCanonKey,
    /// Column display unit is not allowed for the metric's dimension
    InvalidDisplayUnit,
    /// Source unit could not be converted to the canonical unit
    NoConversion,
    /// Value below the metric's plausible minimum
    BelowPlausibleMin,
    /// Value above the metric's plausible maximum
    AbovePlausibleMax,
    /// Requested derived metric is missing a formula dependency
    MissingDerivedDependency,
    /// Player-identity resolution is deferred out of ingestion
    PlayerMappingsIgnored,
}

/// A counted, typed data-quality warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    pub code: WarningCode,
    /// Number of rows/cells this warning applies to
    pub count: u32,
    pub message: String,
    /// Optional machine-readable context (offending metric, header, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl DataQualityWarning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            count: 1,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
