//! Data models for gpscanon-gi

pub mod profile;
pub mod report;
pub mod snapshot;

pub use profile::{ColumnMapping, FormulaMapping, GpsProfile, MappingEntry};
pub use report::{
    CanonicalBlock, Cell, GpsReport, ImportCounts, ImportMeta, ParsedTable, ProcessedData,
};
pub use snapshot::{ProfileSnapshot, SnapshotMeta};
