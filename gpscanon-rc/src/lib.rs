//! gpscanon-rc library interface
//!
//! Recalculation / backfill engine: re-derives canonical data for
//! historical reports after registry or profile changes, in dry-run or
//! commit mode, with additive merge semantics and diagnostic artifacts.

pub mod artifacts;
pub mod engine;

pub use engine::{BackfillEngine, BackfillOptions, BackfillSummary, ReportResult};
