//! Ingestion workflow: normalize -> map-to-canon -> sanitize
//!
//! All stages are pure, synchronous, per-report functions; suspension
//! points exist only at the orchestration boundary (database, HTTP).
//! Row order is preserved end-to-end within one report.

pub mod mapper;
pub mod normalizer;
pub mod pipeline;
pub mod sanitizer;

pub use mapper::map_to_canonical;
pub use normalizer::{normalize, HeaderResolution, NormalizedTable};
pub use pipeline::{IngestOutcome, IngestPipeline, StageError, Step};
pub use sanitizer::{sanitize, SanitizeOutcome, SanitizerConfig};
