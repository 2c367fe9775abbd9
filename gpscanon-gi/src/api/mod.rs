//! HTTP API for gpscanon-gi
//!
//! Thin transport over the core: handlers accept pre-parsed payloads and
//! delegate to the pipeline, guard and repositories. Auth and permission
//! checks live outside this service.

pub mod health;
pub mod profiles;
pub mod reports;

pub use health::health_routes;
pub use profiles::profile_routes;
pub use reports::report_routes;
