//! Database access for gpscanon-gi
//!
//! Repositories over the shared schema created by
//! `gpscanon_common::db::init_database_pool`. Multi-field updates run
//! inside a single transaction that rolls back entirely on any failure.

pub mod profiles;
pub mod reports;
