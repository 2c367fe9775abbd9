//! # GPSCanon Common Library
//!
//! Shared code for the GPSCanon crates including:
//! - Canonical metrics registry (dimensions, units, metrics)
//! - Unit conversion engine
//! - Data-quality warning types
//! - Configuration loading
//! - Database pool and schema

pub mod config;
pub mod db;
pub mod error;
pub mod registry;
pub mod units;
pub mod warnings;

pub use error::{Error, Result};
pub use registry::CanonicalRegistry;
pub use warnings::{DataQualityWarning, WarningCode};
