//! Profile write guard
//!
//! Once a profile has been used by at least one report, its mapping history
//! is append-only: the `(canonical_key, source_header)` pairs already in
//! use and the `gps_system` may not change, or historical reports would be
//! reinterpreted under a mapping that never produced them. Violations are
//! hard conflicts, not warnings; the caller is told to create a new profile
//! version instead of mutating history.

use std::collections::HashMap;

use gpscanon_common::{Error, Result};
use tracing::warn;

use crate::models::profile::{GpsProfile, MappingEntry};

/// Check a pending profile write against the guard rules
///
/// Enforced whenever `usage_count >= 1`; unused profiles may change freely.
/// New `(canonical_key, source_header)` pairs may always be added.
pub fn check_profile_update(
    existing: &GpsProfile,
    new_mapping: &[MappingEntry],
    new_gps_system: &str,
) -> Result<()> {
    if existing.usage_count < 1 {
        return Ok(());
    }

    if new_gps_system != existing.gps_system {
        warn!(
            profile_id = %existing.id,
            old = %existing.gps_system,
            new = %new_gps_system,
            "Profile guard rejected gps_system change"
        );
        return Err(Error::Conflict(format!(
            "PROFILE_GUARD: profile '{}' is used by {} report(s); gps_system cannot change from '{}' to '{}'. Create a new profile version instead.",
            existing.id, existing.usage_count, existing.gps_system, new_gps_system
        )));
    }

    let new_pairs: HashMap<&str, &str> = new_mapping
        .iter()
        .filter_map(MappingEntry::as_column)
        .map(|c| (c.canonical_key.as_str(), c.source_header.as_str()))
        .collect();

    for column in existing.columns() {
        match new_pairs.get(column.canonical_key.as_str()) {
            None => {
                warn!(
                    profile_id = %existing.id,
                    canonical_key = %column.canonical_key,
                    "Profile guard rejected mapping-pair removal"
                );
                return Err(Error::Conflict(format!(
                    "PROFILE_GUARD: mapping pair ({}, {}) is in use by {} report(s) and cannot be removed. Create a new profile version instead.",
                    column.canonical_key, column.source_header, existing.usage_count
                )));
            }
            Some(&header) if header != column.source_header => {
                warn!(
                    profile_id = %existing.id,
                    canonical_key = %column.canonical_key,
                    old_header = %column.source_header,
                    new_header = %header,
                    "Profile guard rejected mapping-pair repoint"
                );
                return Err(Error::Conflict(format!(
                    "PROFILE_GUARD: canonical key '{}' is mapped to column '{}' in existing reports and cannot be repointed to '{}'. Create a new profile version instead.",
                    column.canonical_key, column.source_header, header
                )));
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Check a pending profile delete; used profiles cannot be removed
pub fn check_profile_delete(existing: &GpsProfile) -> Result<()> {
    if existing.usage_count >= 1 {
        return Err(Error::Conflict(format!(
            "PROFILE_GUARD: profile '{}' is used by {} report(s) and cannot be deleted",
            existing.id, existing.usage_count
        )));
    }
    Ok(())
}
