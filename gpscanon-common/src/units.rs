//! Unit conversion engine
//!
//! Converts scalars between units of one dimension through the dimension's
//! canonical unit: `canonical = value * factor(from)`, then
//! `result = canonical / factor(to)`. Every factor is linear, including
//! `%` <-> `ratio` (`%` carries factor 0.01 against canonical `ratio`).

use thiserror::Error;

use crate::registry::{CanonicalMetric, CanonicalRegistry};
use crate::warnings::{DataQualityWarning, WarningCode};

/// Conversion failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// Unit code registered in no dimension
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    /// The two units belong to different dimensions
    #[error("dimension mismatch: '{from}' and '{to}' share no dimension")]
    DimensionMismatch { from: String, to: String },
}

/// Convert between two units sharing a dimension
///
/// The dimension is resolved by finding one whose unit table contains both
/// codes; unit codes may legally appear in several dimensions (`s` in both
/// `time` and `time_min`), so the pair determines the table.
pub fn convert(
    registry: &CanonicalRegistry,
    value: f64,
    from: &str,
    to: &str,
) -> Result<f64, ConvertError> {
    if from == to {
        return Ok(value);
    }

    let mut from_known = false;
    let mut to_known = false;
    for dim in registry.dimensions().values() {
        let f = dim.factor(from);
        let t = dim.factor(to);
        from_known |= f.is_some();
        to_known |= t.is_some();
        if let (Some(f), Some(t)) = (f, t) {
            return Ok(value * f / t);
        }
    }

    if !from_known {
        return Err(ConvertError::UnknownUnit(from.to_string()));
    }
    if !to_known {
        return Err(ConvertError::UnknownUnit(to.to_string()));
    }
    Err(ConvertError::DimensionMismatch {
        from: from.to_string(),
        to: to.to_string(),
    })
}

/// Dimension-scoped conversion, used by the mapper where the metric's
/// dimension is already known
pub fn convert_in(
    registry: &CanonicalRegistry,
    dimension: &str,
    value: f64,
    from: &str,
    to: &str,
) -> Result<f64, ConvertError> {
    if from == to {
        return Ok(value);
    }
    let dim = registry
        .dimension(dimension)
        .ok_or_else(|| ConvertError::UnknownUnit(from.to_string()))?;
    let f = dim
        .factor(from)
        .ok_or_else(|| ConvertError::UnknownUnit(from.to_string()))?;
    let t = dim
        .factor(to)
        .ok_or_else(|| ConvertError::UnknownUnit(to.to_string()))?;
    Ok(value * f / t)
}

/// Convert a value into its dimension's canonical unit
pub fn to_canonical(
    registry: &CanonicalRegistry,
    dimension: &str,
    value: f64,
    from: &str,
) -> Result<f64, ConvertError> {
    let dim = registry
        .dimension(dimension)
        .ok_or_else(|| ConvertError::UnknownUnit(from.to_string()))?;
    convert_in(registry, dimension, value, from, &dim.canonical_unit)
}

/// Resolve the unit a column should be displayed in
///
/// An explicit display unit wins when it is a member of the metric's
/// dimension; otherwise the canonical unit is substituted and an
/// `INVALID_DISPLAY_UNIT` warning is returned.
pub fn resolve_display_unit(
    registry: &CanonicalRegistry,
    metric: &CanonicalMetric,
    display_unit: Option<&str>,
) -> (String, Option<DataQualityWarning>) {
    let canonical = metric.unit.clone();
    let Some(requested) = display_unit else {
        return (canonical, None);
    };
    let allowed = registry
        .dimension(&metric.dimension)
        .map(|dim| dim.factor(requested).is_some())
        .unwrap_or(false);
    if allowed {
        (requested.to_string(), None)
    } else {
        let warning = DataQualityWarning::new(
            WarningCode::InvalidDisplayUnit,
            format!(
                "display unit '{}' is not allowed for metric '{}'; using '{}'",
                requested, metric.key, canonical
            ),
        )
        .with_details(serde_json::json!({
            "metric": metric.key,
            "requested": requested,
            "substituted": canonical,
        }));
        (canonical, Some(warning))
    }
}
