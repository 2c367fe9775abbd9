//! Canonical mapper
//!
//! Produces canonical rows from normalized records: resolves each visible
//! snapshot column against the registry, converts cell values into
//! canonical units, then evaluates registry derived metrics from their
//! typed formulas. Unknown keys pass raw values through, a missing derived
//! dependency yields null - nothing per-row ever aborts the mapping.

use std::collections::{BTreeMap, HashMap};

use gpscanon_common::{
    registry::CanonicalMetric, units, CanonicalRegistry, DataQualityWarning, WarningCode,
};
use tracing::debug;

use crate::models::report::{CanonicalBlock, CanonicalRow, Cell};
use crate::models::snapshot::ProfileSnapshot;

/// Raw fields the athlete name may arrive under when no identity column is
/// mapped; checked in order
const NAME_FALLBACK_FIELDS: &[&str] = &["athlete_name", "name", "Name", "Player", "Игрок"];

/// Athlete-name canonical key
const ATHLETE_NAME_KEY: &str = "athlete_name";

/// A `%`-declared ratio cell at or below this is already a fraction;
/// converting it again would halve it twice
const RATIO_ALREADY_FRACTION_MAX: f64 = 1.1;

/// Warning list cap carried on a canonical block
const MAX_WARNINGS: usize = 100;

/// Tolerant numeric parse: comma decimal separators, embedded spaces
fn parse_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) => n.as_f64(),
        Cell::String(s) => {
            let cleaned: String = s.trim().replace(',', ".").split_whitespace().collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse().ok().filter(|n: &f64| n.is_finite())
        }
        _ => None,
    }
}

/// Parse `HH:MM` / `HH:MM:SS` into seconds
fn parse_clock(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let parts: Vec<&str> = trimmed.split(':').collect();
    if !(parts.len() == 2 || parts.len() == 3) {
        return None;
    }
    if parts[0].is_empty() || parts[0].len() > 2 || parts[1].len() != 2 {
        return None;
    }
    if parts.len() == 3 && parts[2].len() != 2 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = if parts.len() == 3 {
        parts[2].parse().ok()?
    } else {
        0.0
    };
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Aggregates identical warnings into one counted entry
#[derive(Default)]
struct WarningSink {
    entries: BTreeMap<(WarningCode, String), (u32, String, Option<serde_json::Value>)>,
}

impl WarningSink {
    fn push(
        &mut self,
        code: WarningCode,
        key: impl Into<String>,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) {
        let entry = self
            .entries
            .entry((code, key.into()))
            .or_insert_with(|| (0, message.into(), details));
        entry.0 += 1;
    }

    fn into_warnings(self) -> Vec<DataQualityWarning> {
        self.entries
            .into_iter()
            .take(MAX_WARNINGS)
            .map(|((code, _), (count, message, details))| DataQualityWarning {
                code,
                count,
                message,
                details,
            })
            .collect()
    }
}

/// Convert one cell into the metric's canonical unit
fn convert_cell(
    cell: &Cell,
    metric: &CanonicalMetric,
    source_unit: Option<&str>,
    registry: &CanonicalRegistry,
    warnings: &mut WarningSink,
) -> Option<f64> {
    // Time-dimension cells may arrive as clock strings; those are seconds
    // regardless of the column's declared unit
    if matches!(metric.dimension.as_str(), "time" | "time_min") {
        if let Cell::String(s) = cell {
            if let Some(seconds) = parse_clock(s) {
                return units::convert_in(registry, &metric.dimension, seconds, "s", &metric.unit)
                    .ok();
            }
        }
    }

    let num = parse_number(cell)?;

    // Ratio double-conversion guard: a `%`-declared value already in 0..=1.1
    // is taken as a fraction, not divided again
    if metric.dimension == "ratio" {
        if source_unit == Some("%") && num > RATIO_ALREADY_FRACTION_MAX {
            return units::convert_in(registry, "ratio", num, "%", &metric.unit).ok();
        }
        return Some(num);
    }

    match source_unit {
        Some(unit) if unit != metric.unit => {
            match units::convert_in(registry, &metric.dimension, num, unit, &metric.unit) {
                Ok(converted) => Some(converted),
                Err(err) => {
                    warnings.push(
                        WarningCode::NoConversion,
                        format!("{}:{}", metric.key, unit),
                        format!(
                            "cannot convert '{}' from '{}' to '{}': {}; value passed through",
                            metric.key, unit, metric.unit, err
                        ),
                        None,
                    );
                    Some(num)
                }
            }
        }
        _ => Some(num),
    }
}

fn check_plausibility(value: f64, metric: &CanonicalMetric, warnings: &mut WarningSink) {
    if let Some(min) = metric.plausible_min {
        if value < min {
            warnings.push(
                WarningCode::BelowPlausibleMin,
                metric.key.clone(),
                format!("'{}' below plausible minimum {}", metric.key, min),
                None,
            );
        }
    }
    if let Some(max) = metric.plausible_max {
        if value > max {
            warnings.push(
                WarningCode::AbovePlausibleMax,
                metric.key.clone(),
                format!("'{}' above plausible maximum {}", metric.key, max),
                None,
            );
        }
    }
}

fn json_number(value: f64) -> Cell {
    serde_json::Number::from_f64(value)
        .map(Cell::Number)
        .unwrap_or(Cell::Null)
}

/// Map normalized rows into canonical rows
pub fn map_to_canonical(
    rows: &[HashMap<String, Cell>],
    snapshot: &ProfileSnapshot,
    registry: &CanonicalRegistry,
) -> CanonicalBlock {
    let mut warnings = WarningSink::default();
    let mut canon_rows: Vec<CanonicalRow> = Vec::with_capacity(rows.len());

    let visible: Vec<_> = snapshot.visible_columns().collect();
    let requested_keys: Vec<&str> = visible.iter().map(|c| c.canonical_key.as_str()).collect();

    // Validate display-unit overrides once per column; an override outside
    // the metric's dimension falls back to the canonical unit downstream
    for column in &visible {
        if let (Some(metric), Some(_)) = (
            registry.metric(&column.canonical_key),
            column.display_unit.as_deref(),
        ) {
            let (_, warning) =
                units::resolve_display_unit(registry, metric, column.display_unit.as_deref());
            if let Some(warning) = warning {
                warnings.push(
                    warning.code,
                    column.canonical_key.clone(),
                    warning.message,
                    warning.details,
                );
            }
        }
    }

    for row in rows {
        let mut out = CanonicalRow::new();

        for column in &visible {
            let Some(cell) = row.get(&column.source_header) else {
                continue;
            };

            let Some(metric) = registry.metric(&column.canonical_key) else {
                // Unknown in the current registry version: pass through
                // untouched so the data survives a registry that moved on
                warnings.push(
                    WarningCode::UnknownCanonKey,
                    column.canonical_key.clone(),
                    format!(
                        "canonical key '{}' unknown in registry version {}; value passed through",
                        column.canonical_key,
                        registry.version()
                    ),
                    Some(serde_json::json!({ "canonical_key": column.canonical_key })),
                );
                if !cell.is_null() {
                    out.insert(column.canonical_key.clone(), cell.clone());
                }
                continue;
            };

            if metric.is_identity() {
                let text = match cell {
                    Cell::String(s) => s.trim().to_string(),
                    Cell::Number(n) => n.to_string(),
                    _ => String::new(),
                };
                if !text.is_empty() {
                    out.insert(metric.key.clone(), Cell::String(text));
                }
                continue;
            }

            if let Some(value) =
                convert_cell(cell, metric, column.source_unit.as_deref(), registry, &mut warnings)
            {
                check_plausibility(value, metric, &mut warnings);
                out.insert(metric.key.clone(), json_number(value));
            }
        }

        // Athlete name fallback when no identity column is mapped
        if !out.contains_key(ATHLETE_NAME_KEY) {
            for field in NAME_FALLBACK_FIELDS {
                if let Some(name) = row.get(*field).and_then(|c| c.as_str()) {
                    let trimmed = name.trim();
                    if !trimmed.is_empty() {
                        out.insert(ATHLETE_NAME_KEY.to_string(), Cell::String(trimmed.to_string()));
                        break;
                    }
                }
            }
        }

        // Derived metrics from the registry's typed formulas
        for metric in registry.derived_metrics() {
            if out.contains_key(&metric.key) {
                continue;
            }
            let Some(formula) = metric.formula.as_ref() else {
                continue;
            };
            let lookup = |key: &str| out.get(key).and_then(parse_number);
            let all_present = formula
                .dependencies()
                .iter()
                .all(|dep| lookup(dep).is_some());

            if all_present {
                if let Some(value) = formula.evaluate(lookup) {
                    out.insert(metric.key.clone(), json_number(value));
                    continue;
                }
            }
            // Explicitly requested derived keys surface as null instead of
            // silently vanishing
            if requested_keys.contains(&metric.key.as_str()) {
                out.insert(metric.key.clone(), Cell::Null);
                warnings.push(
                    WarningCode::MissingDerivedDependency,
                    metric.key.clone(),
                    format!(
                        "derived metric '{}' is missing a dependency; value set to null",
                        metric.key
                    ),
                    Some(serde_json::json!({
                        "metric": metric.key,
                        "dependencies": formula.dependencies(),
                    })),
                );
            }
        }

        if !out.is_empty() {
            canon_rows.push(out);
        }
    }

    // Output column order: snapshot order first, derived keys appended in
    // registry order when any row produced them
    let mut columns: Vec<String> = requested_keys.iter().map(|k| k.to_string()).collect();
    for metric in registry.derived_metrics() {
        if !columns.iter().any(|c| c == &metric.key)
            && canon_rows.iter().any(|r| r.contains_key(&metric.key))
        {
            columns.push(metric.key.clone());
        }
    }
    if !columns.iter().any(|c| c == ATHLETE_NAME_KEY)
        && canon_rows.iter().any(|r| r.contains_key(ATHLETE_NAME_KEY))
    {
        columns.insert(0, ATHLETE_NAME_KEY.to_string());
    }

    debug!(
        rows = canon_rows.len(),
        columns = columns.len(),
        version = %registry.version(),
        "Canonical mapping complete"
    );

    CanonicalBlock {
        rows: canon_rows,
        columns,
        version: registry.version().to_string(),
        units: registry.canonical_units(),
        warnings: warnings.into_warnings(),
    }
}
