//! Canonical metrics registry
//!
//! Versioned catalog of dimensions, units and metrics. The registry is
//! parsed from a JSON document (the embedded default or a file), validated
//! once at startup, and handed out as a read-only `Arc` for the life of
//! the process. A registry version bump means constructing a new instance,
//! never mutating the old one.
//!
//! Derived metrics carry a closed, tagged [`DerivedFormula`] instead of an
//! expression string: adding a new formula means adding a variant.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Embedded registry document, the default catalog for all binaries
const EMBEDDED_REGISTRY: &str = include_str!("../registry/canonical_metrics_v1.json");

/// A physical/logical quantity kind sharing one canonical unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    /// Unit every metric of this dimension is stored in
    pub canonical_unit: String,
    /// Unit code -> linear factor relative to the canonical unit
    pub units: BTreeMap<String, f64>,
}

impl Dimension {
    /// Unit codes convertible within this dimension
    pub fn allowed_units(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn factor(&self, unit: &str) -> Option<f64> {
        self.units.get(unit).copied()
    }
}

/// Display labels for a metric
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Labels {
    #[serde(default)]
    pub en: String,
    #[serde(default)]
    pub ru: String,
}

/// Fixed set of supported derived-metric formulas
///
/// Each variant is a data-described operation over canonical sibling keys,
/// matched exhaustively at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DerivedFormula {
    /// `source / divisor`, e.g. minutes_played = duration_s / 60
    Divide { source: String, divisor: f64 },
    /// `source * factor`, e.g. max_speed_kmh = max_speed_ms * 3.6
    Multiply { source: String, factor: f64 },
    /// `numerator / denominator` over two sibling keys
    Ratio { numerator: String, denominator: String },
    /// `value / (duration / 60)` where duration is in seconds
    PerMinute { value: String, duration: String },
}

impl DerivedFormula {
    /// Canonical keys this formula reads from the row
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Self::Divide { source, .. } | Self::Multiply { source, .. } => vec![source],
            Self::Ratio {
                numerator,
                denominator,
            } => vec![numerator, denominator],
            Self::PerMinute { value, duration } => vec![value, duration],
        }
    }

    /// Evaluate against sibling values; `None` when a dependency is
    /// absent or a denominator is zero
    pub fn evaluate(&self, lookup: impl Fn(&str) -> Option<f64>) -> Option<f64> {
        match self {
            Self::Divide { source, divisor } => Some(lookup(source)? / divisor),
            Self::Multiply { source, factor } => Some(lookup(source)? * factor),
            Self::Ratio {
                numerator,
                denominator,
            } => {
                let denom = lookup(denominator)?;
                if denom == 0.0 {
                    return None;
                }
                Some(lookup(numerator)? / denom)
            }
            Self::PerMinute { value, duration } => {
                let minutes = lookup(duration)? / 60.0;
                if minutes == 0.0 {
                    return None;
                }
                Some(lookup(value)? / minutes)
            }
        }
    }
}

/// A named, typed measurement stored in its dimension's canonical unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMetric {
    /// Globally unique canonical key, e.g. `total_distance_m`
    pub key: String,
    pub dimension: String,
    /// Storage unit; must equal the dimension's canonical unit
    pub unit: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub labels: Labels,
    /// Present iff the metric is derived from sibling keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<DerivedFormula>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plausible_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plausible_max: Option<f64>,
}

impl CanonicalMetric {
    pub fn is_derived(&self) -> bool {
        self.formula.is_some()
    }

    pub fn is_identity(&self) -> bool {
        self.dimension == "identity"
    }
}

/// The full validated catalog: dimensions, metrics, version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRegistry {
    version: String,
    dimensions: BTreeMap<String, Dimension>,
    metrics: Vec<CanonicalMetric>,
    #[serde(skip)]
    by_key: HashMap<String, usize>,
}

impl CanonicalRegistry {
    /// Load and validate the embedded registry document
    pub fn load_embedded() -> Result<Self> {
        Self::from_json_str(EMBEDDED_REGISTRY)
    }

    /// Parse and validate a registry document; any violation is fatal
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut registry: Self = serde_json::from_str(json)
            .map_err(|e| Error::Registry(format!("failed to parse registry document: {}", e)))?;
        registry.validate()?;
        registry.by_key = registry
            .metrics
            .iter()
            .enumerate()
            .map(|(i, m)| (m.key.clone(), i))
            .collect();
        tracing::info!(
            version = %registry.version,
            dimensions = registry.dimensions.len(),
            metrics = registry.metrics.len(),
            "Canonical registry loaded"
        );
        Ok(registry)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metric(&self, key: &str) -> Option<&CanonicalMetric> {
        self.by_key.get(key).map(|&i| &self.metrics[i])
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(name)
    }

    /// Units a metric may legally be displayed/declared in
    pub fn allowed_units(&self, metric_key: &str) -> Option<Vec<&str>> {
        let metric = self.metric(metric_key)?;
        let dim = self.dimension(&metric.dimension)?;
        Some(dim.allowed_units().collect())
    }

    pub fn metrics(&self) -> &[CanonicalMetric] {
        &self.metrics
    }

    pub fn metric_keys(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|m| m.key.as_str())
    }

    pub fn derived_metrics(&self) -> impl Iterator<Item = &CanonicalMetric> {
        self.metrics.iter().filter(|m| m.is_derived())
    }

    pub fn dimensions(&self) -> &BTreeMap<String, Dimension> {
        &self.dimensions
    }

    /// Dimension name -> canonical unit, recorded on every canonical block
    pub fn canonical_units(&self) -> BTreeMap<String, String> {
        self.dimensions
            .iter()
            .map(|(name, dim)| (name.clone(), dim.canonical_unit.clone()))
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::Registry("registry version is empty".into()));
        }

        for (name, dim) in &self.dimensions {
            match dim.factor(&dim.canonical_unit) {
                Some(f) if f == 1.0 => {}
                Some(f) => {
                    return Err(Error::Registry(format!(
                        "dimension '{}': canonical unit '{}' must have factor 1.0, got {}",
                        name, dim.canonical_unit, f
                    )));
                }
                None => {
                    return Err(Error::Registry(format!(
                        "dimension '{}': canonical unit '{}' missing from unit table",
                        name, dim.canonical_unit
                    )));
                }
            }
            for (code, factor) in &dim.units {
                if !factor.is_finite() || *factor <= 0.0 {
                    return Err(Error::Registry(format!(
                        "dimension '{}': unit '{}' has non-positive factor {}",
                        name, code, factor
                    )));
                }
            }
        }

        let mut seen = HashMap::new();
        for metric in &self.metrics {
            if seen.insert(metric.key.as_str(), ()).is_some() {
                return Err(Error::Registry(format!(
                    "duplicate metric key '{}'",
                    metric.key
                )));
            }

            let dim = self.dimensions.get(&metric.dimension).ok_or_else(|| {
                Error::Registry(format!(
                    "metric '{}': unknown dimension '{}'",
                    metric.key, metric.dimension
                ))
            })?;

            if metric.unit != dim.canonical_unit {
                return Err(Error::Registry(format!(
                    "metric '{}': declared unit '{}' must equal canonical unit '{}' of dimension '{}'",
                    metric.key, metric.unit, dim.canonical_unit, metric.dimension
                )));
            }
        }

        // Formula references are checked after key uniqueness so the error
        // points at the formula, not at a shadowed duplicate.
        let keys: HashMap<&str, ()> = self.metrics.iter().map(|m| (m.key.as_str(), ())).collect();
        for metric in &self.metrics {
            if let Some(formula) = &metric.formula {
                for dep in formula.dependencies() {
                    if !keys.contains_key(dep) {
                        return Err(Error::Registry(format!(
                            "derived metric '{}': formula references unknown key '{}'",
                            metric.key, dep
                        )));
                    }
                    if dep == metric.key {
                        return Err(Error::Registry(format!(
                            "derived metric '{}': formula references itself",
                            metric.key
                        )));
                    }
                }
                match formula {
                    DerivedFormula::Divide { divisor, .. } if *divisor == 0.0 => {
                        return Err(Error::Registry(format!(
                            "derived metric '{}': divisor is zero",
                            metric.key
                        )));
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}
