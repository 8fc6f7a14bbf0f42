//! Rate distributions.
//!
//! Pure sampling functions that draw a new birth rate, or a perturbation of
//! an existing one, from a named continuous distribution. Nothing here holds
//! state apart from the immutable empirical sample tables.
//!
//! Every drawn rate is clamped to be non-negative. Log-normal and gamma
//! distributions are parameterised by their mean and variance:
//!
//! - log-normal: `loc = ln(mean² / √(var + mean²))`, `scale = √(ln(1 + var / mean²))`
//! - gamma: `scale = var / mean`, `shape = mean / scale`
//! - double exponential: a fair sign and an `Exp(1 / √(var / 2))` magnitude

use crate::errors::{ConfigError, SimulationError};
use rand::Rng;
use rand_distr::{Distribution, Exp, Gamma, LogNormal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How a perturbation is combined with the rate it perturbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    /// `rate + alteration`
    #[default]
    Additive,
    /// `rate * alteration`
    Multiplicative,
}

impl Combine {
    /// The alteration that leaves a rate unchanged.
    pub fn identity(self) -> f64 {
        match self {
            Combine::Additive => 0.0,
            Combine::Multiplicative => 1.0,
        }
    }

    #[inline]
    pub fn apply(self, rate: f64, alteration: f64) -> f64 {
        match self {
            Combine::Additive => rate + alteration,
            Combine::Multiplicative => rate * alteration,
        }
    }

    /// Undo a previous [`Combine::apply`] with the same alteration.
    #[inline]
    pub fn remove(self, rate: f64, alteration: f64) -> f64 {
        match self {
            Combine::Additive => rate - alteration,
            Combine::Multiplicative => rate / alteration,
        }
    }

    /// Apply every alteration to `base` in order.
    pub fn fold<'a>(self, base: f64, alterations: impl IntoIterator<Item = &'a f64>) -> f64 {
        alterations
            .into_iter()
            .fold(base, |rate, &alt| self.apply(rate, alt))
    }
}

/// Location and scale of the normal distribution underlying a log-normal
/// with the given mean and variance.
pub fn lognormal_params(mean: f64, variance: f64) -> (f64, f64) {
    let mean_sq = mean * mean;
    let loc = (mean_sq / (variance + mean_sq).sqrt()).ln();
    let scale = (1.0 + variance / mean_sq).ln().sqrt();
    (loc, scale)
}

/// Shape and scale of a gamma distribution with the given mean and variance.
pub fn gamma_params(mean: f64, variance: f64) -> (f64, f64) {
    let scale = variance / mean;
    (mean / scale, scale)
}

/// Draw from a log-normal with the given mean and variance.
///
/// The mean must be positive.
pub fn draw_lognormal<R: Rng + ?Sized>(
    mean: f64,
    variance: f64,
    rng: &mut R,
) -> Result<f64, SimulationError> {
    if !(mean > 0.0) {
        return Err(SimulationError::Distribution {
            kind: "log-normal",
            reason: format!("mean {mean} is not positive"),
        });
    }
    if variance == 0.0 {
        return Ok(mean);
    }
    let (loc, scale) = lognormal_params(mean, variance);
    let dist = LogNormal::new(loc, scale).map_err(|e| SimulationError::Distribution {
        kind: "log-normal",
        reason: e.to_string(),
    })?;
    Ok(dist.sample(rng).max(0.0))
}

/// Draw from a gamma distribution with the given mean and variance.
pub fn draw_gamma<R: Rng + ?Sized>(
    mean: f64,
    variance: f64,
    rng: &mut R,
) -> Result<f64, SimulationError> {
    if !(mean > 0.0) {
        return Err(SimulationError::Distribution {
            kind: "gamma",
            reason: format!("mean {mean} is not positive"),
        });
    }
    if variance == 0.0 {
        return Ok(mean);
    }
    let (shape, scale) = gamma_params(mean, variance);
    let dist = Gamma::new(shape, scale).map_err(|e| SimulationError::Distribution {
        kind: "gamma",
        reason: e.to_string(),
    })?;
    Ok(dist.sample(rng).max(0.0))
}

/// Symmetric double-exponential draw centred on zero, not truncated.
fn signed_exponential<R: Rng + ?Sized>(variance: f64, rng: &mut R) -> Result<f64, SimulationError> {
    if variance == 0.0 {
        return Ok(0.0);
    }
    let rate = 1.0 / (variance / 2.0).sqrt();
    let dist = Exp::new(rate).map_err(|e| SimulationError::Distribution {
        kind: "double exponential",
        reason: e.to_string(),
    })?;
    let magnitude = dist.sample(rng);
    Ok(if rng.random_bool(0.5) {
        magnitude
    } else {
        -magnitude
    })
}

/// Draw `mean ± Exp(1/√(var/2))`, truncated at zero.
pub fn draw_double_exponential<R: Rng + ?Sized>(
    mean: f64,
    variance: f64,
    rng: &mut R,
) -> Result<f64, SimulationError> {
    Ok((mean + signed_exponential(variance, rng)?).max(0.0))
}

/// Where an empirical sample table comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmpiricalSource {
    /// A text file with one or more numbers per line (whitespace or comma
    /// separated, `#` starts a comment).
    Path(PathBuf),
    /// Values given inline in the configuration.
    Values(Vec<f64>),
}

impl EmpiricalSource {
    pub fn load(&self) -> Result<EmpiricalTable, ConfigError> {
        match self {
            EmpiricalSource::Path(path) => EmpiricalTable::load(path),
            EmpiricalSource::Values(values) => EmpiricalTable::from_values(values.clone()),
        }
    }
}

/// A user-supplied table of samples for bootstrap draws.
///
/// Tables are immutable once built. Extending one produces a new table, so
/// any type holding the old one keeps seeing exactly what it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalTable {
    samples: Arc<[f64]>,
}

impl EmpiricalTable {
    pub fn from_values(values: Vec<f64>) -> Result<Self, ConfigError> {
        if values.is_empty() {
            return Err(ConfigError::invalid("empirical", "table has no samples"));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(ConfigError::invalid(
                "empirical",
                format!("sample {bad} is not finite"),
            ));
        }
        Ok(Self {
            samples: values.into(),
        })
    }

    /// Read a table from a text file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut values = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let content = line.split('#').next().unwrap_or("");
            for token in content
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
            {
                let value = token.parse::<f64>().map_err(|_| ConfigError::TableValue {
                    path: path.to_path_buf(),
                    line: i + 1,
                    token: token.to_string(),
                })?;
                values.push(value);
            }
        }
        Self::from_values(values)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.samples
    }

    /// Pick one sample uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.samples[rng.random_range(0..self.samples.len())]
    }

    /// A new table holding these samples followed by `more`.
    pub fn extended(&self, more: &[f64]) -> Result<Self, ConfigError> {
        let mut values = self.samples.to_vec();
        values.extend_from_slice(more);
        Self::from_values(values)
    }
}

fn default_scale() -> f64 {
    1.0
}

/// A named distribution from which new birth rates are drawn.
///
/// The mean is supplied at draw time (the clone's current rate or its
/// type-level mean); the variant carries the shape parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateDistribution {
    LogNormal {
        variance: f64,
    },
    Gamma {
        variance: f64,
    },
    DoubleExponential {
        variance: f64,
    },
    /// Resample from the table attached to the clone's type, transformed
    /// as `location + scale * sample`.
    Empirical {
        #[serde(default)]
        location: f64,
        #[serde(default = "default_scale")]
        scale: f64,
    },
}

impl RateDistribution {
    pub fn name(&self) -> &'static str {
        match self {
            RateDistribution::LogNormal { .. } => "log_normal",
            RateDistribution::Gamma { .. } => "gamma",
            RateDistribution::DoubleExponential { .. } => "double_exponential",
            RateDistribution::Empirical { .. } => "empirical",
        }
    }

    /// Build a distribution from its name and scalar parameters.
    pub fn from_named(name: &str, params: &BTreeMap<String, f64>) -> Result<Self, ConfigError> {
        let variance = || {
            params
                .get("variance")
                .copied()
                .ok_or_else(|| ConfigError::MissingParameter {
                    strategy: name.to_string(),
                    name: "variance".into(),
                })
        };
        let dist = match name {
            "log_normal" | "lognormal" => RateDistribution::LogNormal {
                variance: variance()?,
            },
            "gamma" => RateDistribution::Gamma {
                variance: variance()?,
            },
            "double_exponential" => RateDistribution::DoubleExponential {
                variance: variance()?,
            },
            "empirical" => RateDistribution::Empirical {
                location: params.get("location").copied().unwrap_or(0.0),
                scale: params.get("scale").copied().unwrap_or(1.0),
            },
            other => return Err(ConfigError::UnknownDistribution(other.to_string())),
        };
        dist.validate()?;
        Ok(dist)
    }

    /// Check the shape parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            RateDistribution::LogNormal { variance }
            | RateDistribution::Gamma { variance }
            | RateDistribution::DoubleExponential { variance } => {
                if !variance.is_finite() || variance < 0.0 {
                    return Err(ConfigError::invalid(
                        format!("{}.variance", self.name()),
                        format!("{variance} must be finite and non-negative"),
                    ));
                }
            }
            RateDistribution::Empirical { location, scale } => {
                if !location.is_finite() || !scale.is_finite() {
                    return Err(ConfigError::invalid(
                        "empirical",
                        "location and scale must be finite",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Check that `mean` is usable as the centre of this distribution.
    pub fn validate_mean(&self, mean: f64, field: &str) -> Result<(), ConfigError> {
        match self {
            RateDistribution::LogNormal { .. } | RateDistribution::Gamma { .. } if mean <= 0.0 => {
                Err(ConfigError::invalid(
                    field,
                    format!("{} requires a positive mean, got {mean}", self.name()),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Check that a table yields valid perturbations under `combine`.
    pub fn validate_table(&self, combine: Combine, table: &EmpiricalTable) -> Result<(), ConfigError> {
        if let RateDistribution::Empirical { location, scale } = *self {
            if combine == Combine::Multiplicative {
                let bad = table
                    .values()
                    .iter()
                    .map(|s| location + scale * s)
                    .find(|f| *f <= 0.0);
                if let Some(factor) = bad {
                    return Err(ConfigError::invalid(
                        "empirical",
                        format!("multiplicative factor {factor} is not positive"),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn needs_table(&self) -> bool {
        matches!(self, RateDistribution::Empirical { .. })
    }

    fn empirical_sample<R: Rng + ?Sized>(
        location: f64,
        scale: f64,
        table: Option<&EmpiricalTable>,
        rng: &mut R,
    ) -> Result<f64, SimulationError> {
        let table = table.ok_or_else(|| SimulationError::Distribution {
            kind: "empirical",
            reason: "no empirical table attached to this type".into(),
        })?;
        Ok(location + scale * table.sample(rng))
    }

    /// Draw a new rate centred on `mean`, clamped at zero.
    pub fn draw_rate<R: Rng + ?Sized>(
        &self,
        mean: f64,
        table: Option<&EmpiricalTable>,
        rng: &mut R,
    ) -> Result<f64, SimulationError> {
        match *self {
            RateDistribution::LogNormal { variance } => draw_lognormal(mean, variance, rng),
            RateDistribution::Gamma { variance } => draw_gamma(mean, variance, rng),
            RateDistribution::DoubleExponential { variance } => {
                draw_double_exponential(mean, variance, rng)
            }
            RateDistribution::Empirical { location, scale } => {
                Ok((mean + Self::empirical_sample(location, scale, table, rng)?).max(0.0))
            }
        }
    }

    /// Draw one perturbation of `current` to be combined with `combine`.
    ///
    /// Additive perturbations are the offset of a fresh draw centred on
    /// `current`. Multiplicative perturbations are strictly positive
    /// factors with centre one.
    pub fn draw_alteration<R: Rng + ?Sized>(
        &self,
        combine: Combine,
        current: f64,
        table: Option<&EmpiricalTable>,
        rng: &mut R,
    ) -> Result<f64, SimulationError> {
        match (combine, *self) {
            (Combine::Additive, RateDistribution::Empirical { location, scale }) => {
                Self::empirical_sample(location, scale, table, rng)
            }
            (Combine::Additive, _) => Ok(self.draw_rate(current, table, rng)? - current),
            (Combine::Multiplicative, RateDistribution::LogNormal { variance }) => {
                Ok(draw_lognormal(1.0, variance, rng)?.max(f64::MIN_POSITIVE))
            }
            (Combine::Multiplicative, RateDistribution::Gamma { variance }) => {
                Ok(draw_gamma(1.0, variance, rng)?.max(f64::MIN_POSITIVE))
            }
            (Combine::Multiplicative, RateDistribution::DoubleExponential { variance }) => {
                Ok(signed_exponential(variance, rng)?.exp())
            }
            (Combine::Multiplicative, RateDistribution::Empirical { location, scale }) => {
                Ok(Self::empirical_sample(location, scale, table, rng)?.max(f64::MIN_POSITIVE))
            }
        }
    }
}
