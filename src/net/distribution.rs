//! 定时迁移的延迟分布。
//!
//! 参数顺序统一为「形状, 尺度, 位置」：例如 `weibull_min(a, b, c)` 表示
//! `c + b · W(a)`，其中 `W(a)` 为形状参数 `a` 的标准 Weibull 变量。采样结果为负或非有限值时报错，
//! 不做任何截断。
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::distr::Uniform;
use rand_distr::{Distribution, Exp, Gamma, LogNormal, Normal, Triangular, Weibull};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DistributionError {
    #[error("unknown distribution family `{0}`")]
    UnknownFamily(String),
    #[error("invalid parameters for {family}: {reason}")]
    InvalidParameters { family: &'static str, reason: String },
    #[error("{family} produced an invalid delay {value}")]
    InvalidSample { family: &'static str, value: f64 },
    #[error("unknown time unit `{0}`")]
    UnknownTimeUnit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn seconds(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3_600.0,
            TimeUnit::Days => 86_400.0,
        }
    }

    /// Converts `value` expressed in `self` into `target` units.
    pub fn convert(self, value: f64, target: TimeUnit) -> f64 {
        value * self.seconds() / target.seconds()
    }
}

impl FromStr for TimeUnit {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Ok(TimeUnit::Seconds),
            "m" | "min" | "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hour" | "hours" => Ok(TimeUnit::Hours),
            "d" | "day" | "days" => Ok(TimeUnit::Days),
            other => Err(DistributionError::UnknownTimeUnit(other.to_string())),
        }
    }
}

/// Family and parameters of a firing delay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Family {
    Deterministic { value: f64 },
    Exponential { scale: f64, loc: f64 },
    Uniform { low: f64, high: f64 },
    Normal { mean: f64, std_dev: f64 },
    LogNormal { shape: f64, scale: f64, loc: f64 },
    Weibull { shape: f64, scale: f64, loc: f64 },
    Gamma { shape: f64, scale: f64, loc: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
}

impl Family {
    pub fn name(&self) -> &'static str {
        match self {
            Family::Deterministic { .. } => "deterministic",
            Family::Exponential { .. } => "expon",
            Family::Uniform { .. } => "uniform",
            Family::Normal { .. } => "norm",
            Family::LogNormal { .. } => "lognorm",
            Family::Weibull { .. } => "weibull_min",
            Family::Gamma { .. } => "gamma",
            Family::Triangular { .. } => "triang",
        }
    }

    /// Builds a family from a name and up to four positional parameters.
    pub fn from_parameters(name: &str, a: f64, b: f64, c: f64, _d: f64) -> Result<Self, DistributionError> {
        let family = match name.to_ascii_lowercase().as_str() {
            "det" | "deterministic" | "constant" => Family::Deterministic { value: a },
            "expon" | "exponential" | "exp" => Family::Exponential { scale: a, loc: b },
            "uniform" => Family::Uniform { low: a, high: b },
            "norm" | "normal" => Family::Normal { mean: a, std_dev: b },
            "lognorm" | "lognormal" => Family::LogNormal { shape: a, scale: b, loc: c },
            "weibull_min" | "weibull" => Family::Weibull { shape: a, scale: b, loc: c },
            "gamma" => Family::Gamma { shape: a, scale: b, loc: c },
            "triang" | "triangular" => Family::Triangular { min: a, mode: b, max: c },
            other => return Err(DistributionError::UnknownFamily(other.to_string())),
        };
        Ok(family)
    }

    fn invalid(&self, reason: impl fmt::Display) -> DistributionError {
        DistributionError::InvalidParameters {
            family: self.name(),
            reason: reason.to_string(),
        }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, DistributionError> {
        let value = match *self {
            Family::Deterministic { value } => value,
            Family::Exponential { scale, loc } => {
                if !(scale > 0.0) {
                    return Err(self.invalid("scale must be positive"));
                }
                loc + Exp::new(1.0 / scale).map_err(|e| self.invalid(e))?.sample(rng)
            }
            Family::Uniform { low, high } => {
                if low == high {
                    low
                } else {
                    Uniform::new(low, high).map_err(|e| self.invalid(e))?.sample(rng)
                }
            }
            Family::Normal { mean, std_dev } => {
                Normal::new(mean, std_dev).map_err(|e| self.invalid(e))?.sample(rng)
            }
            Family::LogNormal { shape, scale, loc } => {
                if !(scale > 0.0) {
                    return Err(self.invalid("scale must be positive"));
                }
                let inner = LogNormal::new(scale.ln(), shape).map_err(|e| self.invalid(e))?;
                loc + inner.sample(rng)
            }
            Family::Weibull { shape, scale, loc } => {
                loc + Weibull::new(scale, shape).map_err(|e| self.invalid(e))?.sample(rng)
            }
            Family::Gamma { shape, scale, loc } => {
                loc + Gamma::new(shape, scale).map_err(|e| self.invalid(e))?.sample(rng)
            }
            Family::Triangular { min, mode, max } => Triangular::new(min, max, mode)
                .map_err(|e| self.invalid(e))?
                .sample(rng),
        };
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayDistribution {
    pub family: Family,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_unit: Option<TimeUnit>,
}

impl DelayDistribution {
    pub fn new(family: Family) -> Self {
        Self {
            family,
            time_unit: None,
        }
    }

    pub fn with_time_unit(mut self, unit: TimeUnit) -> Self {
        self.time_unit = Some(unit);
        self
    }

    pub fn deterministic(value: f64) -> Self {
        Self::new(Family::Deterministic { value })
    }

    pub fn exponential(scale: f64) -> Self {
        Self::new(Family::Exponential { scale, loc: 0.0 })
    }

    pub fn weibull(shape: f64, scale: f64, loc: f64) -> Self {
        Self::new(Family::Weibull { shape, scale, loc })
    }

    pub fn normal(mean: f64, std_dev: f64) -> Self {
        Self::new(Family::Normal { mean, std_dev })
    }

    pub fn lognormal(shape: f64, scale: f64, loc: f64) -> Self {
        Self::new(Family::LogNormal { shape, scale, loc })
    }

    /// Draws one delay, converted into `clock_unit` when both units are known.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        clock_unit: Option<TimeUnit>,
    ) -> Result<f64, DistributionError> {
        let mut value = self.family.draw(rng)?;
        if let (Some(from), Some(to)) = (self.time_unit, clock_unit) {
            value = from.convert(value, to);
        }
        if !value.is_finite() || value < 0.0 {
            return Err(DistributionError::InvalidSample {
                family: self.family.name(),
                value,
            });
        }
        Ok(value)
    }
}

impl fmt::Display for DelayDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.family.name())?;
        if let Some(unit) = self.time_unit {
            write!(f, " [{unit:?}]")?;
        }
        Ok(())
    }
}
