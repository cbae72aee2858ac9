//! 仿真内核：单线程、顺序推进的离散事件仿真。
//!
//! 每一步先计算使能集；若存在使能的瞬时迁移（消失态），按权重选出一个并在当前时刻触发；
//! 否则（实存态）推进时钟到最早的定时迁移触发时刻，期间积分速率型维度变化。
//! 无使能迁移时以 [`Outcome::Deadlock`] 正常结束，下一事件超出时间上限时以
//! [`Outcome::TimeLimit`] 结束。
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::core::{Net, NetError};
use crate::net::distribution::{DistributionError, TimeUnit};
use crate::report::SimulationReport;

pub mod conflict;
pub mod dimension;
pub mod dwell;
pub mod event_log;
pub mod scheduler;

pub use conflict::{ImmediateCandidate, TimedCandidate, choose_immediate, choose_timed};
pub use dimension::DimensionAccumulator;
pub use dwell::{DurationTracker, DwellStats};
pub use event_log::{EventLog, EventRecord, EventType, TransitionClass};
pub use scheduler::{EventScheduler, RunStats};

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Net(#[from] NetError),
    #[error("transition `{transition}`: {source}")]
    InvalidDistributionParameters {
        transition: String,
        source: DistributionError,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("{steps} consecutive immediate firings at clock {clock}; the net contains an immediate cycle")]
    VanishingLoop { clock: f64, steps: usize },
}

/// How a run ended. Both are normal terminal results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// No transition enabled before the time bound.
    Deadlock,
    /// The next event lies beyond the configured maximum time.
    TimeLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Silent,
    Summary,
    Trace,
}

impl Verbosity {
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Verbosity::Silent,
            1 => Verbosity::Summary,
            _ => Verbosity::Trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOptions {
    pub max_time: f64,
    pub verbosity: Verbosity,
    /// Keep a structured event log in the report.
    pub protocol: bool,
    pub seed: Option<u64>,
    pub max_vanishing_steps: usize,
    /// Unit of the simulation clock; delays declared in another unit are converted.
    pub time_unit: Option<TimeUnit>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            max_time: 1_440.0,
            verbosity: Verbosity::Silent,
            protocol: false,
            seed: None,
            max_vanishing_steps: 10_000,
            time_unit: None,
        }
    }
}

impl SimulationOptions {
    pub fn new(max_time: f64) -> Self {
        Self {
            max_time,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_protocol(mut self) -> Self {
        self.protocol = true;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }
}

/// Runs one simulation to completion on `net`. A net instance can be simulated once.
pub fn simulate(net: &mut Net, options: &SimulationOptions) -> Result<SimulationReport, SimError> {
    EventScheduler::new(net, options)?.run()
}

/// Runs `runs` independent replications in parallel. Every replication builds
/// its own net; run `i` is seeded with `seed + i`.
pub fn replicate<F>(
    build: F,
    runs: usize,
    options: &SimulationOptions,
) -> Result<Vec<SimulationReport>, SimError>
where
    F: Fn() -> Result<Net, NetError> + Send + Sync,
{
    let base = options.seed.unwrap_or_else(|| rand::rng().random());
    (0..runs as u64)
        .into_par_iter()
        .map(|i| {
            let mut net = build()?;
            let mut replication = options.clone();
            replication.seed = Some(base.wrapping_add(i));
            simulate(&mut net, &replication)
        })
        .collect()
}
