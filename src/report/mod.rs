use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sim::dwell::DwellStats;
use crate::sim::event_log::{EventLog, TransitionClass};
use crate::sim::scheduler::{EventScheduler, RunStats};
use crate::sim::Outcome;

pub mod snapshot;

pub use snapshot::{NetSnapshot, PlaceSnapshot, TransitionSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSummary {
    pub class: TransitionClass,
    pub fire_count: u64,
    pub time_enabled: f64,
    pub disabled_time: f64,
    pub dimension_table: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// `None` when the report was taken before the run terminated.
    pub outcome: Option<Outcome>,
    pub clock: f64,
    pub max_time: f64,
    pub seed: Option<u64>,
    pub stats: RunStats,
    pub tokens_issued: u64,
    pub fire_counts: BTreeMap<String, u64>,
    pub transitions: BTreeMap<String, TransitionSummary>,
    /// 最终标识: 令牌库所 -> 令牌数
    pub marking: BTreeMap<String, u64>,
    /// 运行期间累计的维度变化
    pub dimension_totals: BTreeMap<String, f64>,
    /// 维度持有库所的当前值之和（含初始值）
    pub place_dimensions: BTreeMap<String, f64>,
    pub dwell: BTreeMap<String, DwellStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<EventLog>,
}

impl SimulationReport {
    pub(crate) fn collect(scheduler: &EventScheduler<'_>) -> Self {
        let net = scheduler.net();
        let mut fire_counts = BTreeMap::new();
        let mut transitions = BTreeMap::new();
        for (_, t) in net.transitions() {
            let clock = t.clock();
            fire_counts.insert(t.label.clone(), clock.fire_count);
            transitions.insert(
                t.label.clone(),
                TransitionSummary {
                    class: if t.is_immediate() {
                        TransitionClass::Immediate
                    } else {
                        TransitionClass::Timed
                    },
                    fire_count: clock.fire_count,
                    time_enabled: clock.time_enabled,
                    disabled_time: clock.disabled_time,
                    dimension_table: t.dimension_table().clone(),
                },
            );
        }
        let marking = net
            .places()
            .filter_map(|(_, p)| p.tokens().ok().map(|n| (p.label.clone(), n)))
            .collect();
        let dwell = scheduler
            .dwell()
            .all_stats()
            .filter_map(|(id, stats)| net.place(id).ok().map(|p| (p.label.clone(), *stats)))
            .collect();
        let options = scheduler.options();

        Self {
            outcome: scheduler.outcome(),
            clock: net.clock(),
            max_time: options.max_time,
            seed: options.seed,
            stats: scheduler.stats(),
            tokens_issued: net.tokens_issued(),
            fire_counts,
            transitions,
            marking,
            dimension_totals: scheduler.dimensions().totals().clone(),
            place_dimensions: net.summarize_dimensions(),
            dwell,
            events: scheduler.events().cloned(),
        }
    }

    pub fn total_firings(&self) -> u64 {
        self.fire_counts.values().sum()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulation Report")?;
        match self.outcome {
            Some(outcome) => writeln!(f, "Outcome: {outcome:?}")?,
            None => writeln!(f, "Outcome: running")?,
        }
        writeln!(f, "Clock: {:.4} / {:.4}", self.clock, self.max_time)?;
        writeln!(
            f,
            "Steps: {} ({} timed, {} immediate, {} resets)",
            self.stats.steps, self.stats.timed_firings, self.stats.immediate_firings, self.stats.resets
        )?;
        writeln!(f, "Tokens issued: {}", self.tokens_issued)?;

        writeln!(f, "\nFirings:")?;
        for (label, count) in &self.fire_counts {
            writeln!(f, "  {label}: {count}")?;
        }

        if !self.marking.is_empty() {
            writeln!(f, "\nFinal marking:")?;
            for (label, tokens) in self.marking.iter().filter(|(_, n)| **n > 0) {
                writeln!(f, "  {label}: {tokens}")?;
            }
        }

        if !self.dimension_totals.is_empty() || !self.place_dimensions.is_empty() {
            writeln!(f, "\nDimensions:")?;
            for (dimension, total) in &self.dimension_totals {
                write!(f, "  {dimension}: {total:.4}")?;
                if let Some(held) = self.place_dimensions.get(dimension) {
                    write!(f, " (held {held:.4})")?;
                }
                writeln!(f)?;
            }
        }

        if !self.dwell.is_empty() {
            writeln!(f, "\nDwell times:")?;
            for (label, stats) in &self.dwell {
                writeln!(
                    f,
                    "  {label}: n={} mean={:.4} min={:.4} max={:.4}",
                    stats.count,
                    stats.mean(),
                    stats.min,
                    stats.max
                )?;
            }
        }
        Ok(())
    }
}
