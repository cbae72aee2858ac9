//! 维度累加器：把迁移上的速率型/固定型维度变化积分进迁移累计表与维度持有库所。
use std::collections::BTreeMap;

use crate::net::core::Net;
use crate::net::ids::TransitionId;
use crate::net::structure::ChangeKind;

#[derive(Debug, Clone, Default)]
pub struct DimensionAccumulator {
    totals: BTreeMap<String, f64>,
}

impl DimensionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Running totals of everything credited during the run.
    pub fn totals(&self) -> &BTreeMap<String, f64> {
        &self.totals
    }

    /// Integrates the rate-kind changes of `transition` over `elapsed` time
    /// units with `instances` concurrently active firings.
    pub fn accrue_rates(&mut self, net: &mut Net, transition: TransitionId, elapsed: f64, instances: u32) {
        if elapsed <= 0.0 || instances == 0 {
            return;
        }
        let credits = Self::changes_of(net, transition, ChangeKind::Rate)
            .into_iter()
            .map(|(dimension, rate)| (dimension, rate * elapsed * f64::from(instances)))
            .collect::<Vec<_>>();
        for (dimension, amount) in credits {
            self.credit(net, transition, &dimension, amount);
        }
    }

    /// Applies the fixed-kind changes of `transition` once, at firing.
    pub fn apply_fixed(&mut self, net: &mut Net, transition: TransitionId) {
        for (dimension, amount) in Self::changes_of(net, transition, ChangeKind::Fixed) {
            self.credit(net, transition, &dimension, amount);
        }
    }

    fn changes_of(net: &Net, transition: TransitionId, kind: ChangeKind) -> Vec<(String, f64)> {
        net.transition(transition)
            .map(|t| {
                t.dimension_changes()
                    .iter()
                    .filter(|change| change.kind == kind)
                    .map(|change| (change.dimension.clone(), change.magnitude))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Credits the transition table, every holder of `dimension` (each one
    /// mirrors the full amount) and the running total once.
    fn credit(&mut self, net: &mut Net, transition: TransitionId, dimension: &str, amount: f64) {
        *net.transition_state_mut(transition)
            .dimension_table
            .entry(dimension.to_string())
            .or_insert(0.0) += amount;
        for place in net.places_mut() {
            if place.dimension_name() == Some(dimension) {
                place.add_value(amount);
            }
        }
        *self.totals.entry(dimension.to_string()).or_insert(0.0) += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::distribution::DelayDistribution;
    use crate::net::structure::{Place, Transition};

    fn metered_net() -> (Net, TransitionId) {
        let mut net = Net::empty();
        net.add_place(Place::dimension("meter", "Energy", 1.0)).unwrap();
        let t = net
            .add_transition(
                Transition::timed("press", DelayDistribution::deterministic(1.0))
                    .with_dimension_change("Energy", ChangeKind::Rate, 2.0)
                    .with_dimension_change("Waste", ChangeKind::Fixed, 0.2),
            )
            .unwrap();
        (net, t)
    }

    #[test]
    fn rates_scale_with_time_and_instances() {
        let (mut net, t) = metered_net();
        let mut acc = DimensionAccumulator::new();
        acc.accrue_rates(&mut net, t, 1.5, 2);
        assert_eq!(acc.totals()["Energy"], 6.0);
        assert_eq!(net.transition(t).unwrap().dimension_table()["Energy"], 6.0);
        assert_eq!(net.summarize_dimensions()["Energy"], 7.0);
        // fixed changes are untouched by time
        assert_eq!(net.transition(t).unwrap().dimension_table()["Waste"], 0.0);

        acc.accrue_rates(&mut net, t, 0.0, 2);
        assert_eq!(acc.totals()["Energy"], 6.0);
    }

    #[test]
    fn every_holder_mirrors_the_full_credit() {
        let (mut net, t) = metered_net();
        net.add_place(Place::dimension("backup meter", "Energy", 0.0)).unwrap();
        let mut acc = DimensionAccumulator::new();
        acc.accrue_rates(&mut net, t, 1.0, 1);
        assert_eq!(acc.totals()["Energy"], 2.0);
        let backup = net.place_id("backup meter").unwrap();
        assert_eq!(net.value(backup).unwrap(), 2.0);
        // 1.0 initial + 2.0 on `meter`, 2.0 on `backup meter`
        assert_eq!(net.summarize_dimensions()["Energy"], 5.0);
        assert_eq!(net.transition_dimension_totals()["Energy"], 2.0);
    }

    #[test]
    fn fixed_changes_apply_once_per_call() {
        let (mut net, t) = metered_net();
        let mut acc = DimensionAccumulator::new();
        acc.apply_fixed(&mut net, t);
        acc.apply_fixed(&mut net, t);
        assert!((acc.totals()["Waste"] - 0.4).abs() < 1e-12);
        assert!(!acc.totals().contains_key("Energy"));
    }
}
