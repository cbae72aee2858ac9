//! 网络模型：实体注册、标签索引、弧构造与聚合查询。此处不包含任何仿真语义。
use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::guard::NetView;
use crate::net::ids::{ArcId, PlaceId, TokenCounter, TransitionId};
use crate::net::index_vec::IndexVec;
use crate::net::structure::{Arc, ArcKind, Multiplicity, Place, Token, Transition, TransitionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Place,
    Transition,
    Arc,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Place => "place",
            EntityKind::Transition => "transition",
            EntityKind::Arc => "arc",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetError {
    #[error("duplicate {kind} label `{label}`")]
    DuplicateLabel { kind: EntityKind, label: String },
    #[error("{kind} `{key}` not found")]
    NotFound { kind: EntityKind, key: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl NetError {
    fn not_found(kind: EntityKind, key: impl fmt::Display) -> Self {
        NetError::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

/// Explicit model configuration supplied at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetConfig {
    /// Declared dimensions. When non-empty, every dimension referenced by a
    /// place or a dimension change must appear here.
    #[serde(default)]
    pub dimensions: Vec<String>,
}

impl NetConfig {
    pub fn with_dimensions<I, S>(dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dimensions: dimensions.into_iter().map(Into::into).collect(),
        }
    }

    fn check_dimension(&self, dimension: &str, owner: &str) -> Result<(), NetError> {
        if self.dimensions.is_empty() || self.dimensions.iter().any(|d| d == dimension) {
            Ok(())
        } else {
            Err(NetError::InvalidConfiguration(format!(
                "`{owner}` references undeclared dimension `{dimension}`"
            )))
        }
    }
}

/// 运行上下文：仿真时钟与令牌编号计数器，作用域为单个网络实例的一次运行。
#[derive(Debug, Clone, Default)]
pub(crate) struct RunContext {
    pub(crate) clock: f64,
    pub(crate) tokens: TokenCounter,
    pub(crate) started: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    pub isolated_places: Vec<(PlaceId, String)>,
    pub isolated_transitions: Vec<(TransitionId, String)>,
    pub warnings: Vec<String>,
}

impl DiagnosticReport {
    pub fn has_issues(&self) -> bool {
        !self.isolated_places.is_empty()
            || !self.isolated_transitions.is_empty()
            || !self.warnings.is_empty()
    }
}

#[derive(Clone, Default)]
pub struct Net {
    config: NetConfig,
    places: IndexVec<PlaceId, Place>,
    transitions: IndexVec<TransitionId, Transition>,
    arcs: IndexVec<ArcId, Arc>,
    place_labels: IndexMap<String, PlaceId>,
    transition_labels: IndexMap<String, TransitionId>,
    run: RunContext,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("arcs", &self.arcs)
            .field("clock", &self.run.clock)
            .finish()
    }
}

impl Net {
    pub fn new(config: NetConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn add_place(&mut self, mut place: Place) -> Result<PlaceId, NetError> {
        self.ensure_mutable()?;
        if self.place_labels.contains_key(&place.label) {
            return Err(NetError::DuplicateLabel {
                kind: EntityKind::Place,
                label: place.label,
            });
        }
        if let Some(dimension) = place.dimension_name() {
            self.config.check_dimension(dimension, &place.label)?;
        }
        place.seed_tokens(&mut self.run.tokens);
        let label = place.label.clone();
        let id = self.places.push(place);
        self.place_labels.insert(label, id);
        Ok(id)
    }

    pub fn add_transition(&mut self, transition: Transition) -> Result<TransitionId, NetError> {
        self.ensure_mutable()?;
        if self.transition_labels.contains_key(&transition.label) {
            return Err(NetError::DuplicateLabel {
                kind: EntityKind::Transition,
                label: transition.label,
            });
        }
        for change in transition.dimension_changes() {
            self.config
                .check_dimension(&change.dimension, &transition.label)?;
        }
        let label = transition.label.clone();
        let id = self.transitions.push(transition);
        self.transition_labels.insert(label, id);
        Ok(id)
    }

    /// 输入弧: place -> transition
    pub fn add_input_arc(
        &mut self,
        place: PlaceId,
        transition: TransitionId,
        multiplicity: Multiplicity,
    ) -> Result<ArcId, NetError> {
        self.add_arc(place, transition, ArcKind::Input, multiplicity)
    }

    /// 输出弧: transition -> place
    pub fn add_output_arc(
        &mut self,
        transition: TransitionId,
        place: PlaceId,
        multiplicity: Multiplicity,
    ) -> Result<ArcId, NetError> {
        self.add_arc(place, transition, ArcKind::Output, multiplicity)
    }

    /// 抑制弧: place -o transition
    pub fn add_inhibitor_arc(
        &mut self,
        place: PlaceId,
        transition: TransitionId,
        multiplicity: Multiplicity,
    ) -> Result<ArcId, NetError> {
        self.add_arc(place, transition, ArcKind::Inhibitor, multiplicity)
    }

    fn add_arc(
        &mut self,
        place: PlaceId,
        transition: TransitionId,
        kind: ArcKind,
        multiplicity: Multiplicity,
    ) -> Result<ArcId, NetError> {
        self.ensure_mutable()?;
        let place_ref = self.place(place)?;
        let transition_label = &self.transition(transition)?.label;
        if multiplicity == 0 {
            return Err(NetError::InvalidConfiguration(format!(
                "{kind:?} arc between `{}` and `{transition_label}` must have a positive multiplicity",
                place_ref.label
            )));
        }
        if place_ref.is_dimension_holder() {
            return Err(NetError::InvalidOperation(format!(
                "dimension holder `{}` cannot be connected by token arcs",
                place_ref.label
            )));
        }

        let id = self.arcs.push(Arc {
            place,
            transition,
            kind,
            multiplicity,
        });
        let p = &mut self.places[place];
        let t = &mut self.transitions[transition];
        match kind {
            ArcKind::Input => {
                p.input_arcs.push(id);
                t.input_arcs.push(id);
            }
            ArcKind::Output => {
                p.output_arcs.push(id);
                t.output_arcs.push(id);
            }
            ArcKind::Inhibitor => {
                p.inhibitor_arcs.push(id);
                t.inhibitor_arcs.push(id);
            }
        }
        Ok(id)
    }

    pub fn place_id(&self, label: &str) -> Result<PlaceId, NetError> {
        self.place_labels
            .get(label)
            .copied()
            .ok_or_else(|| NetError::not_found(EntityKind::Place, label))
    }

    pub fn transition_id(&self, label: &str) -> Result<TransitionId, NetError> {
        self.transition_labels
            .get(label)
            .copied()
            .ok_or_else(|| NetError::not_found(EntityKind::Transition, label))
    }

    pub fn place(&self, id: PlaceId) -> Result<&Place, NetError> {
        self.places
            .get(id)
            .ok_or_else(|| NetError::not_found(EntityKind::Place, id))
    }

    pub fn transition(&self, id: TransitionId) -> Result<&Transition, NetError> {
        self.transitions
            .get(id)
            .ok_or_else(|| NetError::not_found(EntityKind::Transition, id))
    }

    /// Mutable access for configuration. Rejected once the net has been simulated.
    pub fn transition_mut(&mut self, id: TransitionId) -> Result<&mut Transition, NetError> {
        self.ensure_mutable()?;
        self.transitions
            .get_mut(id)
            .ok_or_else(|| NetError::not_found(EntityKind::Transition, id))
    }

    pub fn place_by_label(&self, label: &str) -> Result<&Place, NetError> {
        self.place(self.place_id(label)?)
    }

    pub fn transition_by_label(&self, label: &str) -> Result<&Transition, NetError> {
        self.transition(self.transition_id(label)?)
    }

    pub fn arc(&self, id: ArcId) -> Result<&Arc, NetError> {
        self.arcs
            .get(id)
            .ok_or_else(|| NetError::not_found(EntityKind::Arc, id))
    }

    pub fn places(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.places.iter_enumerated()
    }

    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.transitions.iter_enumerated()
    }

    pub fn arcs(&self) -> impl Iterator<Item = (ArcId, &Arc)> {
        self.arcs.iter_enumerated()
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn tokens(&self, place: PlaceId) -> Result<Multiplicity, NetError> {
        self.place(place)?.tokens()
    }

    pub fn value(&self, place: PlaceId) -> Result<f64, NetError> {
        self.place(place)?.value()
    }

    /// Sets the initial value of a dimension holder before the run starts.
    pub fn set_value(&mut self, place: PlaceId, value: f64) -> Result<(), NetError> {
        self.ensure_mutable()?;
        self.places
            .get_mut(place)
            .ok_or_else(|| NetError::not_found(EntityKind::Place, place))?
            .set_value(value)
    }

    pub fn clock(&self) -> f64 {
        self.run.clock
    }

    pub fn tokens_issued(&self) -> u64 {
        self.run.tokens.issued()
    }

    pub fn has_run(&self) -> bool {
        self.run.started
    }

    pub fn view(&self) -> NetView<'_> {
        NetView::new(self)
    }

    /// Transitions without input arcs: the only ones that inject tokens from outside.
    pub fn arrival_transitions(&self) -> Vec<TransitionId> {
        self.transitions
            .iter_enumerated()
            .filter(|(_, t)| t.input_arcs.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    /// Sum of current dimension-holder values, per dimension. Every holder of a
    /// dimension receives each credit in full, so two holders of one dimension
    /// contribute the accrual twice here.
    pub fn summarize_dimensions(&self) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();
        for place in self.places.iter() {
            if let (Some(dimension), Ok(value)) = (place.dimension_name(), place.value()) {
                *totals.entry(dimension.to_string()).or_insert(0.0) += value;
            }
        }
        totals
    }

    /// Sum of the cumulative transition tables, per dimension.
    pub fn transition_dimension_totals(&self) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();
        for transition in self.transitions.iter() {
            for (dimension, value) in transition.dimension_table() {
                *totals.entry(dimension.clone()).or_insert(0.0) += value;
            }
        }
        totals
    }

    pub fn validate(&self) -> Result<(), NetError> {
        for arc in self.arcs.iter() {
            self.place(arc.place)?;
            self.transition(arc.transition)?;
        }
        for transition in self.transitions.iter() {
            let label = &transition.label;
            match transition.kind() {
                TransitionKind::Timed { distribution: None } => {
                    return Err(NetError::InvalidConfiguration(format!(
                        "timed transition `{label}` has no delay distribution"
                    )));
                }
                TransitionKind::Immediate { weight } if !(weight.is_finite() && *weight >= 0.0) => {
                    return Err(NetError::InvalidConfiguration(format!(
                        "immediate transition `{label}` has invalid weight {weight}"
                    )));
                }
                _ => {}
            }
            if !(transition.handicap.is_finite() && transition.handicap > 0.0) {
                return Err(NetError::InvalidConfiguration(format!(
                    "transition `{label}` has invalid handicap {}",
                    transition.handicap
                )));
            }
            if transition.capacity == 0 {
                return Err(NetError::InvalidConfiguration(format!(
                    "transition `{label}` has zero capacity"
                )));
            }
            if let Some(threshold) = transition.reset_threshold {
                if !(threshold.is_finite() && threshold > 0.0) {
                    return Err(NetError::InvalidConfiguration(format!(
                        "transition `{label}` has invalid reset threshold {threshold}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// 检测孤立节点以及永远无法被标记的库所。
    pub fn diagnose_connectivity(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport::default();
        for (id, place) in self.places.iter_enumerated() {
            if place.is_dimension_holder() {
                continue;
            }
            let connected = !place.input_arcs.is_empty()
                || !place.output_arcs.is_empty()
                || !place.inhibitor_arcs.is_empty();
            if !connected {
                report.isolated_places.push((id, place.label.clone()));
            } else if place.output_arcs.is_empty() && place.initial_tokens() == 0 {
                report.warnings.push(format!(
                    "place `{}` has no incoming arcs and no initial tokens; it never gets marked",
                    place.label
                ));
            }
        }
        for (id, transition) in self.transitions.iter_enumerated() {
            if transition.input_arcs.is_empty()
                && transition.output_arcs.is_empty()
                && transition.inhibitor_arcs.is_empty()
                && transition.dimension_changes().is_empty()
            {
                report.isolated_transitions.push((id, transition.label.clone()));
            }
        }
        report
    }

    pub fn log_diagnostics(&self) {
        let report = self.diagnose_connectivity();
        if !report.has_issues() {
            log::debug!("connectivity check passed for {} places", self.places.len());
            return;
        }
        for (id, label) in &report.isolated_places {
            log::warn!("isolated place {id:?} `{label}`");
        }
        for (id, label) in &report.isolated_transitions {
            log::warn!("isolated transition {id:?} `{label}`");
        }
        for warning in &report.warnings {
            log::warn!("{warning}");
        }
    }

    fn ensure_mutable(&self) -> Result<(), NetError> {
        if self.run.started {
            Err(NetError::InvalidOperation(
                "the net has already been simulated; build a fresh instance".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    // ---- scheduler-only mutation ----

    pub(crate) fn run_mut(&mut self) -> &mut RunContext {
        &mut self.run
    }

    pub(crate) fn place_at(&self, id: PlaceId) -> &Place {
        &self.places[id]
    }

    pub(crate) fn transition_at(&self, id: TransitionId) -> &Transition {
        &self.transitions[id]
    }

    pub(crate) fn arc_at(&self, id: ArcId) -> Arc {
        self.arcs[id]
    }

    pub(crate) fn place_mut(&mut self, id: PlaceId) -> &mut Place {
        &mut self.places[id]
    }

    pub(crate) fn transition_state_mut(&mut self, id: TransitionId) -> &mut Transition {
        &mut self.transitions[id]
    }

    pub(crate) fn transition_ids(&self) -> impl Iterator<Item = TransitionId> + use<> {
        self.transitions.indices()
    }

    pub(crate) fn places_mut(&mut self) -> impl Iterator<Item = &mut Place> {
        self.places.iter_mut()
    }

    pub(crate) fn issue_token(&mut self) -> Token {
        Token {
            id: self.run.tokens.issue(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::distribution::DelayDistribution;
    use crate::net::structure::ChangeKind;

    fn small_net() -> (Net, PlaceId, TransitionId) {
        let mut net = Net::empty();
        let p = net.add_place(Place::new("p", 1)).unwrap();
        let t = net
            .add_transition(Transition::timed("t", DelayDistribution::deterministic(1.0)))
            .unwrap();
        (net, p, t)
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let (mut net, _, _) = small_net();
        assert!(matches!(
            net.add_place(Place::new("p", 0)),
            Err(NetError::DuplicateLabel { kind: EntityKind::Place, .. })
        ));
        assert!(matches!(
            net.add_transition(Transition::immediate("t", 1.0)),
            Err(NetError::DuplicateLabel { kind: EntityKind::Transition, .. })
        ));
    }

    #[test]
    fn arcs_require_existing_endpoints_and_positive_multiplicity() {
        let (mut net, p, t) = small_net();
        assert!(matches!(
            net.add_input_arc(PlaceId::new(9), t, 1),
            Err(NetError::NotFound { kind: EntityKind::Place, .. })
        ));
        assert!(matches!(
            net.add_output_arc(TransitionId::new(9), p, 1),
            Err(NetError::NotFound { kind: EntityKind::Transition, .. })
        ));
        assert!(matches!(
            net.add_inhibitor_arc(p, t, 0),
            Err(NetError::InvalidConfiguration(_))
        ));
        let arc = net.add_input_arc(p, t, 2).unwrap();
        assert_eq!(net.arc(arc).unwrap().multiplicity, 2);
        assert_eq!(net.place(p).unwrap().input_arcs(), &[arc]);
        assert_eq!(net.transition(t).unwrap().input_arcs(), &[arc]);
    }

    #[test]
    fn lookups_fail_with_not_found() {
        let (net, p, _) = small_net();
        assert_eq!(net.place_id("p").unwrap(), p);
        assert!(matches!(net.place_id("nope"), Err(NetError::NotFound { .. })));
        assert!(matches!(net.transition_id("nope"), Err(NetError::NotFound { .. })));
    }

    #[test]
    fn dimension_holders_cannot_take_arcs() {
        let (mut net, _, t) = small_net();
        let meter = net.add_place(Place::dimension("meter", "Energy", 0.0)).unwrap();
        assert!(matches!(
            net.add_output_arc(t, meter, 1),
            Err(NetError::InvalidOperation(_))
        ));
        assert!(matches!(net.tokens(meter), Err(NetError::InvalidOperation(_))));
    }

    #[test]
    fn arrival_transitions_have_no_inputs() {
        let (mut net, p, t) = small_net();
        let source = net
            .add_transition(Transition::timed("source", DelayDistribution::exponential(1.0)))
            .unwrap();
        net.add_input_arc(p, t, 1).unwrap();
        net.add_output_arc(source, p, 1).unwrap();
        assert_eq!(net.arrival_transitions(), vec![source]);
    }

    #[test]
    fn dimension_summary_sums_holders() {
        let mut net = Net::new(NetConfig::with_dimensions(["Energy", "Waste"]));
        net.add_place(Place::dimension("e1", "Energy", 1.5)).unwrap();
        net.add_place(Place::dimension("e2", "Energy", 2.0)).unwrap();
        net.add_place(Place::dimension("w", "Waste", 0.25)).unwrap();
        let summary = net.summarize_dimensions();
        assert_eq!(summary["Energy"], 3.5);
        assert_eq!(summary["Waste"], 0.25);

        assert!(matches!(
            net.add_place(Place::dimension("x", "Water", 0.0)),
            Err(NetError::InvalidConfiguration(_))
        ));
        let t = Transition::immediate("t", 1.0).with_dimension_change("CO2", ChangeKind::Fixed, 1.0);
        assert!(matches!(net.add_transition(t), Err(NetError::InvalidConfiguration(_))));
    }

    #[test]
    fn validate_requires_distribution_on_timed() {
        let mut net = Net::empty();
        net.add_transition(Transition::new("bare", "T").unwrap()).unwrap();
        assert!(matches!(net.validate(), Err(NetError::InvalidConfiguration(_))));
    }

    #[test]
    fn validate_rejects_zero_reset_threshold() {
        let mut net = Net::empty();
        net.add_transition(
            Transition::timed("t", DelayDistribution::deterministic(1.0)).with_reset_threshold(0.0),
        )
        .unwrap();
        assert!(matches!(net.validate(), Err(NetError::InvalidConfiguration(_))));
    }

    #[test]
    fn diagnostics_flag_isolated_nodes() {
        let (mut net, p, t) = small_net();
        net.add_place(Place::new("lonely", 0)).unwrap();
        net.add_input_arc(p, t, 1).unwrap();
        let report = net.diagnose_connectivity();
        assert_eq!(report.isolated_places.len(), 1);
        assert!(report.isolated_transitions.is_empty());
        assert!(report.has_issues());
    }
}
