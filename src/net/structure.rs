//! 随机 Petri 网静态结构元素：库所、迁移、弧与令牌。
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc as Shared;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::net::core::NetError;
use crate::net::distribution::DelayDistribution;
use crate::net::guard::Guard;
use crate::net::ids::{ArcId, PlaceId, TokenCounter, TokenId, TransitionId};

pub type Multiplicity = u64;

pub(crate) type ArcList = SmallVec<[ArcId; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaceContent {
    Tokens(VecDeque<Token>),
    Dimension { dimension: String, value: f64 },
}

#[derive(Debug, Clone)]
pub struct Place {
    pub label: String,
    content: PlaceContent,
    initial_tokens: Multiplicity,
    pub dwell_tracked: bool,
    /// Input arcs leaving this place (place -> transition).
    pub(crate) input_arcs: ArcList,
    /// Output arcs depositing into this place (transition -> place).
    pub(crate) output_arcs: ArcList,
    pub(crate) inhibitor_arcs: ArcList,
}

impl Place {
    /// A discrete token holder with `tokens` initial tokens.
    pub fn new(label: impl Into<String>, tokens: Multiplicity) -> Self {
        Self {
            label: label.into(),
            content: PlaceContent::Tokens(VecDeque::new()),
            initial_tokens: tokens,
            dwell_tracked: false,
            input_arcs: ArcList::new(),
            output_arcs: ArcList::new(),
            inhibitor_arcs: ArcList::new(),
        }
    }

    /// A continuous holder for one dimension, starting at `initial`.
    pub fn dimension(label: impl Into<String>, dimension: impl Into<String>, initial: f64) -> Self {
        Self {
            content: PlaceContent::Dimension {
                dimension: dimension.into(),
                value: initial,
            },
            ..Self::new(label, 0)
        }
    }

    pub fn with_dwell_tracking(mut self) -> Self {
        self.dwell_tracked = true;
        self
    }

    pub fn is_dimension_holder(&self) -> bool {
        matches!(self.content, PlaceContent::Dimension { .. })
    }

    pub fn dimension_name(&self) -> Option<&str> {
        match &self.content {
            PlaceContent::Dimension { dimension, .. } => Some(dimension),
            PlaceContent::Tokens(_) => None,
        }
    }

    pub fn content(&self) -> &PlaceContent {
        &self.content
    }

    pub fn initial_tokens(&self) -> Multiplicity {
        self.initial_tokens
    }

    pub fn tokens(&self) -> Result<Multiplicity, NetError> {
        match &self.content {
            PlaceContent::Tokens(tokens) => Ok(tokens.len() as Multiplicity),
            PlaceContent::Dimension { .. } => Err(NetError::InvalidOperation(format!(
                "place `{}` holds a dimension value, not tokens",
                self.label
            ))),
        }
    }

    pub fn token_ids(&self) -> impl Iterator<Item = TokenId> + '_ {
        let tokens = match &self.content {
            PlaceContent::Tokens(tokens) => Some(tokens.iter().map(|t| t.id)),
            PlaceContent::Dimension { .. } => None,
        };
        tokens.into_iter().flatten()
    }

    pub fn value(&self) -> Result<f64, NetError> {
        match &self.content {
            PlaceContent::Dimension { value, .. } => Ok(*value),
            PlaceContent::Tokens(_) => Err(self.not_a_holder()),
        }
    }

    pub fn set_value(&mut self, new_value: f64) -> Result<(), NetError> {
        match &mut self.content {
            PlaceContent::Dimension { value, .. } => {
                *value = new_value;
                Ok(())
            }
            PlaceContent::Tokens(_) => Err(self.not_a_holder()),
        }
    }

    pub fn input_arcs(&self) -> &[ArcId] {
        &self.input_arcs
    }

    pub fn output_arcs(&self) -> &[ArcId] {
        &self.output_arcs
    }

    pub fn inhibitor_arcs(&self) -> &[ArcId] {
        &self.inhibitor_arcs
    }

    fn not_a_holder(&self) -> NetError {
        NetError::InvalidOperation(format!("place `{}` is not a dimension holder", self.label))
    }

    /// Token count for enabling checks; dimension holders never carry arcs, so they read as empty.
    pub(crate) fn marking(&self) -> Multiplicity {
        match &self.content {
            PlaceContent::Tokens(tokens) => tokens.len() as Multiplicity,
            PlaceContent::Dimension { .. } => 0,
        }
    }

    pub(crate) fn seed_tokens(&mut self, counter: &mut TokenCounter) {
        if let PlaceContent::Tokens(tokens) = &mut self.content {
            tokens.clear();
            for _ in 0..self.initial_tokens {
                tokens.push_back(Token { id: counter.issue() });
            }
        }
    }

    pub(crate) fn take_token(&mut self) -> Option<Token> {
        match &mut self.content {
            PlaceContent::Tokens(tokens) => tokens.pop_front(),
            PlaceContent::Dimension { .. } => None,
        }
    }

    pub(crate) fn put_token(&mut self, token: Token) {
        if let PlaceContent::Tokens(tokens) = &mut self.content {
            tokens.push_back(token);
        }
    }

    pub(crate) fn add_value(&mut self, delta: f64) {
        if let PlaceContent::Dimension { value, .. } = &mut self.content {
            *value += delta;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransitionKind {
    Timed { distribution: Option<DelayDistribution> },
    Immediate { weight: f64 },
}

impl TransitionKind {
    pub fn is_immediate(&self) -> bool {
        matches!(self, TransitionKind::Immediate { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            TransitionKind::Timed { .. } => "T",
            TransitionKind::Immediate { .. } => "I",
        }
    }
}

impl FromStr for TransitionKind {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "T" | "t" | "timed" | "Timed" => Ok(TransitionKind::Timed { distribution: None }),
            "I" | "i" | "immediate" | "Immediate" => Ok(TransitionKind::Immediate { weight: 1.0 }),
            other => Err(NetError::InvalidConfiguration(format!(
                "`{other}` is not a valid transition kind"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPolicy {
    /// Draw a fresh delay on every enabling.
    #[default]
    Resample,
    /// Keep the remaining delay across disable / re-enable cycles.
    Age,
}

impl FromStr for MemoryPolicy {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enable" | "resample" => Ok(MemoryPolicy::Resample),
            "age" => Ok(MemoryPolicy::Age),
            other => Err(NetError::InvalidConfiguration(format!(
                "unknown memory policy `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Rate,
    Fixed,
}

impl FromStr for ChangeKind {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rate" => Ok(ChangeKind::Rate),
            "fixed" => Ok(ChangeKind::Fixed),
            other => Err(NetError::InvalidConfiguration(format!(
                "unknown dimension change kind `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionChange {
    pub dimension: String,
    pub kind: ChangeKind,
    pub magnitude: f64,
}

/// Run-time bookkeeping of a transition. Only the scheduler writes these fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionClock {
    pub enabled: bool,
    pub enabled_at: f64,
    pub disabled_at: Option<f64>,
    pub disabled_time: f64,
    pub firing_delay: f64,
    pub firing_time: Option<f64>,
    pub remaining: Option<f64>,
    pub time_enabled: f64,
    pub enabled_since_reset: f64,
    pub last_reset: f64,
    pub join_arrivals: u32,
    pub fire_count: u64,
}

#[derive(Clone)]
pub struct Transition {
    pub label: String,
    kind: TransitionKind,
    pub capacity: u32,
    guard: Option<Shared<dyn Guard>>,
    pub handicap: f64,
    pub memory_policy: MemoryPolicy,
    pub reset_threshold: Option<f64>,
    pub join: u32,
    pub fork: u32,
    pub arrival: bool,
    pub exit: bool,
    dimension_changes: Vec<DimensionChange>,
    pub(crate) dimension_table: BTreeMap<String, f64>,
    pub(crate) clock: TransitionClock,
    pub(crate) input_arcs: ArcList,
    pub(crate) output_arcs: ArcList,
    pub(crate) inhibitor_arcs: ArcList,
}

impl Transition {
    pub fn with_kind(label: impl Into<String>, kind: TransitionKind) -> Self {
        Self {
            label: label.into(),
            kind,
            capacity: 1,
            guard: None,
            handicap: 1.0,
            memory_policy: MemoryPolicy::default(),
            reset_threshold: None,
            join: 0,
            fork: 0,
            arrival: false,
            exit: false,
            dimension_changes: Vec::new(),
            dimension_table: BTreeMap::new(),
            clock: TransitionClock::default(),
            input_arcs: ArcList::new(),
            output_arcs: ArcList::new(),
            inhibitor_arcs: ArcList::new(),
        }
    }

    /// Builds a transition from a kind code: `"T"` (timed) or `"I"` (immediate).
    pub fn new(label: impl Into<String>, kind: &str) -> Result<Self, NetError> {
        Ok(Self::with_kind(label, kind.parse()?))
    }

    pub fn timed(label: impl Into<String>, distribution: DelayDistribution) -> Self {
        Self::with_kind(
            label,
            TransitionKind::Timed {
                distribution: Some(distribution),
            },
        )
    }

    pub fn immediate(label: impl Into<String>, weight: f64) -> Self {
        Self::with_kind(label, TransitionKind::Immediate { weight })
    }

    pub fn kind(&self) -> &TransitionKind {
        &self.kind
    }

    pub fn is_immediate(&self) -> bool {
        self.kind.is_immediate()
    }

    pub fn distribution(&self) -> Option<&DelayDistribution> {
        match &self.kind {
            TransitionKind::Timed { distribution } => distribution.as_ref(),
            TransitionKind::Immediate { .. } => None,
        }
    }

    pub fn weight(&self) -> Option<f64> {
        match self.kind {
            TransitionKind::Immediate { weight } => Some(weight),
            TransitionKind::Timed { .. } => None,
        }
    }

    pub fn set_distribution(&mut self, value: DelayDistribution) -> Result<(), NetError> {
        match &mut self.kind {
            TransitionKind::Timed { distribution } => {
                *distribution = Some(value);
                Ok(())
            }
            TransitionKind::Immediate { .. } => Err(NetError::InvalidConfiguration(format!(
                "cannot set a distribution on immediate transition `{}`",
                self.label
            ))),
        }
    }

    pub fn set_weight(&mut self, value: f64) -> Result<(), NetError> {
        match &mut self.kind {
            TransitionKind::Immediate { weight } => {
                *weight = value;
                Ok(())
            }
            TransitionKind::Timed { .. } => Err(NetError::InvalidConfiguration(format!(
                "cannot set a weight on timed transition `{}`",
                self.label
            ))),
        }
    }

    pub fn set_guard<G: Guard + 'static>(&mut self, guard: G) {
        self.guard = Some(Shared::new(guard));
    }

    pub fn guard(&self) -> Option<&dyn Guard> {
        self.guard.as_deref()
    }

    pub fn with_guard<G: Guard + 'static>(mut self, guard: G) -> Self {
        self.set_guard(guard);
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_handicap(mut self, handicap: f64) -> Self {
        self.handicap = handicap;
        self
    }

    pub fn with_memory_policy(mut self, policy: MemoryPolicy) -> Self {
        self.memory_policy = policy;
        self
    }

    pub fn with_reset_threshold(mut self, threshold: f64) -> Self {
        self.reset_threshold = Some(threshold);
        self
    }

    pub fn with_join(mut self, join: u32) -> Self {
        self.join = join;
        self
    }

    pub fn with_fork(mut self, fork: u32) -> Self {
        self.fork = fork;
        self
    }

    pub fn with_dimension_change(mut self, dimension: &str, kind: ChangeKind, magnitude: f64) -> Self {
        self.add_dimension_change(dimension, kind, magnitude);
        self
    }

    pub fn add_dimension_change(&mut self, dimension: &str, kind: ChangeKind, magnitude: f64) {
        self.dimension_changes.push(DimensionChange {
            dimension: dimension.to_string(),
            kind,
            magnitude,
        });
        self.dimension_table.entry(dimension.to_string()).or_insert(0.0);
    }

    pub fn dimension_changes(&self) -> &[DimensionChange] {
        &self.dimension_changes
    }

    /// Cumulative per-dimension totals accrued by this transition during the run.
    pub fn dimension_table(&self) -> &BTreeMap<String, f64> {
        &self.dimension_table
    }

    pub fn clock(&self) -> &TransitionClock {
        &self.clock
    }

    pub fn fire_count(&self) -> u64 {
        self.clock.fire_count
    }

    pub fn input_arcs(&self) -> &[ArcId] {
        &self.input_arcs
    }

    pub fn output_arcs(&self) -> &[ArcId] {
        &self.output_arcs
    }

    pub fn inhibitor_arcs(&self) -> &[ArcId] {
        &self.inhibitor_arcs
    }

    /// Weight used in immediate races.
    pub(crate) fn effective_weight(&self) -> f64 {
        self.weight().unwrap_or(0.0) * self.handicap
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("capacity", &self.capacity)
            .field("guarded", &self.guard.is_some())
            .field("join", &self.join)
            .field("fork", &self.fork)
            .field("fire_count", &self.clock.fire_count)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcKind {
    /// place -> transition, consumes tokens.
    Input,
    /// transition -> place, produces tokens.
    Output,
    /// place -> transition, blocks while the place holds at least `multiplicity` tokens.
    Inhibitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Arc {
    pub place: PlaceId,
    pub transition: TransitionId,
    pub kind: ArcKind,
    pub multiplicity: Multiplicity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_holder_rejects_token_access() {
        let place = Place::dimension("meter", "Energy", 2.5);
        assert!(matches!(place.tokens(), Err(NetError::InvalidOperation(_))));
        assert_eq!(place.value().unwrap(), 2.5);

        let mut discrete = Place::new("p0", 3);
        assert!(matches!(discrete.value(), Err(NetError::InvalidOperation(_))));
        assert!(discrete.set_value(1.0).is_err());
    }

    #[test]
    fn kind_specific_configuration_is_enforced() {
        let mut immediate = Transition::immediate("choose", 0.5);
        assert!(matches!(
            immediate.set_distribution(DelayDistribution::deterministic(1.0)),
            Err(NetError::InvalidConfiguration(_))
        ));
        immediate.set_weight(2.0).unwrap();
        assert_eq!(immediate.weight(), Some(2.0));

        let mut timed = Transition::new("work", "T").unwrap();
        assert!(timed.distribution().is_none());
        assert!(timed.set_weight(1.0).is_err());
        timed
            .set_distribution(DelayDistribution::exponential(2.0))
            .unwrap();
        assert!(timed.distribution().is_some());

        assert!(matches!(
            Transition::new("bad", "X"),
            Err(NetError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn dimension_change_initialises_table() {
        let t = Transition::immediate("t", 1.0)
            .with_dimension_change("Energy", ChangeKind::Rate, 0.5)
            .with_dimension_change("Energy", ChangeKind::Fixed, 1.0);
        assert_eq!(t.dimension_changes().len(), 2);
        assert_eq!(t.dimension_table().get("Energy"), Some(&0.0));
    }

    #[test]
    fn seeded_tokens_are_fifo() {
        let mut counter = TokenCounter::new();
        let mut place = Place::new("p", 2);
        place.seed_tokens(&mut counter);
        assert_eq!(place.tokens().unwrap(), 2);
        assert_eq!(place.take_token().map(|t| t.id), Some(TokenId(0)));
        assert_eq!(place.token_ids().collect::<Vec<_>>(), vec![TokenId(1)]);
    }
}
