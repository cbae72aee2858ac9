//! 可序列化的网络描述：以标签引用实体，经 [`NetDescription::build`] 转换为 [`Net`]。
use serde::{Deserialize, Serialize};

use crate::net::core::{Net, NetConfig, NetError};
use crate::net::distribution::{DelayDistribution, Family};
use crate::net::guard::GuardExpr;
use crate::net::structure::{ArcKind, ChangeKind, MemoryPolicy, Multiplicity, Place, Transition};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetDescription {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub places: Vec<PlaceSpec>,
    #[serde(default)]
    pub transitions: Vec<TransitionSpec>,
    #[serde(default)]
    pub arcs: Vec<ArcSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSpec {
    pub label: String,
    #[serde(default)]
    pub tokens: Multiplicity,
    /// Makes the place a dimension holder for this dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub track_dwell: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSpec {
    pub family: String,
    #[serde(default)]
    pub a: f64,
    #[serde(default)]
    pub b: f64,
    #[serde(default)]
    pub c: f64,
    #[serde(default)]
    pub d: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSpec {
    pub dimension: String,
    pub kind: String,
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GuardSpec {
    AtLeast { place: String, tokens: Multiplicity },
    Below { place: String, tokens: Multiplicity },
    ValueBelow { place: String, value: f64 },
    All { of: Vec<GuardSpec> },
    Any { of: Vec<GuardSpec> },
    Not { inner: Box<GuardSpec> },
}

impl GuardSpec {
    fn resolve(&self, net: &Net) -> Result<GuardExpr, NetError> {
        let expr = match self {
            GuardSpec::AtLeast { place, tokens } => GuardExpr::AtLeast {
                place: net.place_id(place)?,
                tokens: *tokens,
            },
            GuardSpec::Below { place, tokens } => GuardExpr::Below {
                place: net.place_id(place)?,
                tokens: *tokens,
            },
            GuardSpec::ValueBelow { place, value } => GuardExpr::ValueBelow {
                place: net.place_id(place)?,
                value: *value,
            },
            GuardSpec::All { of } => GuardExpr::All {
                of: of.iter().map(|g| g.resolve(net)).collect::<Result<_, _>>()?,
            },
            GuardSpec::Any { of } => GuardExpr::Any {
                of: of.iter().map(|g| g.resolve(net)).collect::<Result<_, _>>()?,
            },
            GuardSpec::Not { inner } => GuardExpr::Not {
                inner: Box::new(inner.resolve(net)?),
            },
        };
        Ok(expr)
    }
}

fn default_capacity() -> u32 {
    1
}

fn default_handicap() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub label: String,
    /// `"T"` / `"timed"` or `"I"` / `"immediate"`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<DistributionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default = "default_handicap")]
    pub handicap: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_threshold: Option<f64>,
    #[serde(default)]
    pub join: u32,
    #[serde(default)]
    pub fork: u32,
    #[serde(default)]
    pub dimension_changes: Vec<ChangeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardSpec>,
    #[serde(default)]
    pub arrival: bool,
    #[serde(default)]
    pub exit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcSpec {
    pub kind: ArcKind,
    pub place: String,
    pub transition: String,
    #[serde(default = "default_multiplicity")]
    pub multiplicity: Multiplicity,
}

fn default_multiplicity() -> Multiplicity {
    1
}

impl DistributionSpec {
    fn to_distribution(&self) -> Result<DelayDistribution, NetError> {
        let family = Family::from_parameters(&self.family, self.a, self.b, self.c, self.d)
            .map_err(|e| NetError::InvalidConfiguration(e.to_string()))?;
        let mut distribution = DelayDistribution::new(family);
        if let Some(unit) = &self.time_unit {
            let unit = unit
                .parse()
                .map_err(|e: crate::net::distribution::DistributionError| {
                    NetError::InvalidConfiguration(e.to_string())
                })?;
            distribution = distribution.with_time_unit(unit);
        }
        Ok(distribution)
    }
}

impl TransitionSpec {
    fn to_transition(&self) -> Result<Transition, NetError> {
        let mut transition = Transition::new(self.label.clone(), &self.kind)?;
        if let Some(distribution) = &self.distribution {
            transition.set_distribution(distribution.to_distribution()?)?;
        }
        if let Some(weight) = self.weight {
            transition.set_weight(weight)?;
        }
        transition.capacity = self.capacity;
        transition.handicap = self.handicap;
        if let Some(policy) = &self.memory_policy {
            transition.memory_policy = policy.parse::<MemoryPolicy>()?;
        }
        transition.reset_threshold = self.reset_threshold;
        transition.join = self.join;
        transition.fork = self.fork;
        transition.arrival = self.arrival;
        transition.exit = self.exit;
        for change in &self.dimension_changes {
            transition.add_dimension_change(
                &change.dimension,
                change.kind.parse::<ChangeKind>()?,
                change.magnitude,
            );
        }
        Ok(transition)
    }
}

impl NetDescription {
    /// Builds the net. Guards are resolved after all places exist so they may
    /// reference any place by label.
    pub fn build(&self) -> Result<Net, NetError> {
        self.build_with(NetConfig {
            dimensions: self.dimensions.clone(),
        })
    }

    pub fn build_with(&self, config: NetConfig) -> Result<Net, NetError> {
        let mut net = Net::new(config);
        for spec in &self.places {
            let mut place = match &spec.dimension {
                Some(dimension) => Place::dimension(spec.label.clone(), dimension.clone(), spec.value),
                None => Place::new(spec.label.clone(), spec.tokens),
            };
            place.dwell_tracked = spec.track_dwell;
            net.add_place(place)?;
        }
        for spec in &self.transitions {
            net.add_transition(spec.to_transition()?)?;
        }
        for spec in &self.transitions {
            if let Some(guard) = &spec.guard {
                let expr = guard.resolve(&net)?;
                let id = net.transition_id(&spec.label)?;
                net.transition_mut(id)?.set_guard(expr);
            }
        }
        for arc in &self.arcs {
            let place = net.place_id(&arc.place)?;
            let transition = net.transition_id(&arc.transition)?;
            match arc.kind {
                ArcKind::Input => net.add_input_arc(place, transition, arc.multiplicity)?,
                ArcKind::Output => net.add_output_arc(transition, place, arc.multiplicity)?,
                ArcKind::Inhibitor => net.add_inhibitor_arc(place, transition, arc.multiplicity)?,
            };
        }
        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCTION_LINE: &str = r#"{
        "dimensions": ["Energy", "Plastic Waste"],
        "places": [
            {"label": "queue"},
            {"label": "robot", "tokens": 1, "track_dwell": true},
            {"label": "done"},
            {"label": "energy meter", "dimension": "Energy"}
        ],
        "transitions": [
            {"label": "arrive", "kind": "T",
             "distribution": {"family": "weibull_min", "a": 0.966, "b": 0.198, "c": 9.45}},
            {"label": "process", "kind": "T", "fork": 1,
             "distribution": {"family": "norm", "a": 4.9, "b": 0.33, "time_unit": "min"},
             "dimension_changes": [{"dimension": "Energy", "kind": "rate", "magnitude": 2.0}],
             "guard": {"op": "at_least", "place": "robot", "tokens": 1}}
        ],
        "arcs": [
            {"kind": "output", "place": "queue", "transition": "arrive"},
            {"kind": "input", "place": "queue", "transition": "process"},
            {"kind": "input", "place": "robot", "transition": "process"},
            {"kind": "output", "place": "robot", "transition": "process"},
            {"kind": "output", "place": "done", "transition": "process", "multiplicity": 2}
        ]
    }"#;

    #[test]
    fn builds_net_from_json() {
        let description: NetDescription = serde_json::from_str(PRODUCTION_LINE).unwrap();
        let net = description.build().unwrap();
        assert_eq!(net.places_len(), 4);
        assert_eq!(net.transitions_len(), 2);
        let process = net.transition_by_label("process").unwrap();
        assert!(process.guard().is_some());
        assert_eq!(process.input_arcs().len(), 2);
        assert_eq!(net.tokens(net.place_id("robot").unwrap()).unwrap(), 1);
        assert_eq!(net.arrival_transitions(), vec![net.transition_id("arrive").unwrap()]);
        net.validate().unwrap();
    }

    #[test]
    fn unknown_labels_and_kinds_are_rejected() {
        let mut description: NetDescription = serde_json::from_str(PRODUCTION_LINE).unwrap();
        description.arcs[0].place = "nowhere".into();
        assert!(matches!(description.build(), Err(NetError::NotFound { .. })));

        let mut description: NetDescription = serde_json::from_str(PRODUCTION_LINE).unwrap();
        description.transitions[0].kind = "Q".into();
        assert!(matches!(
            description.build(),
            Err(NetError::InvalidConfiguration(_))
        ));

        let mut description: NetDescription = serde_json::from_str(PRODUCTION_LINE).unwrap();
        description.transitions[0].weight = Some(0.5);
        assert!(matches!(
            description.build(),
            Err(NetError::InvalidConfiguration(_))
        ));
    }
}
