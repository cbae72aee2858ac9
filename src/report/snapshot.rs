//! 网络只读快照：标签、拓扑、标识、维度值、累计表与计时器状态，可序列化并导出为 DOT。
use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::net::core::Net;
use crate::net::structure::{ArcKind, MemoryPolicy, Multiplicity, PlaceContent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSnapshot {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Multiplicity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSnapshot {
    pub label: String,
    /// `"T"` or `"I"`
    pub kind: String,
    pub enabled: bool,
    pub memory_policy: MemoryPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firing_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
    pub fire_count: u64,
    pub join_arrivals: u32,
    pub dimension_table: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcSnapshot {
    pub kind: ArcKind,
    pub place: String,
    pub transition: String,
    pub multiplicity: Multiplicity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetSnapshot {
    pub clock: f64,
    pub places: Vec<PlaceSnapshot>,
    pub transitions: Vec<TransitionSnapshot>,
    pub arcs: Vec<ArcSnapshot>,
    /// Cumulative transition tables summed per dimension.
    #[serde(default)]
    pub dimension_totals: BTreeMap<String, f64>,
}

impl Net {
    pub fn snapshot(&self) -> NetSnapshot {
        let places = self
            .places()
            .map(|(_, p)| match p.content() {
                PlaceContent::Tokens(tokens) => PlaceSnapshot {
                    label: p.label.clone(),
                    tokens: Some(tokens.len() as Multiplicity),
                    dimension: None,
                    value: None,
                },
                PlaceContent::Dimension { dimension, value } => PlaceSnapshot {
                    label: p.label.clone(),
                    tokens: None,
                    dimension: Some(dimension.clone()),
                    value: Some(*value),
                },
            })
            .collect();
        let transitions = self
            .transitions()
            .map(|(_, t)| {
                let clock = t.clock();
                TransitionSnapshot {
                    label: t.label.clone(),
                    kind: t.kind().code().to_string(),
                    enabled: clock.enabled,
                    memory_policy: t.memory_policy,
                    firing_time: clock.firing_time,
                    remaining: clock.remaining,
                    fire_count: clock.fire_count,
                    join_arrivals: clock.join_arrivals,
                    dimension_table: t.dimension_table().clone(),
                }
            })
            .collect();
        let arcs = self
            .arcs()
            .filter_map(|(_, arc)| {
                let place = self.place(arc.place).ok()?;
                let transition = self.transition(arc.transition).ok()?;
                Some(ArcSnapshot {
                    kind: arc.kind,
                    place: place.label.clone(),
                    transition: transition.label.clone(),
                    multiplicity: arc.multiplicity,
                })
            })
            .collect();
        NetSnapshot {
            clock: self.clock(),
            places,
            transitions,
            arcs,
            dimension_totals: self.transition_dimension_totals(),
        }
    }
}

impl NetSnapshot {
    /// Graphviz rendering: places as circles, timed transitions as hollow bars,
    /// immediate ones as filled bars, inhibitor arcs with dot heads.
    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(&mut dot, "digraph SPN {{");
        let _ = writeln!(&mut dot, "    rankdir=LR;");
        let _ = writeln!(&mut dot, "    node [fontname=\"Helvetica\", fontsize=10];");
        let _ = writeln!(&mut dot, "    edge [fontname=\"Helvetica\", fontsize=9];");

        let mut summary = format!("Simulation Clock\\nTime: {:.2}", self.clock);
        for (dimension, total) in &self.dimension_totals {
            let _ = write!(&mut summary, "\\n{}: {:.2}", escape_label(dimension), total);
        }
        let _ = writeln!(
            &mut dot,
            "    \"summary\" [shape=note, style=filled, fillcolor=lightgray, label=\"{summary}\"];"
        );

        for place in &self.places {
            let label = match (place.tokens, &place.dimension, place.value) {
                (Some(tokens), _, _) => format!("{}\\n{}", escape_label(&place.label), tokens),
                (None, Some(dimension), Some(value)) => format!(
                    "{}\\n{} = {:.3}",
                    escape_label(&place.label),
                    escape_label(dimension),
                    value
                ),
                _ => escape_label(&place.label),
            };
            let shape = if place.dimension.is_some() {
                "doublecircle"
            } else {
                "circle"
            };
            let _ = writeln!(
                &mut dot,
                "    \"p_{}\" [shape={shape}, label=\"{label}\"];",
                sanitize_name(&place.label)
            );
        }

        for transition in &self.transitions {
            let mut label = escape_label(&transition.label);
            for (dimension, value) in &transition.dimension_table {
                let _ = write!(&mut label, "\\n{}: {:.3}", escape_label(dimension), value);
            }
            let style = if transition.kind == "I" {
                "filled"
            } else {
                "striped"
            };
            let _ = writeln!(
                &mut dot,
                "    \"t_{}\" [shape=box, style={style}, fillcolor=\"black:white\", label=\"{label}\"];",
                sanitize_name(&transition.label)
            );
        }

        for arc in &self.arcs {
            let place = format!("p_{}", sanitize_name(&arc.place));
            let transition = format!("t_{}", sanitize_name(&arc.transition));
            let weight = if arc.multiplicity > 1 {
                format!("label=\"{}\"", arc.multiplicity)
            } else {
                String::new()
            };
            let _ = match arc.kind {
                ArcKind::Input => writeln!(&mut dot, "    \"{place}\" -> \"{transition}\" [{weight}];"),
                ArcKind::Output => writeln!(&mut dot, "    \"{transition}\" -> \"{place}\" [{weight}];"),
                ArcKind::Inhibitor => writeln!(
                    &mut dot,
                    "    \"{place}\" -> \"{transition}\" [arrowhead=odot{}{weight}];",
                    if weight.is_empty() { "" } else { ", " }
                ),
            };
        }

        let _ = writeln!(&mut dot, "}}");
        dot
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_dot())
    }
}

fn escape_label(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
}

fn sanitize_name(name: &str) -> String {
    name.replace(['-', ':', '.', '/', ' ', '"'], "_")
}

#[cfg(test)]
mod tests {
    use crate::net::core::Net;
    use crate::net::distribution::DelayDistribution;
    use crate::net::structure::{ArcKind, ChangeKind, Place, Transition};
    use crate::sim::{SimulationOptions, simulate};

    fn sample_net() -> Net {
        let mut net = Net::empty();
        let buffer = net.add_place(Place::new("buffer in", 2)).unwrap();
        let busy = net.add_place(Place::new("busy", 0)).unwrap();
        net.add_place(Place::dimension("meter", "Energy", 1.25)).unwrap();
        let load = net
            .add_transition(Transition::timed("load", DelayDistribution::deterministic(1.0)))
            .unwrap();
        net.add_input_arc(buffer, load, 2).unwrap();
        net.add_inhibitor_arc(busy, load, 1).unwrap();
        net.add_output_arc(load, busy, 1).unwrap();
        net
    }

    #[test]
    fn snapshot_captures_marking_and_topology() {
        let snapshot = sample_net().snapshot();
        assert_eq!(snapshot.clock, 0.0);
        assert_eq!(snapshot.places[0].tokens, Some(2));
        assert_eq!(snapshot.places[2].value, Some(1.25));
        assert_eq!(snapshot.transitions[0].kind, "T");
        assert!(snapshot.transitions[0].firing_time.is_none());
        assert_eq!(snapshot.arcs.len(), 3);
        assert_eq!(snapshot.arcs[1].kind, ArcKind::Inhibitor);

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: super::NetSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn dot_marks_inhibitors_and_weights() {
        let dot = sample_net().snapshot().to_dot();
        assert!(dot.starts_with("digraph SPN {"));
        assert!(dot.contains("\"p_buffer_in\" -> \"t_load\" [label=\"2\"];"));
        assert!(dot.contains("\"p_busy\" -> \"t_load\" [arrowhead=odot];"));
        assert!(dot.contains("Energy = 1.250"));
        assert!(dot.trim_end().ends_with('}'));
        assert!(dot.contains(
            "\"summary\" [shape=note, style=filled, fillcolor=lightgray, label=\"Simulation Clock\\nTime: 0.00\"];"
        ));
    }

    #[test]
    fn dot_summary_shows_clock_and_transition_totals() {
        let mut net = Net::empty();
        let p = net.add_place(Place::new("p", 1)).unwrap();
        let press = net
            .add_transition(
                Transition::timed("press", DelayDistribution::deterministic(2.0))
                    .with_dimension_change("Energy", ChangeKind::Rate, 1.5)
                    .with_dimension_change("Waste", ChangeKind::Fixed, 0.25),
            )
            .unwrap();
        net.add_input_arc(p, press, 1).unwrap();
        simulate(&mut net, &SimulationOptions::new(10.0).with_seed(1)).unwrap();

        let snapshot = net.snapshot();
        assert_eq!(snapshot.dimension_totals["Energy"], 3.0);
        assert_eq!(snapshot.dimension_totals["Waste"], 0.25);
        let dot = snapshot.to_dot();
        assert!(dot.contains("label=\"Simulation Clock\\nTime: 2.00\\nEnergy: 3.00\\nWaste: 0.25\"]"));
    }
}
