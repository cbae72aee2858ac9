//! 迁移守卫：在只读网络视图上求值的谓词。
//!
//! 守卫只能通过句柄读取状态，不持有任何对其它实体的引用。闭包形式
//! `|view: &NetView| ...` 自动实现 [`Guard`]；可序列化的声明式守卫见 [`GuardExpr`]。
use serde::{Deserialize, Serialize};

use crate::net::core::Net;
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::structure::Multiplicity;

pub trait Guard: Send + Sync {
    fn evaluate(&self, view: &NetView<'_>) -> bool;
}

impl<F> Guard for F
where
    F: Fn(&NetView<'_>) -> bool + Send + Sync,
{
    fn evaluate(&self, view: &NetView<'_>) -> bool {
        self(view)
    }
}

/// Read-only window on the net state handed to guards.
#[derive(Clone, Copy)]
pub struct NetView<'a> {
    net: &'a Net,
}

impl<'a> NetView<'a> {
    pub(crate) fn new(net: &'a Net) -> Self {
        Self { net }
    }

    pub fn clock(&self) -> f64 {
        self.net.clock()
    }

    /// Token count of a discrete place; `None` for dimension holders or unknown handles.
    pub fn tokens(&self, place: PlaceId) -> Option<Multiplicity> {
        self.net.tokens(place).ok()
    }

    /// Value of a dimension holder; `None` for token places or unknown handles.
    pub fn value(&self, place: PlaceId) -> Option<f64> {
        self.net.value(place).ok()
    }

    pub fn fire_count(&self, transition: TransitionId) -> Option<u64> {
        self.net.transition(transition).ok().map(|t| t.fire_count())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GuardExpr {
    AtLeast { place: PlaceId, tokens: Multiplicity },
    Below { place: PlaceId, tokens: Multiplicity },
    ValueBelow { place: PlaceId, value: f64 },
    All { of: Vec<GuardExpr> },
    Any { of: Vec<GuardExpr> },
    Not { inner: Box<GuardExpr> },
}

impl Guard for GuardExpr {
    fn evaluate(&self, view: &NetView<'_>) -> bool {
        match self {
            GuardExpr::AtLeast { place, tokens } => {
                view.tokens(*place).is_some_and(|held| held >= *tokens)
            }
            GuardExpr::Below { place, tokens } => {
                view.tokens(*place).is_some_and(|held| held < *tokens)
            }
            GuardExpr::ValueBelow { place, value } => {
                view.value(*place).is_some_and(|held| held < *value)
            }
            GuardExpr::All { of } => of.iter().all(|g| g.evaluate(view)),
            GuardExpr::Any { of } => of.iter().any(|g| g.evaluate(view)),
            GuardExpr::Not { inner } => !inner.evaluate(view),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::Place;

    #[test]
    fn expressions_read_marking_through_handles() {
        let mut net = Net::empty();
        let robot = net.add_place(Place::new("robot", 1)).unwrap();
        let meter = net.add_place(Place::dimension("meter", "Energy", 4.0)).unwrap();
        let view = net.view();

        assert!(GuardExpr::AtLeast { place: robot, tokens: 1 }.evaluate(&view));
        assert!(!GuardExpr::Below { place: robot, tokens: 1 }.evaluate(&view));
        assert!(GuardExpr::ValueBelow { place: meter, value: 5.0 }.evaluate(&view));
        // a dimension holder never satisfies a token condition
        assert!(!GuardExpr::AtLeast { place: meter, tokens: 0 }.evaluate(&view));

        let combined = GuardExpr::All {
            of: vec![
                GuardExpr::AtLeast { place: robot, tokens: 1 },
                GuardExpr::Not {
                    inner: Box::new(GuardExpr::ValueBelow { place: meter, value: 1.0 }),
                },
            ],
        };
        assert!(combined.evaluate(&view));
    }

    #[test]
    fn closures_are_guards() {
        let mut net = Net::empty();
        let robot = net.add_place(Place::new("robot", 0)).unwrap();
        let guard = move |view: &NetView<'_>| view.tokens(robot).unwrap_or(0) >= 1;
        assert!(!guard.evaluate(&net.view()));
    }
}
