//! 冲突消解：瞬时迁移按权重抽样，定时迁移取最早触发时刻。均为无状态纯函数。
use std::cmp::Ordering;

use itertools::Itertools;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use thiserror::Error;

use crate::net::ids::TransitionId;

#[derive(Debug, Error, PartialEq)]
pub enum ConflictError {
    #[error("no candidates to choose from")]
    Empty,
    #[error("immediate candidates have no positive weight: {0}")]
    InvalidWeights(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ImmediateCandidate<'a> {
    pub id: TransitionId,
    pub label: &'a str,
    /// weight × handicap
    pub weight: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TimedCandidate<'a> {
    pub id: TransitionId,
    pub label: &'a str,
    pub firing_time: f64,
}

/// Draws one immediate candidate with probability proportional to its weight.
/// Candidates are ordered by label before drawing so a given seed always maps
/// to the same transition.
pub fn choose_immediate<R: Rng + ?Sized>(
    candidates: &[ImmediateCandidate<'_>],
    rng: &mut R,
) -> Result<TransitionId, ConflictError> {
    match candidates {
        [] => Err(ConflictError::Empty),
        [only] if only.weight > 0.0 => Ok(only.id),
        _ => {
            let ordered = candidates
                .iter()
                .sorted_by(|a, b| a.label.cmp(b.label))
                .collect::<Vec<_>>();
            let index = WeightedIndex::new(ordered.iter().map(|c| c.weight))
                .map_err(|e| ConflictError::InvalidWeights(e.to_string()))?;
            Ok(ordered[index.sample(rng)].id)
        }
    }
}

/// Earliest firing time wins; equal times are broken by label.
pub fn choose_timed<'a, 'b>(candidates: &'b [TimedCandidate<'a>]) -> Option<&'b TimedCandidate<'a>> {
    candidates.iter().min_by(|a, b| timed_order(a, b))
}

fn timed_order(a: &TimedCandidate<'_>, b: &TimedCandidate<'_>) -> Ordering {
    a.firing_time
        .total_cmp(&b.firing_time)
        .then_with(|| a.label.cmp(b.label))
}
