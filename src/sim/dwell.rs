//! 逗留时间跟踪：记录令牌进入被跟踪库所的时刻，离开时返回逗留时长。
use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::net::ids::PlaceId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DwellStats {
    pub count: u64,
    pub total: f64,
    pub min: f64,
    pub max: f64,
}

impl DwellStats {
    fn first(duration: f64) -> Self {
        Self {
            count: 1,
            total: duration,
            min: duration,
            max: duration,
        }
    }

    fn record(&mut self, duration: f64) {
        self.count += 1;
        self.total += duration;
        self.min = self.min.min(duration);
        self.max = self.max.max(duration);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Entries are matched first-in first-out, the same order in which places release tokens.
#[derive(Debug, Clone, Default)]
pub struct DurationTracker {
    open: HashMap<PlaceId, VecDeque<f64>>,
    stats: BTreeMap<PlaceId, DwellStats>,
}

impl DurationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, place: PlaceId, time: f64) {
        self.open.entry(place).or_default().push_back(time);
    }

    /// Elapsed time since the oldest unmatched entry; `0.0` when there is none.
    pub fn exit(&mut self, place: PlaceId, time: f64) -> f64 {
        let Some(entered) = self.open.get_mut(&place).and_then(|q| q.pop_front()) else {
            return 0.0;
        };
        let duration = time - entered;
        self.stats
            .entry(place)
            .and_modify(|s| s.record(duration))
            .or_insert_with(|| DwellStats::first(duration));
        duration
    }

    pub fn open_entries(&self, place: PlaceId) -> usize {
        self.open.get(&place).map_or(0, VecDeque::len)
    }

    pub fn stats(&self, place: PlaceId) -> Option<&DwellStats> {
        self.stats.get(&place)
    }

    pub fn all_stats(&self) -> impl Iterator<Item = (PlaceId, &DwellStats)> {
        self.stats.iter().map(|(p, s)| (*p, s))
    }
}
