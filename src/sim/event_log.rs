use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionClass {
    Timed,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Fire,
    /// Forced disable after the reset threshold elapsed.
    Reset,
}

/// One line of the structured event log ("protocol").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub step: u64,
    pub clock: f64,
    pub transition: String,
    pub class: TransitionClass,
    pub event: EventType,
    pub consumed: u64,
    pub produced: u64,
    /// Running dimension totals after the event.
    pub dimensions: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EventRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn firings_of<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a EventRecord> {
        self.records
            .iter()
            .filter(move |r| r.event == EventType::Fire && r.transition == label)
    }
}
