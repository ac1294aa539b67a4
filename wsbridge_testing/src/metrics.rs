//! Helpers for asserting on recorded metrics.
//!
//! Taking a snapshot resets the debugging recorder's counters, so tests take
//! one [`CounterSnapshot`] and query it for every assertion.

use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};

/// Create a debugging recorder and the snapshotter reading it.
#[must_use]
pub fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Counter values captured from a single snapshot.
#[derive(Debug)]
pub struct CounterSnapshot {
    counters: Vec<(CompositeKey, u64)>,
}

impl CounterSnapshot {
    /// Snapshot every counter recorded so far.
    #[must_use]
    pub fn take(snapshotter: &Snapshotter) -> Self {
        let counters = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(count) => Some((key, count)),
                _ => None,
            })
            .collect();
        Self { counters }
    }

    /// Sum of the counters named `name` carrying `label`, if given.
    #[must_use]
    pub fn total(&self, name: &str, label: Option<(&str, &str)>) -> u64 {
        self.counters
            .iter()
            .filter(|(key, _)| key.key().name() == name)
            .filter(|(key, _)| {
                label.is_none_or(|(label_key, label_value)| {
                    key.key()
                        .labels()
                        .any(|l| l.key() == label_key && l.value() == label_value)
                })
            })
            .map(|(_, count)| count)
            .sum()
    }
}
