// src/core/aggregator.rs — Ordered, failure-tolerant observation buffer

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::types::{FrameObservation, FrameSample};

/// Reason recorded for a sample whose analysis never reported back.
pub const INCOMPLETE_REASON: &str = "analysis did not complete";

/// Header of every rendered timeline. States the failed-frame policy.
pub const TIMELINE_HEADER: &str = "Timeline (failed frames are marked [GAP])";

#[derive(Debug, Clone, Copy)]
struct Pending {
    frame_number: u64,
    timestamp: f64,
}

#[derive(Debug, Default)]
struct State {
    pending: BTreeMap<usize, Pending>,
    done: BTreeMap<usize, FrameObservation>,
    frozen: bool,
}

/// Collects observations arriving in any order and hands them back ordered
/// by `sample_index`.
///
/// Every sample is registered before its analysis starts, so finalize can
/// mark the ones that never reported back instead of dropping them.
/// Clones share the same buffer; all mutation goes through one mutex.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    state: Arc<Mutex<State>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Announce a sample about to be analyzed.
    pub fn register(&self, sample: &FrameSample) {
        let mut state = self.lock();
        if state.frozen || state.done.contains_key(&sample.index) {
            return;
        }
        state.pending.insert(
            sample.index,
            Pending {
                frame_number: sample.frame_number,
                timestamp: sample.timestamp,
            },
        );
    }

    /// Record a finished observation. Returns false if the buffer is frozen
    /// or the index already has an observation.
    pub fn insert(&self, observation: FrameObservation) -> bool {
        let mut state = self.lock();
        if state.frozen || state.done.contains_key(&observation.sample_index) {
            tracing::debug!(
                sample_index = observation.sample_index,
                "Observation ignored (duplicate or late)"
            );
            return false;
        }
        state.pending.remove(&observation.sample_index);
        state.done.insert(observation.sample_index, observation);
        true
    }

    /// Finished observations so far, in sample order.
    pub fn snapshot(&self) -> Vec<FrameObservation> {
        self.lock().done.values().cloned().collect()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().pending.len()
    }

    /// Freeze the buffer. Samples still pending become failed observations.
    pub fn finalize(&self) -> Vec<FrameObservation> {
        let mut state = self.lock();
        state.frozen = true;
        let pending = std::mem::take(&mut state.pending);
        for (index, p) in pending {
            tracing::warn!(sample_index = index, "No result for sample, marking as failed");
            state.done.insert(
                index,
                FrameObservation::failed(index, p.frame_number, p.timestamp, INCOMPLETE_REASON),
            );
        }
        state.done.values().cloned().collect()
    }
}

/// One timeline line: the description, or a `[GAP]` marker with the reason.
pub fn timeline_line(observation: &FrameObservation) -> String {
    match observation.failure_reason() {
        None => format!("{}: {}", observation.label(), observation.text),
        Some(reason) => format!("{}: [GAP] analysis failed: {}", observation.label(), reason),
    }
}

/// Render ordered observations as timeline text.
pub fn render_timeline(observations: &[FrameObservation]) -> String {
    let mut out = String::from(TIMELINE_HEADER);
    out.push('\n');
    for obs in observations {
        out.push('\n');
        out.push_str(&timeline_line(obs));
        out.push('\n');
    }
    out
}
