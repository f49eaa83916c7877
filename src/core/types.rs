// src/core/types.rs — Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infra::errors::ActionLensError;
use crate::source::{RawFrame, SourceKind};

/// One sampled frame, immutable once produced. Dropped after analysis.
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// Position in the sampled sequence (0, 1, 2, ...).
    pub index: usize,
    /// Position in the source.
    pub frame_number: u64,
    /// Seconds since the start of the source.
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    /// Packed RGB24.
    pub pixels: Vec<u8>,
}

impl FrameSample {
    pub fn from_raw(index: usize, frame: RawFrame) -> Self {
        Self {
            index,
            frame_number: frame.frame_number,
            timestamp: frame.timestamp,
            width: frame.width,
            height: frame.height,
            pixels: frame.pixels,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ObservationStatus {
    Ok,
    Failed { reason: String },
}

/// The model's description of one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    pub sample_index: usize,
    pub frame_number: u64,
    pub timestamp: f64,
    /// Empty when the analysis failed.
    pub text: String,
    #[serde(flatten)]
    pub status: ObservationStatus,
}

impl FrameObservation {
    pub fn succeeded(sample_index: usize, frame_number: u64, timestamp: f64, text: String) -> Self {
        Self {
            sample_index,
            frame_number,
            timestamp,
            text,
            status: ObservationStatus::Ok,
        }
    }

    pub fn failed(
        sample_index: usize,
        frame_number: u64,
        timestamp: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            sample_index,
            frame_number,
            timestamp,
            text: String::new(),
            status: ObservationStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, ObservationStatus::Ok)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            ObservationStatus::Ok => None,
            ObservationStatus::Failed { reason } => Some(reason),
        }
    }

    /// `[Frame 30 at 1.0s]`
    pub fn label(&self) -> String {
        format!("[Frame {} at {:.1}s]", self.frame_number, self.timestamp)
    }
}

/// Where a session's frames came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    /// File path or capture device.
    pub location: String,
    pub fps: f64,
    pub total_frames: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Frames are being sampled and analyzed.
    Running,
    /// Every sampled frame has an observation; the timeline is frozen.
    Collected,
    /// Summary attempted; ready to persist.
    Finalized,
    /// Finalize found no usable frames.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SummaryStatus {
    Complete,
    Unavailable { reason: String },
}

/// Output of the summary step attached to a finalized session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Comprehensive report text. Empty when unavailable.
    pub text: String,
    pub executive_brief: Option<String>,
    /// Model that produced the text, after any fallback.
    pub model: Option<String>,
    pub status: SummaryStatus,
}

impl SessionSummary {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            executive_brief: None,
            model: None,
            status: SummaryStatus::Unavailable {
                reason: reason.into(),
            },
        }
    }
}

/// One end-to-end run of sampling and analysis.
///
/// Observations can only be set once, through `collect`, which enforces
/// strictly increasing unique sample indices. The summary can only be
/// attached to a collected session.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    session_id: String,
    source: SourceDescriptor,
    interval: u32,
    model_id: String,
    started_at: DateTime<Utc>,
    observations: Vec<FrameObservation>,
    duration_secs: f64,
    stopped_early: bool,
    summary: Option<SessionSummary>,
    state: SessionState,
}

impl AnalysisSession {
    pub fn new(source: SourceDescriptor, interval: u32, model_id: impl Into<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            source,
            interval,
            model_id: model_id.into(),
            started_at: Utc::now(),
            observations: Vec::new(),
            duration_secs: 0.0,
            stopped_early: false,
            summary: None,
            state: SessionState::Running,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn observations(&self) -> &[FrameObservation] {
        &self.observations
    }

    pub fn successful(&self) -> impl Iterator<Item = &FrameObservation> {
        self.observations.iter().filter(|o| o.is_ok())
    }

    pub fn success_count(&self) -> usize {
        self.successful().count()
    }

    pub fn failed_count(&self) -> usize {
        self.observations.len() - self.success_count()
    }

    /// Seconds of video covered by the run.
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// True when a live run was cancelled or hit its deadline.
    pub fn stopped_early(&self) -> bool {
        self.stopped_early
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Freeze the timeline. Observations are ordered by sample index;
    /// duplicate indices are rejected.
    pub fn collect(
        &mut self,
        mut observations: Vec<FrameObservation>,
        duration_secs: f64,
        stopped_early: bool,
    ) -> Result<(), ActionLensError> {
        if self.state != SessionState::Running {
            return Err(ActionLensError::InvalidInput(format!(
                "session {} is no longer collecting",
                self.session_id
            )));
        }
        observations.sort_by_key(|o| o.sample_index);
        if observations
            .windows(2)
            .any(|w| w[0].sample_index == w[1].sample_index)
        {
            return Err(ActionLensError::InvalidInput(
                "duplicate sample index in observations".into(),
            ));
        }
        self.observations = observations;
        self.duration_secs = duration_secs;
        self.stopped_early = stopped_early;
        self.state = SessionState::Collected;
        Ok(())
    }

    /// Attach the summary outcome. Only valid once.
    pub fn finalize(&mut self, summary: SessionSummary) -> Result<(), ActionLensError> {
        if self.state != SessionState::Collected {
            return Err(ActionLensError::InvalidInput(format!(
                "session {} cannot be finalized in state {:?}",
                self.session_id, self.state
            )));
        }
        self.summary = Some(summary);
        self.state = SessionState::Finalized;
        Ok(())
    }

    pub(crate) fn mark_failed(&mut self) {
        self.state = SessionState::Failed;
    }
}

/// Real-time pipeline events delivered to `Orchestrator::with_progress`.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    SourceOpened {
        descriptor: String,
        kind: SourceKind,
        total_frames: Option<u64>,
        fps: f64,
    },
    FrameSampled {
        index: usize,
        frame_number: u64,
        timestamp: f64,
    },
    FrameAnalyzed {
        index: usize,
        frame_number: u64,
        timestamp: f64,
        /// Description on success, failure reason otherwise.
        detail: String,
        ok: bool,
    },
    SamplingFinished {
        sampled: usize,
        stopped_early: bool,
    },
    SummaryStarted {
        model: String,
    },
    SummaryChunk {
        text: String,
    },
    /// Chunks streamed so far are void; the full text follows as one chunk.
    SummaryRestarted,
    SummaryFinished {
        ok: bool,
    },
    ReportSaved {
        filename: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> SourceDescriptor {
        SourceDescriptor {
            kind: SourceKind::File,
            location: "clip.mp4".into(),
            fps: 30.0,
            total_frames: Some(90),
        }
    }

    #[test]
    fn test_observation_label() {
        let obs = FrameObservation::succeeded(1, 30, 1.0, "walking".into());
        assert_eq!(obs.label(), "[Frame 30 at 1.0s]");
        assert!(obs.is_ok());
        assert_eq!(obs.failure_reason(), None);
    }

    #[test]
    fn test_failed_observation() {
        let obs = FrameObservation::failed(2, 60, 2.0, "HTTP 500");
        assert!(!obs.is_ok());
        assert_eq!(obs.failure_reason(), Some("HTTP 500"));
        assert!(obs.text.is_empty());
    }

    #[test]
    fn test_observation_serde_flattens_status() {
        let obs = FrameObservation::failed(0, 0, 0.0, "timeout");
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "timeout");
        let back: FrameObservation = serde_json::from_value(json).unwrap();
        assert_eq!(back, obs);
    }

    #[test]
    fn test_collect_orders_observations() {
        let mut session = AnalysisSession::new(descriptor(), 30, "m");
        session
            .collect(
                vec![
                    FrameObservation::succeeded(2, 60, 2.0, "c".into()),
                    FrameObservation::succeeded(0, 0, 0.0, "a".into()),
                    FrameObservation::failed(1, 30, 1.0, "x"),
                ],
                3.0,
                false,
            )
            .unwrap();
        let indices: Vec<usize> = session.observations().iter().map(|o| o.sample_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(session.success_count(), 2);
        assert_eq!(session.failed_count(), 1);
        assert_eq!(session.state(), SessionState::Collected);
    }

    #[test]
    fn test_collect_rejects_duplicates_and_double_collect() {
        let mut session = AnalysisSession::new(descriptor(), 30, "m");
        let dup = vec![
            FrameObservation::succeeded(0, 0, 0.0, "a".into()),
            FrameObservation::succeeded(0, 0, 0.0, "b".into()),
        ];
        assert!(session.collect(dup, 1.0, false).is_err());

        session.collect(vec![], 0.0, false).unwrap();
        assert!(session.collect(vec![], 0.0, false).is_err());
    }

    #[test]
    fn test_finalize_requires_collected() {
        let mut session = AnalysisSession::new(descriptor(), 30, "m");
        assert!(session.finalize(SessionSummary::unavailable("x")).is_err());
        session.collect(vec![], 0.0, false).unwrap();
        session.finalize(SessionSummary::unavailable("x")).unwrap();
        assert_eq!(session.state(), SessionState::Finalized);
        assert!(session.finalize(SessionSummary::unavailable("y")).is_err());
    }
}
