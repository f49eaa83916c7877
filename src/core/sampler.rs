// src/core/sampler.rs — Stride / deadline frame sampling
//
// File sources: the first frame of every complete window of `stride` frames is
// sampled, so N frames give exactly floor(N / stride) samples.
// Live sources: the first frame of each window is emitted as soon as it is
// read; sampling stops at the deadline, on cancellation or at end of stream.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::types::FrameSample;
use crate::infra::errors::ActionLensError;
use crate::source::{FrameSource, RawFrame};

#[derive(Debug, Clone)]
pub struct SamplingPlan {
    /// Analyze one frame out of every `stride`.
    pub stride: u32,
    /// Wall-clock bound, used for live capture.
    pub deadline: Option<Duration>,
    pub cancel: CancellationToken,
}

impl SamplingPlan {
    pub fn every(stride: u32) -> Self {
        Self {
            stride,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Why sampling ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingEnd {
    Exhausted,
    Deadline,
    Cancelled,
    SourceError(String),
}

impl SamplingEnd {
    /// Stopped before the source ran dry.
    pub fn is_early(&self) -> bool {
        matches!(self, SamplingEnd::Deadline | SamplingEnd::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct SamplingStats {
    pub sampled: usize,
    pub frames_read: u64,
    /// Seconds of video covered: frame count over fps for files, wall-clock
    /// for live sources.
    pub duration_secs: f64,
    pub end: SamplingEnd,
}

/// Lazy sequence of `FrameSample`s over a frame source.
///
/// Blocking: every `next()` may wait on the decoder. Run it on a blocking
/// thread.
pub struct Sampler<S: FrameSource> {
    source: S,
    plan: SamplingPlan,
    live: bool,
    started: Instant,
    window_pos: u32,
    held: Option<RawFrame>,
    next_index: usize,
    frames_read: u64,
    last_timestamp: f64,
    end: Option<SamplingEnd>,
}

impl<S: FrameSource> Sampler<S> {
    pub fn new(source: S, plan: SamplingPlan) -> Result<Self, ActionLensError> {
        if plan.stride == 0 {
            return Err(ActionLensError::InvalidInput(
                "frame interval must be at least 1".into(),
            ));
        }
        let live = source.is_live();
        Ok(Self {
            source,
            plan,
            live,
            started: Instant::now(),
            window_pos: 0,
            held: None,
            next_index: 0,
            frames_read: 0,
            last_timestamp: 0.0,
            end: None,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn stride(&self) -> u32 {
        self.plan.stride
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.plan.cancel.clone()
    }

    /// Wall-clock instant past which nothing more is sampled.
    pub fn deadline(&self) -> Option<Instant> {
        self.plan.deadline.map(|limit| self.started + limit)
    }

    /// Stop early from outside the iterator, recording why if cancellation
    /// or the deadline caused it.
    pub fn interrupt(&mut self) {
        if self.end.is_none() {
            self.end = self.stop_condition();
        }
    }

    /// Close the source and report what happened.
    pub fn finish(mut self) -> SamplingStats {
        self.source.close();
        let duration_secs = if self.live {
            self.started.elapsed().as_secs_f64()
        } else {
            let fps = self.source.info().fps;
            if fps > 0.0 {
                self.frames_read as f64 / fps
            } else {
                self.last_timestamp
            }
        };
        SamplingStats {
            sampled: self.next_index,
            frames_read: self.frames_read,
            duration_secs,
            end: self.end.take().unwrap_or(SamplingEnd::Exhausted),
        }
    }

    fn stop_condition(&self) -> Option<SamplingEnd> {
        if self.plan.cancel.is_cancelled() {
            return Some(SamplingEnd::Cancelled);
        }
        match self.plan.deadline {
            Some(limit) if self.started.elapsed() >= limit => Some(SamplingEnd::Deadline),
            _ => None,
        }
    }

    fn emit(&mut self, frame: RawFrame) -> FrameSample {
        let sample = FrameSample::from_raw(self.next_index, frame);
        self.next_index += 1;
        sample
    }
}

impl<S: FrameSource> Iterator for Sampler<S> {
    type Item = Result<FrameSample, ActionLensError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.end.is_some() {
                return None;
            }
            if let Some(end) = self.stop_condition() {
                self.end = Some(end);
                return None;
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    // A trailing partial window is dropped.
                    self.held = None;
                    self.end = Some(SamplingEnd::Exhausted);
                    return None;
                }
                Err(e) => {
                    self.end = Some(SamplingEnd::SourceError(e.to_string()));
                    return Some(Err(e));
                }
            };
            self.frames_read += 1;
            self.last_timestamp = frame.timestamp;

            // A frame read past the deadline is not analyzed.
            if let Some(end) = self.stop_condition() {
                self.end = Some(end);
                return None;
            }

            let window_start = self.window_pos == 0;
            self.window_pos = (self.window_pos + 1) % self.plan.stride;
            let window_complete = self.window_pos == 0;

            if self.live {
                if window_start {
                    return Some(Ok(self.emit(frame)));
                }
                continue;
            }

            if window_start {
                self.held = Some(frame);
            }
            if window_complete {
                if let Some(held) = self.held.take() {
                    return Some(Ok(self.emit(held)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn sample_all(total: u64, stride: u32) -> (Vec<FrameSample>, SamplingStats) {
        let source = MemorySource::new(total, 30.0, 2, 2);
        let mut sampler = Sampler::new(source, SamplingPlan::every(stride)).unwrap();
        let samples: Vec<FrameSample> = sampler.by_ref().map(|s| s.unwrap()).collect();
        (samples, sampler.finish())
    }

    #[test]
    fn test_floor_count_for_many_strides() {
        for total in [0u64, 1, 29, 30, 31, 89, 90, 91, 200] {
            for stride in [1u32, 2, 3, 7, 30, 45, 300] {
                let (samples, stats) = sample_all(total, stride);
                let expected = (total / stride as u64) as usize;
                assert_eq!(samples.len(), expected, "N={total} k={stride}");
                assert_eq!(stats.sampled, expected);
                let indices: Vec<usize> = samples.iter().map(|s| s.index).collect();
                assert_eq!(indices, (0..expected).collect::<Vec<_>>());
                assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
            }
        }
    }

    #[test]
    fn test_samples_first_frame_of_each_window() {
        let (samples, stats) = sample_all(90, 30);
        let frames: Vec<u64> = samples.iter().map(|s| s.frame_number).collect();
        assert_eq!(frames, vec![0, 30, 60]);
        assert_eq!(stats.frames_read, 90);
        assert!((stats.duration_secs - 3.0).abs() < 1e-9);
        assert_eq!(stats.end, SamplingEnd::Exhausted);
    }

    #[test]
    fn test_zero_stride_rejected() {
        let source = MemorySource::new(10, 30.0, 2, 2);
        assert!(matches!(
            Sampler::new(source, SamplingPlan::every(0)),
            Err(ActionLensError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_live_emits_window_starts_immediately() {
        // 5 frames, stride 2: frames 0, 2 and 4 start windows.
        let source = MemorySource::paced(5, Duration::from_millis(1), 2, 2);
        let mut sampler = Sampler::new(source, SamplingPlan::every(2)).unwrap();
        let frames: Vec<u64> = sampler.by_ref().map(|s| s.unwrap().frame_number).collect();
        assert_eq!(frames, vec![0, 2, 4]);
    }

    #[test]
    fn test_live_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let source = MemorySource::paced(1_000, Duration::from_millis(1), 2, 2);
        let plan = SamplingPlan::every(1).with_cancel(cancel.clone());
        let mut sampler = Sampler::new(source, plan).unwrap();

        assert!(sampler.next().is_some());
        assert!(sampler.next().is_some());
        cancel.cancel();
        assert!(sampler.next().is_none());
        let stats = sampler.finish();
        assert_eq!(stats.sampled, 2);
        assert_eq!(stats.end, SamplingEnd::Cancelled);
        assert!(stats.end.is_early());
    }

    #[test]
    fn test_live_stops_at_deadline() {
        let source = MemorySource::paced(10_000, Duration::from_millis(2), 2, 2);
        let plan = SamplingPlan::every(1).with_deadline(Duration::from_millis(30));
        let mut sampler = Sampler::new(source, plan).unwrap();
        let count = sampler.by_ref().count();
        let stats = sampler.finish();
        assert!(count > 0 && count < 10_000);
        assert_eq!(stats.end, SamplingEnd::Deadline);
    }

    #[test]
    fn test_finish_closes_source() {
        let source = MemorySource::new(10, 30.0, 2, 2);
        let closed = source.closed_handle();
        let mut sampler = Sampler::new(source, SamplingPlan::every(5)).unwrap();
        assert!(sampler.next().is_some());
        assert!(!sampler.source().is_closed());
        let stats = sampler.finish();
        assert_eq!(stats.sampled, 1);
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_interrupt_records_cancellation() {
        let cancel = CancellationToken::new();
        let source = MemorySource::new(100, 30.0, 2, 2);
        let plan = SamplingPlan::every(1).with_cancel(cancel.clone());
        let mut sampler = Sampler::new(source, plan).unwrap();
        assert!(sampler.next().is_some());
        cancel.cancel();
        sampler.interrupt();
        assert_eq!(sampler.finish().end, SamplingEnd::Cancelled);
    }
}
