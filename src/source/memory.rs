// src/source/memory.rs — Synthetic in-memory frame source

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{FrameSource, RawFrame, SourceInfo, SourceKind};
use crate::infra::errors::ActionLensError;

/// Generates `total` solid-colour frames without any decoder.
///
/// Used for dry runs, benchmarks and tests. With `paced` set it behaves like a
/// live device: it sleeps between frames and never reports a frame count.
pub struct MemorySource {
    descriptor: String,
    info: SourceInfo,
    kind: SourceKind,
    total: u64,
    produced: u64,
    pace: Option<Duration>,
    closed: Arc<AtomicBool>,
}

impl MemorySource {
    pub fn new(total: u64, fps: f64, width: u32, height: u32) -> Self {
        Self {
            descriptor: format!("memory:{total}"),
            info: SourceInfo {
                width,
                height,
                fps,
                total_frames: Some(total),
            },
            kind: SourceKind::File,
            total,
            produced: 0,
            pace: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Live-style source emitting up to `total` frames, one every `interval`.
    pub fn paced(total: u64, interval: Duration, width: u32, height: u32) -> Self {
        let fps = if interval.is_zero() {
            0.0
        } else {
            1.0 / interval.as_secs_f64()
        };
        Self {
            descriptor: "memory:live".into(),
            info: SourceInfo {
                width,
                height,
                fps,
                total_frames: None,
            },
            kind: SourceKind::Live,
            total,
            produced: 0,
            pace: Some(interval),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flag that stays readable after the source is moved or dropped.
    pub fn closed_handle(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    fn timestamp(&self, frame_number: u64) -> f64 {
        match self.pace {
            Some(interval) => interval.as_secs_f64() * frame_number as f64,
            None if self.info.fps > 0.0 => frame_number as f64 / self.info.fps,
            None => 0.0,
        }
    }
}

impl FrameSource for MemorySource {
    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, ActionLensError> {
        if self.is_closed() || self.produced >= self.total {
            return Ok(None);
        }
        if let Some(interval) = self.pace {
            if self.produced > 0 {
                std::thread::sleep(interval);
            }
        }
        let frame_number = self.produced;
        self.produced += 1;

        let shade = (frame_number % 256) as u8;
        let pixels = [shade, 128, 255 - shade]
            .repeat(self.info.width as usize * self.info.height as usize);
        Ok(Some(RawFrame {
            frame_number,
            timestamp: self.timestamp(frame_number),
            width: self.info.width,
            height: self.info.height,
            pixels,
        }))
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produces_exact_count() {
        let mut src = MemorySource::new(5, 10.0, 4, 2);
        let mut frames = Vec::new();
        while let Some(f) = src.next_frame().unwrap() {
            frames.push(f);
        }
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[4].frame_number, 4);
        assert!((frames[4].timestamp - 0.4).abs() < 1e-9);
        assert_eq!(frames[0].pixels.len(), 4 * 2 * 3);
    }

    #[test]
    fn test_close_ends_stream() {
        let mut src = MemorySource::new(5, 10.0, 2, 2);
        assert!(src.next_frame().unwrap().is_some());
        src.close();
        assert!(src.is_closed());
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_paced_is_live() {
        let src = MemorySource::paced(3, Duration::from_millis(1), 2, 2);
        assert!(src.is_live());
        assert_eq!(src.info().total_frames, None);
    }
}
