// src/source/live.rs — Live capture frame source

use std::time::Instant;

use super::ffmpeg::{locate, RawVideoReader};
use super::{FrameSource, RawFrame, SourceInfo, SourceKind};
use crate::infra::config::LiveConfig;
use crate::infra::errors::ActionLensError;

/// Reads frames from a capture device in real time.
///
/// Frames arrive at the device's pace; timestamps are wall-clock seconds
/// since `open`. The stream only ends when the device stops or the source is
/// closed.
pub struct LiveSource {
    descriptor: String,
    info: SourceInfo,
    reader: Option<RawVideoReader>,
    started: Instant,
    pending: Option<RawFrame>,
    next_number: u64,
}

impl LiveSource {
    /// Open the configured device and wait for its first frame. Blocking.
    pub fn open(config: &LiveConfig) -> Result<Self, ActionLensError> {
        let descriptor = format!("{}:{}", config.input_format, config.device);
        let unavailable = |reason: String| ActionLensError::SourceUnavailable {
            source_name: descriptor.clone(),
            reason,
        };
        if config.width == 0 || config.height == 0 {
            return Err(unavailable("capture size must be non-zero".into()));
        }

        let ffmpeg = locate("ffmpeg").map_err(&unavailable)?;
        let (reader, first) =
            RawVideoReader::start(&ffmpeg, &capture_args(config), config.width, config.height)
                .map_err(unavailable)?;

        tracing::info!(device = %descriptor, "Capture device opened");

        Ok(Self {
            descriptor,
            info: SourceInfo {
                width: config.width,
                height: config.height,
                fps: config.framerate as f64,
                total_frames: None,
            },
            reader: Some(reader),
            started: Instant::now(),
            pending: Some(RawFrame {
                frame_number: 0,
                timestamp: 0.0,
                width: config.width,
                height: config.height,
                pixels: first,
            }),
            next_number: 1,
        })
    }
}

/// ffmpeg input arguments for the platform capture backend.
pub fn capture_args(config: &LiveConfig) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        config.input_format.clone(),
        "-framerate".to_string(),
        config.framerate.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", config.width, config.height),
    ];
    args.push("-i".to_string());
    args.push(config.device.clone());
    args
}

impl FrameSource for LiveSource {
    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, ActionLensError> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        match reader.read_frame()? {
            Some(pixels) => {
                let frame_number = self.next_number;
                self.next_number += 1;
                Ok(Some(RawFrame {
                    frame_number,
                    timestamp: self.started.elapsed().as_secs_f64(),
                    width: self.info.width,
                    height: self.info.height,
                    pixels,
                }))
            }
            None => {
                tracing::warn!(device = %self.descriptor, "Capture stream ended");
                self.close();
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.pending = None;
        if let Some(reader) = self.reader.take() {
            reader.shutdown();
            tracing::debug!(device = %self.descriptor, "Capture device released");
        }
    }
}

impl Drop for LiveSource {
    fn drop(&mut self) {
        self.close();
    }
}
