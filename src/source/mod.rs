// src/source/mod.rs — Frame sources (file-backed, live capture, in-memory)

pub mod ffmpeg;
pub mod file;
pub mod live;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::infra::errors::ActionLensError;

pub use file::FileSource;
pub use live::LiveSource;
pub use memory::MemorySource;

/// One decoded frame in packed RGB24.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Position in the source, starting at 0.
    pub frame_number: u64,
    /// Seconds since the start of the source.
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Live,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::File => write!(f, "file"),
            SourceKind::Live => write!(f, "live"),
        }
    }
}

/// What a source reports about itself once opened.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Known up front for most files, never for live capture.
    pub total_frames: Option<u64>,
}

/// A decodable video producing timestamped frames.
///
/// Construction is the `open` step of each variant; a source that cannot be
/// opened never exists. `next_frame` blocks until a frame is decoded and
/// returns `Ok(None)` at end of stream. A source is owned by exactly one
/// pipeline run and is not restartable.
pub trait FrameSource: Send {
    /// Path or device the source was opened from.
    fn descriptor(&self) -> &str;

    fn kind(&self) -> SourceKind;

    fn info(&self) -> &SourceInfo;

    fn next_frame(&mut self) -> Result<Option<RawFrame>, ActionLensError>;

    /// Release the decoder. Idempotent.
    fn close(&mut self);

    fn is_live(&self) -> bool {
        self.kind() == SourceKind::Live
    }
}

impl FrameSource for Box<dyn FrameSource> {
    fn descriptor(&self) -> &str {
        (**self).descriptor()
    }
    fn kind(&self) -> SourceKind {
        (**self).kind()
    }
    fn info(&self) -> &SourceInfo {
        (**self).info()
    }
    fn next_frame(&mut self) -> Result<Option<RawFrame>, ActionLensError> {
        (**self).next_frame()
    }
    fn close(&mut self) {
        (**self).close()
    }
}
