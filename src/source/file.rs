// src/source/file.rs — File-backed frame source

use std::path::Path;

use super::ffmpeg::{self, RawVideoReader, Toolchain};
use super::{FrameSource, RawFrame, SourceInfo, SourceKind};
use crate::infra::errors::ActionLensError;

/// Video container extensions accepted for file analysis.
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "wmv", "webm", "m4v"];

/// Check that `path` exists and has an accepted video extension.
pub fn validate_path(path: &Path) -> Result<(), ActionLensError> {
    let unavailable = |reason: String| ActionLensError::SourceUnavailable {
        source_name: path.display().to_string(),
        reason,
    };

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(unavailable(format!(
            "unsupported file type '{}' (allowed: {})",
            ext,
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    if !path.is_file() {
        return Err(unavailable("file does not exist".into()));
    }
    Ok(())
}

/// Decodes a video file front to back. Finite and not restartable.
pub struct FileSource {
    descriptor: String,
    info: SourceInfo,
    reader: Option<RawVideoReader>,
    pending: Option<RawFrame>,
    next_number: u64,
}

impl FileSource {
    /// Validate, probe and start decoding `path`. Blocking.
    pub fn open(path: &Path) -> Result<Self, ActionLensError> {
        validate_path(path)?;
        let tools = Toolchain::locate().map_err(|reason| ActionLensError::SourceUnavailable {
            source_name: path.display().to_string(),
            reason,
        })?;
        Self::open_with(path, &tools)
    }

    /// Open with explicit ffmpeg binaries. The first frame is decoded here,
    /// so a file ffmpeg cannot read fails before any session starts.
    pub fn open_with(path: &Path, tools: &Toolchain) -> Result<Self, ActionLensError> {
        validate_path(path)?;
        let descriptor = path.display().to_string();
        let unavailable = |reason: String| ActionLensError::SourceUnavailable {
            source_name: descriptor.clone(),
            reason,
        };

        let probe = ffmpeg::probe(&tools.ffprobe, path).map_err(unavailable)?;
        let input_args = vec!["-i".to_string(), path.to_string_lossy().into_owned()];
        let (reader, first) =
            RawVideoReader::start(&tools.ffmpeg, &input_args, probe.width, probe.height)
                .map_err(unavailable)?;

        tracing::debug!(
            source = %descriptor,
            width = probe.width,
            height = probe.height,
            fps = probe.fps,
            total_frames = ?probe.total_frames,
            "Opened video file"
        );

        Ok(Self {
            descriptor,
            info: SourceInfo {
                width: probe.width,
                height: probe.height,
                fps: probe.fps,
                total_frames: probe.total_frames,
            },
            reader: Some(reader),
            pending: Some(RawFrame {
                frame_number: 0,
                timestamp: 0.0,
                width: probe.width,
                height: probe.height,
                pixels: first,
            }),
            next_number: 1,
        })
    }
}

impl FrameSource for FileSource {
    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn kind(&self) -> SourceKind {
        SourceKind::File
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
                    timestamp: frame_number as f64 / self.info.fps,
                    width: self.info.width,
                    height: self.info.height,
                    pixels,
                }))
            }
            None => {
                self.close();
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.pending = None;
        if let Some(reader) = self.reader.take() {
            let stderr = reader.shutdown();
            if !stderr.is_empty() {
                tracing::debug!(source = %self.descriptor, "ffmpeg: {}", stderr);
            }
        }
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        let err = validate_path(&path).unwrap_err();
        assert!(matches!(err, ActionLensError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("unsupported file type 'txt'"));
    }

    #[test]
    fn test_rejects_missing_file() {
        let err = validate_path(Path::new("/nonexistent/clip.mp4")).unwrap_err();
        assert!(err.to_string().contains("file does not exist"));
    }

    #[test]
    fn test_extension_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CLIP.MP4");
        std::fs::write(&path, b"").unwrap();
        assert!(validate_path(&path).is_ok());
    }

    #[test]
    fn test_open_missing_file_is_source_unavailable() {
        let result = FileSource::open(Path::new("/nonexistent/clip.mkv"));
        assert!(matches!(
            result,
            Err(ActionLensError::SourceUnavailable { .. })
        ));
    }

    #[cfg(unix)]
    mod decoding {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        const PROBE_JSON: &str = r#"{"streams":[{"width":2,"height":2,"avg_frame_rate":"10/1","nb_frames":"3"}]}"#;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn setup(ffmpeg_body: &str) -> (tempfile::TempDir, PathBuf, Toolchain) {
            let dir = tempfile::tempdir().unwrap();
            let video = dir.path().join("clip.mp4");
            std::fs::write(&video, b"not really a video").unwrap();
            let tools = Toolchain {
                ffprobe: script(dir.path(), "ffprobe", &format!("echo '{PROBE_JSON}'")),
                ffmpeg: script(dir.path(), "ffmpeg", ffmpeg_body),
            };
            (dir, video, tools)
        }

        #[test]
        fn test_undecodable_file_is_source_unavailable() {
            let (_dir, video, tools) = setup(
                "echo 'clip.mp4: Invalid data found when processing input' >&2\nexit 1",
            );
            match FileSource::open_with(&video, &tools) {
                Err(ActionLensError::SourceUnavailable { reason, .. }) => {
                    assert!(reason.contains("Invalid data found when processing input"));
                }
                Err(other) => panic!("unexpected error: {other}"),
                Ok(_) => panic!("undecodable file opened"),
            }
        }

        #[test]
        fn test_first_frame_is_not_lost() {
            // Three 2x2 RGB frames.
            let (_dir, video, tools) = setup("printf 'aaaaaaaaaaaabbbbbbbbbbbbcccccccccccc'");
            let mut source = FileSource::open_with(&video, &tools).unwrap();
            assert_eq!(source.info().total_frames, Some(3));

            let mut frames = Vec::new();
            while let Some(frame) = source.next_frame().unwrap() {
                frames.push((frame.frame_number, frame.timestamp, frame.pixels[0]));
            }
            assert_eq!(frames, vec![(0, 0.0, b'a'), (1, 0.1, b'b'), (2, 0.2, b'c')]);
        }
    }
}
