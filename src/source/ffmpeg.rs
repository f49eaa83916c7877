// src/source/ffmpeg.rs — ffmpeg/ffprobe subprocess plumbing
//
// Frames are read from `ffmpeg ... -f rawvideo -pix_fmt rgb24 -` on stdout,
// one fixed-size block per frame.

use serde::Deserialize;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

/// Locate a binary on PATH.
pub fn locate(binary: &str) -> Result<PathBuf, String> {
    which::which(binary).map_err(|_| format!("'{binary}' not found on PATH"))
}

/// Resolved ffmpeg and ffprobe binaries.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Toolchain {
    pub fn locate() -> Result<Self, String> {
        Ok(Self {
            ffmpeg: locate("ffmpeg")?,
            ffprobe: locate("ffprobe")?,
        })
    }
}

/// Stream metadata reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Run ffprobe on the first video stream of `path`.
pub fn probe(ffprobe: &Path, path: &Path) -> Result<ProbeInfo, String> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-select_streams", "v:0", "-show_entries"])
        .arg("stream=width,height,avg_frame_rate,r_frame_rate,nb_frames,duration")
        .args(["-of", "json"])
        .arg(path)
        .output()
        .map_err(|e| format!("failed to run ffprobe: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("ffprobe failed: {}", stderr.trim()));
    }
    parse_probe_json(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `ffprobe -of json` output.
pub fn parse_probe_json(json: &str) -> Result<ProbeInfo, String> {
    let parsed: ProbeOutput =
        serde_json::from_str(json).map_err(|e| format!("unreadable ffprobe output: {e}"))?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream found".to_string())?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err("video stream has no dimensions".into()),
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(30.0);

    let total_frames = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .or_else(|| {
            stream
                .duration
                .as_deref()
                .and_then(|d| d.parse::<f64>().ok())
                .map(|secs| (secs * fps).round() as u64)
        });

    Ok(ProbeInfo {
        width,
        height,
        fps,
        total_frames,
    })
}

/// Parse `30000/1001` or `25` style rates. Zero rates are rejected.
pub fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Bytes of ffmpeg stderr kept for error reasons.
pub const STDERR_TAIL_BYTES: usize = 4096;

/// A running ffmpeg process emitting raw RGB24 frames.
///
/// stderr is drained on its own thread so a chatty decoder can never fill
/// the pipe and stall stdout; only the last `STDERR_TAIL_BYTES` are kept.
pub struct RawVideoReader {
    child: Child,
    stdout: ChildStdout,
    stderr_tail: Option<JoinHandle<Vec<u8>>>,
    pub width: u32,
    pub height: u32,
    frame_size: usize,
}

impl RawVideoReader {
    /// Spawn `ffmpeg` with `input_args` and a fixed output size.
    pub fn spawn(
        ffmpeg: &Path,
        input_args: &[String],
        width: u32,
        height: u32,
    ) -> Result<Self, String> {
        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(input_args)
            .args(["-vf", &format!("scale={width}:{height}")])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to start ffmpeg: {e}"))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err("ffmpeg pipes unavailable".into());
        };
        let stderr_tail = std::thread::Builder::new()
            .name("ffmpeg-stderr".into())
            .spawn(move || drain_tail(stderr, STDERR_TAIL_BYTES))
            .map_err(|e| {
                let _ = child.kill();
                let _ = child.wait();
                format!("failed to start stderr reader: {e}")
            })?;

        Ok(Self {
            child,
            stdout,
            stderr_tail: Some(stderr_tail),
            width,
            height,
            frame_size: width as usize * height as usize * 3,
        })
    }

    /// Spawn ffmpeg and wait for its first frame.
    ///
    /// A process that exits or fails before producing one complete frame is
    /// an error carrying ffmpeg's own message.
    pub fn start(
        ffmpeg: &Path,
        input_args: &[String],
        width: u32,
        height: u32,
    ) -> Result<(Self, Vec<u8>), String> {
        let mut reader = Self::spawn(ffmpeg, input_args, width, height)?;
        match reader.read_frame() {
            Ok(Some(first)) => Ok((reader, first)),
            Ok(None) => {
                let stderr = reader.shutdown();
                Err(if stderr.is_empty() {
                    "no decodable frames".into()
                } else {
                    stderr
                })
            }
            Err(e) => {
                let stderr = reader.shutdown();
                Err(if stderr.is_empty() {
                    e.to_string()
                } else {
                    format!("{e}: {stderr}")
                })
            }
        }
    }

    /// Read one frame. `Ok(None)` once ffmpeg has no more complete frames.
    pub fn read_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.frame_size];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => Ok(Some(buf)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Kill and reap the process, returning the tail of its stderr.
    pub fn shutdown(mut self) -> String {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let tail = self
            .stderr_tail
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        String::from_utf8_lossy(&tail).trim().to_string()
    }
}

/// Read `source` to EOF, keeping only its last `limit` bytes.
fn drain_tail(mut source: impl Read, limit: usize) -> Vec<u8> {
    let mut tail: VecDeque<u8> = VecDeque::with_capacity(limit);
    let mut chunk = [0u8; 8192];
    loop {
        match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                tail.extend(&chunk[..n]);
                let excess = tail.len().saturating_sub(limit);
                tail.drain(..excess);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    let mut bytes: Vec<u8> = tail.into();
    // Start on a line boundary when the head was cut.
    if bytes.len() == limit {
        if let Some(pos) = bytes.iter().position(|b| *b == b'\n') {
            bytes.drain(..=pos);
        }
    }
    bytes
}
