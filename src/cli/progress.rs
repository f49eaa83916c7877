// src/cli/progress.rs — Terminal progress renderer for pipeline events

use std::io::Write;

use crate::core::types::PipelineEvent;

/// One stderr line for an event. Summary chunks are streamed raw instead.
pub fn format_event(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::SourceOpened {
            descriptor,
            kind,
            total_frames,
            fps,
        } => Some(match total_frames {
            Some(total) => format!(
                "[source] {} ({}): {} frames, {:.2} fps",
                descriptor, kind, total, fps
            ),
            None => format!("[source] {} ({}), {:.2} fps", descriptor, kind, fps),
        }),
        PipelineEvent::FrameSampled {
            index,
            frame_number,
            timestamp,
        } => Some(format!(
            "[sample {}] frame {} at {:.1}s",
            index, frame_number, timestamp
        )),
        PipelineEvent::FrameAnalyzed {
            index, ok, detail, ..
        } => {
            let first_line = detail.lines().next().unwrap_or("");
            Some(if *ok {
                format!("[frame {}] ok: {}", index, preview(first_line, 72))
            } else {
                format!("[frame {}] failed: {}", index, first_line)
            })
        }
        PipelineEvent::SamplingFinished {
            sampled,
            stopped_early,
        } => Some(format!(
            "[done] {} frame(s) sampled{}",
            sampled,
            if *stopped_early { " (stopped early)" } else { "" }
        )),
        PipelineEvent::SummaryStarted { model } => {
            Some(format!("[summary] generating with {}...", model))
        }
        PipelineEvent::SummaryChunk { .. } => None,
        PipelineEvent::SummaryRestarted => {
            Some("\n[summary] stream interrupted, regenerating...".to_string())
        }
        PipelineEvent::SummaryFinished { ok } => Some(if *ok {
            "\n[summary] complete".to_string()
        } else {
            "[summary] unavailable, timeline saved without it".to_string()
        }),
        PipelineEvent::ReportSaved { filename } => Some(format!("[report] saved as {}", filename)),
    }
}

/// At most `max_chars` characters of `line`.
fn preview(line: &str, max_chars: usize) -> &str {
    match line.char_indices().nth(max_chars) {
        Some((cut, _)) => &line[..cut],
        None => line,
    }
}

/// Build a progress callback that writes to stderr.
///
/// All progress output goes to stderr so stdout carries only the report.
/// Returns a closure suitable for `Orchestrator::with_progress()`.
pub fn terminal_progress() -> impl Fn(PipelineEvent) + Send + Sync + 'static {
    move |event| match event {
        PipelineEvent::SummaryChunk { text } => {
            let mut err = std::io::stderr();
            let _ = err.write_all(text.as_bytes());
            let _ = err.flush();
        }
        other => {
            if let Some(line) = format_event(&other) {
                eprintln!("{}", line);
            }
        }
    }
}
