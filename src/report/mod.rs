// src/report/mod.rs — Persisted analysis reports

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{SourceDescriptor, SummaryStatus};

pub use store::ReportStore;

const RULE: &str = "============================================================";

/// Characters of summary shown when no executive brief exists.
pub const SUMMARY_PREVIEW_CHARS: usize = 800;

/// Metadata record stored next to the timeline and summary text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Shared stem of the report's records.
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub session_id: String,
    pub source: SourceDescriptor,
    pub model: String,
    pub summary_model: Option<String>,
    pub frame_interval: u32,
    pub duration_secs: f64,
    pub sampled: usize,
    pub failed: usize,
    #[serde(default)]
    pub stopped_early: bool,
    pub summary_status: SummaryStatus,
    pub executive_brief: Option<String>,
}

/// A finished report: ordered timeline plus summary. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub meta: ReportMeta,
    pub timeline_text: String,
    /// Empty when the summary was unavailable.
    pub summary_text: String,
}

impl Report {
    pub fn filename(&self) -> &str {
        &self.meta.filename
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.meta.created_at
    }

    pub fn has_summary(&self) -> bool {
        self.meta.summary_status == SummaryStatus::Complete
    }

    /// Full human-readable report.
    pub fn render(&self) -> String {
        let m = &self.meta;
        let mut out = String::new();
        out.push_str(&format!("{RULE}\nVIDEO ACTION REPORT\n{RULE}\n"));
        out.push_str(&format!("Report: {}\n", m.filename));
        out.push_str(&format!("Created: {}\n", m.created_at.format("%Y-%m-%d %H:%M:%S UTC")));
        out.push_str(&format!("Source: {} ({})\n", m.source.location, m.source.kind));
        out.push_str(&format!("Model: {}\n", m.model));
        out.push_str(&format!("Frame interval: every {} frame(s)\n", m.frame_interval));
        out.push_str(&format!(
            "Frames analyzed: {} ({} failed)\n",
            m.sampled, m.failed
        ));
        out.push_str(&format!("Duration: {:.1}s", m.duration_secs));
        if m.stopped_early {
            out.push_str(" (stopped early)");
        }
        out.push_str("\n\n");

        out.push_str(&self.timeline_text);
        if !self.timeline_text.ends_with('\n') {
            out.push('\n');
        }

        out.push_str(&format!("\n{RULE}\nFINAL VIDEO REPORT\n{RULE}\n\n"));
        match &m.summary_status {
            SummaryStatus::Complete => out.push_str(self.summary_text.trim_end()),
            SummaryStatus::Unavailable { reason } => {
                out.push_str(&format!("Summary unavailable: {reason}"))
            }
        }
        out.push('\n');

        if let Some(brief) = &m.executive_brief {
            out.push_str(&format!("\n{RULE}\nEXECUTIVE SUMMARY\n{RULE}\n\n{}\n", brief.trim()));
        }
        out.push_str(&format!("\n{RULE}\n"));
        out
    }

    /// Executive summary section if present, else a preview of the summary.
    pub fn summary_only(&self) -> String {
        if let Some(brief) = &self.meta.executive_brief {
            return format!("EXECUTIVE SUMMARY\n\n{}", brief.trim());
        }
        let summary = self.summary_text.trim();
        if summary.is_empty() {
            return "Summary unavailable.".to_string();
        }
        if summary.chars().count() > SUMMARY_PREVIEW_CHARS {
            let preview: String = summary.chars().take(SUMMARY_PREVIEW_CHARS).collect();
            format!("{}...", preview.trim_end())
        } else {
            summary.to_string()
        }
    }
}
