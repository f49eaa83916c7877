// src/report/store.rs — Append-only report storage on the filesystem
//
// Each report is three files sharing a stem:
//   <stem>.timeline.txt   ordered timeline with [GAP] markers
//   <stem>.summary.txt    summary text (empty when unavailable)
//   <stem>.json           metadata, written last (temp file + rename)
// A report exists once its metadata file exists.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::{Report, ReportMeta};
use crate::core::aggregator::render_timeline;
use crate::core::types::{AnalysisSession, SessionState, SummaryStatus};
use crate::infra::errors::ActionLensError;

const STEM_PREFIX: &str = "video_report_";
const TIMELINE_EXT: &str = "timeline.txt";
const SUMMARY_EXT: &str = "summary.txt";
const META_EXT: &str = "json";

#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, stem: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{stem}.{ext}"))
    }

    /// Persist a finalized session. Blocking.
    pub fn save(&self, session: &AnalysisSession) -> Result<Report, ActionLensError> {
        if session.state() != SessionState::Finalized {
            return Err(ActionLensError::InvalidInput(format!(
                "session {} is not finalized",
                session.session_id()
            )));
        }
        let summary = session.summary().cloned().ok_or_else(|| {
            ActionLensError::InvalidInput("finalized session has no summary outcome".into())
        })?;
        std::fs::create_dir_all(&self.dir)?;

        let timeline_text = render_timeline(session.observations());
        let summary_text = match summary.status {
            SummaryStatus::Complete => summary.text.clone(),
            SummaryStatus::Unavailable { .. } => String::new(),
        };

        let created_at = Utc::now();
        let stem = self.claim_stem(&created_at.format("%Y%m%dT%H%M%S").to_string(), &timeline_text)?;
        write_new(&self.record_path(&stem, SUMMARY_EXT), &summary_text)?;

        let meta = ReportMeta {
            filename: stem.clone(),
            created_at,
            session_id: session.session_id().to_string(),
            source: session.source().clone(),
            model: session.model_id().to_string(),
            summary_model: summary.model.clone(),
            frame_interval: session.interval(),
            duration_secs: session.duration_secs(),
            sampled: session.observations().len(),
            failed: session.failed_count(),
            stopped_early: session.stopped_early(),
            summary_status: summary.status.clone(),
            executive_brief: summary.executive_brief.clone(),
        };
        self.commit_meta(&meta)?;

        tracing::debug!(filename = %stem, dir = %self.dir.display(), "Report written");
        Ok(Report {
            meta,
            timeline_text,
            summary_text,
        })
    }

    /// Pick a fresh stem by creating its timeline file. Concurrent writers
    /// in the same second get distinct discriminators.
    fn claim_stem(&self, timestamp: &str, timeline_text: &str) -> Result<String, ActionLensError> {
        for _ in 0..8 {
            let discriminator = uuid::Uuid::new_v4().simple().to_string();
            let stem = format!("{STEM_PREFIX}{timestamp}_{}", &discriminator[..8]);
            match write_new(&self.record_path(&stem, TIMELINE_EXT), timeline_text) {
                Ok(()) => return Ok(stem),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ActionLensError::Other(anyhow::anyhow!(
            "could not allocate a unique report name in {}",
            self.dir.display()
        )))
    }

    fn commit_meta(&self, meta: &ReportMeta) -> Result<(), ActionLensError> {
        let json = serde_json::to_string_pretty(meta)?;
        let tmp = self.dir.join(format!(".{}.{META_EXT}.tmp", meta.filename));
        let dst = self.record_path(&meta.filename, META_EXT);

        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(json.as_bytes())?;
        f.flush()?;
        f.sync_all()?;
        std::fs::rename(&tmp, &dst)?;
        Ok(())
    }

    /// Load a report by stem. `<stem>.txt` and `<stem>.json` are accepted too.
    pub fn load(&self, filename: &str) -> Result<Report, ActionLensError> {
        let not_found = || ActionLensError::ReportNotFound {
            filename: filename.to_string(),
        };
        let stem = normalize_name(filename).ok_or_else(not_found)?;

        let meta_json = match std::fs::read_to_string(self.record_path(stem, META_EXT)) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let meta: ReportMeta = serde_json::from_str(&meta_json)?;

        let read = |ext: &str| match std::fs::read_to_string(self.record_path(stem, ext)) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(ActionLensError::from(e)),
        };
        Ok(Report {
            timeline_text: read(TIMELINE_EXT)?,
            summary_text: read(SUMMARY_EXT)?,
            meta,
        })
    }

    /// Committed reports, newest first. A missing directory is an empty list.
    pub fn list(&self) -> Result<Vec<ReportMeta>, ActionLensError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reports = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') || !name.ends_with(&format!(".{META_EXT}")) {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(ActionLensError::from)
                .and_then(|json| serde_json::from_str::<ReportMeta>(&json).map_err(Into::into))
            {
                Ok(meta) => reports.push(meta),
                Err(e) => tracing::warn!(file = %name, "Skipping unreadable report metadata: {}", e),
            }
        }

        reports.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(reports)
    }
}

/// Strip accepted suffixes; reject anything that could leave the store.
fn normalize_name(filename: &str) -> Option<&str> {
    let name = filename.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return None;
    }
    let stem = [".timeline.txt", ".summary.txt", ".txt", ".json"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name);
    (!stem.is_empty()).then_some(stem)
}

fn write_new(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut f = OpenOptions::new().write(true).create_new(true).open(path)?;
    f.write_all(contents.as_bytes())?;
    f.flush()
}
