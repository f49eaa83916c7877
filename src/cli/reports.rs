// src/cli/reports.rs — `actionlens reports` and `actionlens show`

use crate::core::types::SummaryStatus;
use crate::report::{ReportMeta, ReportStore};

/// One listing line per report.
pub fn format_listing(meta: &ReportMeta) -> String {
    let summary = match &meta.summary_status {
        SummaryStatus::Complete => "summary",
        SummaryStatus::Unavailable { .. } => "no summary",
    };
    format!(
        "{}  {}  {} frame(s), {} failed, {}  {}",
        meta.filename,
        meta.created_at.format("%Y-%m-%d %H:%M"),
        meta.sampled,
        meta.failed,
        summary,
        meta.source.location,
    )
}

pub fn list_reports(store: &ReportStore) -> anyhow::Result<()> {
    let reports = store.list()?;
    if reports.is_empty() {
        eprintln!("No reports in {}", store.dir().display());
        return Ok(());
    }
    for meta in &reports {
        println!("{}", format_listing(meta));
    }
    Ok(())
}

pub fn show_report(store: &ReportStore, filename: &str, summary_only: bool) -> anyhow::Result<()> {
    let report = store.load(filename)?;
    if summary_only {
        println!("{}", report.summary_only());
    } else {
        println!("{}", report.render());
    }
    Ok(())
}
