// src/cli/analyze.rs — `actionlens file` and `actionlens live`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::progress::terminal_progress;
use crate::core::orchestrator::Orchestrator;
use crate::core::types::AnalysisSession;
use crate::infra::config::Config;
use crate::provider::ModelProvider;

fn orchestrator(provider: Arc<dyn ModelProvider>, config: &Config, quiet: bool) -> Orchestrator {
    let orch = Orchestrator::new(provider, config.clone());
    if quiet {
        orch
    } else {
        orch.with_progress(terminal_progress())
    }
}

/// Analyze a video file and print the finished report to stdout.
pub async fn run_file(
    provider: Arc<dyn ModelProvider>,
    config: &Config,
    path: &str,
    quiet: bool,
) -> anyhow::Result<()> {
    let orch = orchestrator(provider, config, quiet);
    let session = orch
        .run_file_analysis(
            Path::new(path),
            config.analysis.frame_interval,
            &config.analysis.model,
        )
        .await?;
    finish(&orch, session).await
}

/// Analyze live capture until the configured duration or Ctrl-C.
pub async fn run_live(
    provider: Arc<dyn ModelProvider>,
    config: &Config,
    quiet: bool,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n[live] stopping, finishing frames already captured...");
            on_ctrl_c.cancel();
        }
    });

    if !quiet {
        eprintln!(
            "[live] capturing for {}s from {} (Ctrl-C to stop early)",
            config.live.duration_secs, config.live.device
        );
    }
    let orch = orchestrator(provider, config, quiet);
    let result = orch
        .run_live_analysis(
            Duration::from_secs(config.live.duration_secs),
            config.analysis.frame_interval,
            &config.analysis.model,
            cancel,
        )
        .await;
    watcher.abort();

    finish(&orch, result?).await
}

async fn finish(orch: &Orchestrator, session: AnalysisSession) -> anyhow::Result<()> {
    let report = orch.finalize_and_summarize(session).await?;
    println!("{}", report.render());
    if !report.has_summary() {
        eprintln!(
            "warning: summary unavailable; timeline saved as {}",
            report.filename()
        );
    }
    Ok(())
}
