// src/core/orchestrator.rs — Pipeline driver: source → sampler → analyzers → aggregator → summary → report

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::aggregator::Aggregator;
use super::analyzer::FrameAnalyzer;
use super::sampler::{Sampler, SamplingEnd, SamplingPlan, SamplingStats};
use super::synthesizer::{SummaryProgress, SummarySynthesizer};
use super::types::{
    AnalysisSession, FrameObservation, FrameSample, PipelineEvent, SessionSummary,
    SourceDescriptor, SummaryStatus,
};
use crate::infra::config::Config;
use crate::infra::errors::ActionLensError;
use crate::provider::ModelProvider;
use crate::report::{Report, ReportStore};
use crate::source::{FileSource, FrameSource, LiveSource};

/// Drives one analysis run at a time against a shared provider and store.
pub struct Orchestrator {
    provider: Arc<dyn ModelProvider>,
    config: Config,
    store: ReportStore,
    /// Optional callback for real-time progress events.
    on_progress: Option<Box<dyn Fn(PipelineEvent) + Send + Sync>>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn ModelProvider>, config: Config) -> Self {
        let store = ReportStore::new(config.reports.resolved_dir());
        Self {
            provider,
            config,
            store,
            on_progress: None,
        }
    }

    pub fn with_store(mut self, store: ReportStore) -> Self {
        self.store = store;
        self
    }

    /// Set a callback for real-time progress events.
    pub fn with_progress(mut self, cb: impl Fn(PipelineEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fire a progress event if a callback is set.
    fn emit(&self, event: PipelineEvent) {
        if let Some(ref cb) = self.on_progress {
            cb(event);
        }
    }

    /// Sample and analyze a video file.
    pub async fn run_file_analysis(
        &self,
        path: &Path,
        interval: u32,
        model: &str,
    ) -> Result<AnalysisSession, ActionLensError> {
        let plan = SamplingPlan::every(interval);
        check_plan(&plan)?;
        let path: PathBuf = path.to_path_buf();
        let source = tokio::task::spawn_blocking(move || FileSource::open(&path))
            .await
            .map_err(|e| anyhow::anyhow!("source open task failed: {e}"))??;
        self.run_source(source, plan, model).await
    }

    /// Sample and analyze the configured capture device until `duration`
    /// elapses or `cancel` fires. Whatever was collected is kept.
    pub async fn run_live_analysis(
        &self,
        duration: Duration,
        interval: u32,
        model: &str,
        cancel: CancellationToken,
    ) -> Result<AnalysisSession, ActionLensError> {
        let plan = SamplingPlan::every(interval)
            .with_deadline(duration)
            .with_cancel(cancel);
        check_plan(&plan)?;
        let live = self.config.live.clone();
        let source = tokio::task::spawn_blocking(move || LiveSource::open(&live))
            .await
            .map_err(|e| anyhow::anyhow!("source open task failed: {e}"))??;
        self.run_source(source, plan, model).await
    }

    /// Run the pipeline over an already-open source.
    ///
    /// Sampling happens on a blocking thread and feeds a bounded channel;
    /// at most `analysis.max_concurrency` frames are analyzed at once.
    pub async fn run_source<S>(
        &self,
        source: S,
        plan: SamplingPlan,
        model: &str,
    ) -> Result<AnalysisSession, ActionLensError>
    where
        S: FrameSource + 'static,
    {
        let descriptor = SourceDescriptor {
            kind: source.kind(),
            location: source.descriptor().to_string(),
            fps: source.info().fps,
            total_frames: source.info().total_frames,
        };
        let sampler = Sampler::new(source, plan)?;
        let mut session = AnalysisSession::new(descriptor.clone(), sampler.stride(), model);

        tracing::info!(
            session_id = session.session_id(),
            source = %descriptor.location,
            kind = %descriptor.kind,
            interval = session.interval(),
            model,
            "Analysis started"
        );
        self.emit(PipelineEvent::SourceOpened {
            descriptor: descriptor.location.clone(),
            kind: descriptor.kind,
            total_frames: descriptor.total_frames,
            fps: descriptor.fps,
        });

        let concurrency = self.config.analysis.max_concurrency.max(1);
        let (tx, mut rx) = mpsc::channel::<FrameSample>(concurrency);
        let runtime = Handle::current();
        let producer = tokio::task::spawn_blocking(move || produce(sampler, tx, runtime));

        let analyzer = Arc::new(
            FrameAnalyzer::new(self.provider.clone(), model, self.config.analysis.clone())
                .with_total_frames(descriptor.total_frames),
        );
        let aggregator = Aggregator::new();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks: JoinSet<FrameObservation> = JoinSet::new();

        while let Some(sample) = rx.recv().await {
            self.emit(PipelineEvent::FrameSampled {
                index: sample.index,
                frame_number: sample.frame_number,
                timestamp: sample.timestamp,
            });
            aggregator.register(&sample);

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| anyhow::anyhow!("analysis pool closed: {e}"))?;
            let analyzer = analyzer.clone();
            let aggregator = aggregator.clone();
            tasks.spawn(async move {
                let observation = analyzer.analyze(sample).await;
                drop(permit);
                aggregator.insert(observation.clone());
                observation
            });

            while let Some(done) = tasks.try_join_next() {
                self.report_analyzed(done);
            }
        }

        let stats: SamplingStats = producer
            .await
            .map_err(|e| anyhow::anyhow!("sampler task failed: {e}"))?;
        if let SamplingEnd::SourceError(ref reason) = stats.end {
            tracing::warn!(
                session_id = session.session_id(),
                "Source failed mid-stream, keeping {} sample(s): {}",
                stats.sampled,
                reason
            );
        }
        self.emit(PipelineEvent::SamplingFinished {
            sampled: stats.sampled,
            stopped_early: stats.end.is_early(),
        });

        while let Some(done) = tasks.join_next().await {
            self.report_analyzed(done);
        }

        let observations = aggregator.finalize();
        session.collect(observations, stats.duration_secs, stats.end.is_early())?;

        tracing::info!(
            session_id = session.session_id(),
            sampled = session.observations().len(),
            failed = session.failed_count(),
            "Analysis collected"
        );
        Ok(session)
    }

    fn report_analyzed(&self, done: Result<FrameObservation, tokio::task::JoinError>) {
        match done {
            Ok(obs) => {
                let (detail, ok) = match obs.failure_reason() {
                    None => (obs.text.clone(), true),
                    Some(reason) => (reason.to_string(), false),
                };
                self.emit(PipelineEvent::FrameAnalyzed {
                    index: obs.sample_index,
                    frame_number: obs.frame_number,
                    timestamp: obs.timestamp,
                    detail,
                    ok,
                });
            }
            // The aggregator still holds the sample as pending; finalize
            // records it as failed.
            Err(e) => tracing::error!("Frame analysis task failed: {}", e),
        }
    }

    /// Summarize a collected session and persist it.
    ///
    /// Zero successful frames is `EmptyTimeline`. A summary failure still
    /// saves the report with the timeline and an unavailable summary.
    pub async fn finalize_and_summarize(
        &self,
        mut session: AnalysisSession,
    ) -> Result<Report, ActionLensError> {
        if session.success_count() == 0 {
            session.mark_failed();
            return Err(ActionLensError::EmptyTimeline {
                session_id: session.session_id().to_string(),
                sampled: session.observations().len(),
                failed: session.failed_count(),
            });
        }

        let summary_model = self
            .config
            .summary
            .model
            .clone()
            .unwrap_or_else(|| session.model_id().to_string());
        self.emit(PipelineEvent::SummaryStarted {
            model: summary_model.clone(),
        });

        let synthesizer = SummarySynthesizer::new(
            self.provider.clone(),
            summary_model,
            self.config.summary.clone(),
        );
        let on_progress = |progress: SummaryProgress<'_>| match progress {
            SummaryProgress::Chunk(text) => self.emit(PipelineEvent::SummaryChunk {
                text: text.to_string(),
            }),
            SummaryProgress::Restarted => self.emit(PipelineEvent::SummaryRestarted),
        };
        let summary = match synthesizer
            .synthesize(session.observations(), session.duration_secs(), &on_progress)
            .await
        {
            Ok(out) => SessionSummary {
                text: out.text,
                executive_brief: out.executive_brief,
                model: Some(out.model),
                status: SummaryStatus::Complete,
            },
            Err(e) => {
                tracing::warn!(
                    session_id = session.session_id(),
                    "Summary unavailable, saving timeline only: {}",
                    e
                );
                SessionSummary::unavailable(e.to_string())
            }
        };
        self.emit(PipelineEvent::SummaryFinished {
            ok: summary.status == SummaryStatus::Complete,
        });

        session.finalize(summary)?;
        let store = self.store.clone();
        let report = tokio::task::spawn_blocking(move || store.save(&session))
            .await
            .map_err(|e| anyhow::anyhow!("report save task failed: {e}"))??;

        tracing::info!(filename = %report.filename(), "Report saved");
        self.emit(PipelineEvent::ReportSaved {
            filename: report.filename().to_string(),
        });
        Ok(report)
    }
}

fn check_plan(plan: &SamplingPlan) -> Result<(), ActionLensError> {
    if plan.stride == 0 {
        return Err(ActionLensError::InvalidInput(
            "frame interval must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Blocking producer: walk the sampler and push samples until it ends or the
/// consumer goes away. A hand-off stuck on a full channel still gives way to
/// cancellation and the deadline; the undelivered sample is not counted.
fn produce<S: FrameSource>(
    mut sampler: Sampler<S>,
    tx: mpsc::Sender<FrameSample>,
    runtime: Handle,
) -> SamplingStats {
    let cancel = sampler.cancel_token();
    let deadline = sampler.deadline().map(tokio::time::Instant::from_std);
    let mut delivered = 0;

    while let Some(item) = sampler.next() {
        match item {
            Ok(sample) => {
                let sent = runtime.block_on(async {
                    let expired = async {
                        match deadline {
                            Some(at) => tokio::time::sleep_until(at).await,
                            None => std::future::pending::<()>().await,
                        }
                    };
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => false,
                        _ = expired => false,
                        sent = tx.send(sample) => sent.is_ok(),
                    }
                });
                if !sent {
                    sampler.interrupt();
                    break;
                }
                delivered += 1;
            }
            Err(e) => {
                tracing::warn!("Frame read failed: {}", e);
                break;
            }
        }
    }

    let mut stats = sampler.finish();
    stats.sampled = delivered;
    stats
}
