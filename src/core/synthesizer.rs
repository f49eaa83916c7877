// src/core/synthesizer.rs — Summary synthesis over the finished timeline

use std::sync::Arc;

use futures::StreamExt;

use super::aggregator::timeline_line;
use super::types::FrameObservation;
use crate::infra::config::SummaryConfig;
use crate::infra::errors::ActionLensError;
use crate::provider::fallback::ModelFallback;
use crate::provider::retry::{classify, ErrorClass};
use crate::provider::{ChatRequest, ChunkStream, Message, ModelProvider};

/// Final summary text plus the optional executive brief.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutput {
    pub text: String,
    pub executive_brief: Option<String>,
    pub model: String,
}

/// Streaming summary call, with the model that accepted it.
pub struct SummaryStream {
    pub model: String,
    pub request: ChatRequest,
    pub chunks: ChunkStream,
}

/// Incremental summary output seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryProgress<'a> {
    Chunk(&'a str),
    /// Everything streamed so far is discarded.
    Restarted,
}

pub struct SummarySynthesizer {
    provider: Arc<dyn ModelProvider>,
    model: String,
    settings: SummaryConfig,
}

impl SummarySynthesizer {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>, settings: SummaryConfig) -> Self {
        Self {
            provider,
            model: model.into(),
            settings,
        }
    }

    fn chain(&self) -> ModelFallback {
        ModelFallback::new(self.provider.clone(), &self.model, &self.settings.fallback_models)
    }

    fn report_request(&self, observations: &[FrameObservation], duration_secs: f64) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(report_prompt(observations, duration_secs))],
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
            system: None,
        }
    }

    /// Open the streamed report call. Only successful observations are used.
    pub async fn stream(
        &self,
        observations: &[FrameObservation],
        duration_secs: f64,
    ) -> Result<SummaryStream, ActionLensError> {
        let successes: Vec<FrameObservation> =
            observations.iter().filter(|o| o.is_ok()).cloned().collect();
        if successes.is_empty() {
            return Err(ActionLensError::SummaryUnavailable(
                "no successful observations to summarize".into(),
            ));
        }
        let request = self.report_request(&successes, duration_secs);
        let (model, chunks) = self
            .chain()
            .chat_stream(request.clone())
            .await
            .map_err(unavailable)?;
        Ok(SummaryStream {
            request: ChatRequest {
                model: model.clone(),
                ..request
            },
            model,
            chunks,
        })
    }

    /// Run the whole summary step, forwarding text chunks to `on_progress` as
    /// they arrive. A transient stream failure is reported as `Restarted`
    /// followed by the regenerated text in one chunk.
    pub async fn synthesize(
        &self,
        observations: &[FrameObservation],
        duration_secs: f64,
        on_progress: &(dyn Fn(SummaryProgress<'_>) + Send + Sync),
    ) -> Result<SummaryOutput, ActionLensError> {
        let SummaryStream {
            model,
            request,
            mut chunks,
        } = self.stream(observations, duration_secs).await?;

        let mut text = String::new();
        let mut interrupted = None;
        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    if !chunk.delta.is_empty() {
                        on_progress(SummaryProgress::Chunk(&chunk.delta));
                        text.push_str(&chunk.delta);
                    }
                }
                Err(e) => {
                    interrupted = Some(e);
                    break;
                }
            }
        }
        drop(chunks);

        if let Some(e) = interrupted {
            if classify(&e) == ErrorClass::NonRetriable {
                return Err(unavailable(e));
            }
            tracing::warn!(model = %model, "Summary stream interrupted, retrying without streaming: {}", e);
            on_progress(SummaryProgress::Restarted);
            let response = self.provider.chat(request).await.map_err(unavailable)?;
            text = response.content;
            if !text.is_empty() {
                on_progress(SummaryProgress::Chunk(&text));
            }
        }

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ActionLensError::SummaryUnavailable(
                "model returned an empty summary".into(),
            ));
        }

        let executive_brief = if self.settings.executive_brief {
            self.executive_brief(&model, &text).await
        } else {
            None
        };

        Ok(SummaryOutput {
            text,
            executive_brief,
            model,
        })
    }

    /// 2-3 sentence brief. Failure only drops the brief.
    async fn executive_brief(&self, model: &str, report: &str) -> Option<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![Message::user(brief_prompt(report))],
            max_tokens: Some(self.settings.brief_max_tokens),
            temperature: Some(self.settings.temperature),
            system: None,
        };
        match self.provider.chat(request).await {
            Ok(resp) => {
                let brief = resp.content.trim().to_string();
                (!brief.is_empty()).then_some(brief)
            }
            Err(e) => {
                tracing::warn!("Could not generate executive summary: {}", e);
                None
            }
        }
    }
}

fn unavailable(e: ActionLensError) -> ActionLensError {
    match e {
        ActionLensError::SummaryUnavailable(_) => e,
        other => ActionLensError::SummaryUnavailable(other.to_string()),
    }
}

/// Aggregation prompt over ordered successful observations.
pub fn report_prompt(observations: &[FrameObservation], duration_secs: f64) -> String {
    let combined = observations
        .iter()
        .map(timeline_line)
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Based on the following frame-by-frame analysis of a video ({duration_secs:.1} seconds), \
         create a comprehensive summary report:\n\n\
         {combined}\n\n\
         Please provide:\n\
         1. Overall summary of the actions and activities observed\n\
         2. Key moments and notable events\n\
         3. Description of participants/objects\n\
         4. Timeline of main activities\n\
         5. Any patterns or trends noticed\n\n\
         Format as a clear, structured report."
    )
}

pub fn brief_prompt(report: &str) -> String {
    format!(
        "Based on the following comprehensive video analysis report, create a brief executive \
         summary (2-3 sentences) that captures the most important points:\n\n\
         {report}\n\n\
         Provide a concise summary that highlights:\n\
         - Main activities and actions\n\
         - Key participants or objects\n\
         - Most notable events or moments\n\n\
         Keep it brief and to the point."
    )
}
