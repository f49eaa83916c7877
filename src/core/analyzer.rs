// src/core/analyzer.rs — Per-frame vision analysis

use std::sync::Arc;

use super::frame;
use super::types::{FrameObservation, FrameSample};
use crate::infra::config::AnalysisConfig;
use crate::infra::errors::ActionLensError;
use crate::provider::{ChatRequest, Message, ModelProvider};

/// Turns one `FrameSample` into one `FrameObservation`.
///
/// Never fails: transport and service errors become a failed observation so
/// a single bad frame cannot abort the run. Transient errors have already been
/// retried by the provider's retry wrapper by the time they reach here.
pub struct FrameAnalyzer {
    provider: Arc<dyn ModelProvider>,
    model: String,
    settings: AnalysisConfig,
    total_frames: Option<u64>,
}

impl FrameAnalyzer {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>, settings: AnalysisConfig) -> Self {
        Self {
            provider,
            model: model.into(),
            settings,
            total_frames: None,
        }
    }

    /// Include "frame n/total" in prompts.
    pub fn with_total_frames(mut self, total_frames: Option<u64>) -> Self {
        self.total_frames = total_frames;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn analyze(&self, sample: FrameSample) -> FrameObservation {
        let FrameSample {
            index,
            frame_number,
            timestamp,
            width,
            height,
            pixels,
        } = sample;

        match self.describe(frame_number, pixels, width, height).await {
            Ok(text) => {
                tracing::debug!(sample_index = index, frame_number, "Frame analyzed");
                FrameObservation::succeeded(index, frame_number, timestamp, text)
            }
            Err(e) => {
                let reason = failure_reason(&e, &self.model);
                tracing::warn!(sample_index = index, frame_number, "Frame analysis failed: {}", reason);
                FrameObservation::failed(index, frame_number, timestamp, reason)
            }
        }
    }

    async fn describe(
        &self,
        frame_number: u64,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
    ) -> Result<String, ActionLensError> {
        let max_dimension = self.settings.max_dimension;
        let quality = self.settings.jpeg_quality;
        let image = tokio::task::spawn_blocking(move || {
            frame::to_inline_image(pixels, width, height, max_dimension, quality)
        })
        .await
        .map_err(|e| anyhow::anyhow!("frame encoding task failed: {e}"))??;

        let prompt = frame_prompt(frame_number, self.total_frames);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user_with_image(prompt, image)],
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
            system: None,
        };

        let response = self.provider.chat(request).await?;
        let text = response.content.trim();
        if text.is_empty() {
            return Err(ActionLensError::Provider {
                provider: self.provider.id().to_string(),
                message: "empty description returned".into(),
                retriable: false,
            });
        }
        Ok(text.to_string())
    }
}

/// Instruction sent with every frame.
pub fn frame_prompt(frame_number: u64, total_frames: Option<u64>) -> String {
    let progress = match total_frames {
        Some(total) => format!(" ({frame_number}/{total})"),
        None => format!(" (Frame {frame_number})"),
    };
    format!(
        "Analyze this video frame and describe:\n\
         1. What actions or activities are visible\n\
         2. Who or what is in the frame\n\
         3. Any notable movements or gestures\n\
         4. The context or setting\n\
         \n\
         Frame{progress}:"
    )
}

/// Human-readable failure reason, with a hint when the model seems to lack
/// image input.
pub fn failure_reason(error: &ActionLensError, model: &str) -> String {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if lower.contains("vision") || lower.contains("image") {
        format!("{message} (model '{model}' may not support vision input)")
    } else {
        message
    }
}
