// src/provider/mod.rs — Remote inference service layer

pub mod fallback;
pub mod openai_compat;
pub mod resolver;
pub mod retry;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::infra::errors::ActionLensError;

/// Boxed stream of incremental text chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, ActionLensError>> + Send>>;

/// Core trait every inference backend implements.
///
/// `chat` is the single-shot call; `chat_stream` yields text deltas as the
/// service produces them. Dropping the stream releases the underlying request.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ActionLensError>;

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream, ActionLensError>;
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone)]
pub struct ChatChunk {
    pub delta: String,
    pub usage: Option<TokenUsage>,
}

/// JPEG (or other) image sent inline with a user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub base64_data: String,
}

impl InlineImage {
    pub fn jpeg(base64_data: impl Into<String>) -> Self {
        Self {
            mime_type: "image/jpeg".into(),
            base64_data: base64_data.into(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub image: Option<InlineImage>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            image: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image: None,
        }
    }

    /// User message carrying a prompt plus one inline image.
    pub fn user_with_image(content: impl Into<String>, image: InlineImage) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image: Some(image),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ContentFilter,
    #[default]
    Unknown,
}

impl StopReason {
    pub fn from_finish_reason(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => StopReason::EndTurn,
            Some("length") => StopReason::MaxTokens,
            Some("content_filter") => StopReason::ContentFilter,
            _ => StopReason::Unknown,
        }
    }
}
