// src/chat/mod.rs — Follow-up questions about reports or the tool itself

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::infra::config::ChatConfig;
use crate::infra::errors::ActionLensError;
use crate::provider::{ChatRequest, Message, ModelProvider, Role};
use crate::report::{Report, ReportStore};

pub const REPORT_SYSTEM_PROMPT: &str = "You are a precise assistant that answers questions about \
video analysis reports. Use the provided report content to answer. If the question is outside \
the report, say you only know what is in the report. Keep answers concise and actionable.";

pub const PROJECT_SYSTEM_PROMPT: &str = "You are the product guide for ActionLens, a command-line \
tool that samples frames from a video file or a live camera, describes the actions in each \
sampled frame with a vision model, and writes a timeline plus summary report. Explain how to \
analyze a file (`actionlens file <path>`) or record from a camera (`actionlens live`), what the \
frame interval means (one frame analyzed out of every N), the allowed formats (mp4, avi, mov, \
mkv, flv, wmv, webm, m4v), how reports are saved (timeline, summary and metadata files under \
the reports directory, listed with `actionlens reports`), and troubleshooting basics (missing \
API key, ffmpeg not installed, camera not available, models without vision support). Be \
concise, step-by-step when helpful. If you do not know something, say so briefly.";

/// What a conversation is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatScope {
    /// Bound to one stored report.
    ReportBound(String),
    /// General usage guidance.
    ProjectGeneral,
}

/// One prior turn supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub message: String,
}

impl ChatTurn {
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            message: message.into(),
        }
    }

    pub fn assistant(message: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            message: message.into(),
        }
    }
}

/// Builds the context for each turn and sends it to the model.
///
/// Stateless: every call's context is rebuilt from `(scope, history)`.
/// Reports are only read, never modified.
pub struct ChatSessionManager {
    provider: Arc<dyn ModelProvider>,
    store: ReportStore,
    settings: ChatConfig,
}

/// Resolved grounding for one turn.
#[derive(Debug, Clone)]
pub enum ChatContext {
    Report(Box<Report>),
    Project,
}

impl ChatSessionManager {
    pub fn new(provider: Arc<dyn ModelProvider>, store: ReportStore, settings: ChatConfig) -> Self {
        Self {
            provider,
            store,
            settings,
        }
    }

    /// Answer one turn. Service failures that outlast the retry policy come
    /// back as `ChatUnavailable`.
    pub async fn ask(
        &self,
        scope: &ChatScope,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String, ActionLensError> {
        let message = required_message(message)?;
        let context = self.resolve(scope).await?;
        let messages = self.build_messages(&context, message, history)?;
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages,
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
            system: None,
        };
        let response = self.provider.chat(request).await.map_err(|e| match e {
            ActionLensError::Provider { .. } | ActionLensError::RateLimited { .. } => {
                tracing::warn!(scope = ?scope, "Chat turn failed: {}", e);
                ActionLensError::ChatUnavailable(e.to_string())
            }
            other => other,
        })?;
        tracing::debug!(
            scope = ?scope,
            tokens = response.usage.total(),
            "Chat turn answered"
        );
        Ok(response.content.trim().to_string())
    }

    pub async fn ask_about_report(
        &self,
        filename: &str,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String, ActionLensError> {
        self.ask(&ChatScope::ReportBound(filename.to_string()), message, history)
            .await
    }

    pub async fn ask_about_project(
        &self,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String, ActionLensError> {
        self.ask(&ChatScope::ProjectGeneral, message, history).await
    }

    /// Load the bound report off the async runtime.
    pub async fn resolve(&self, scope: &ChatScope) -> Result<ChatContext, ActionLensError> {
        match scope {
            ChatScope::ProjectGeneral => Ok(ChatContext::Project),
            ChatScope::ReportBound(filename) => {
                let store = self.store.clone();
                let filename = filename.clone();
                let report = tokio::task::spawn_blocking(move || store.load(&filename))
                    .await
                    .map_err(|e| anyhow::anyhow!("report load task failed: {e}"))??;
                Ok(ChatContext::Report(Box::new(report)))
            }
        }
    }

    /// Deterministic message list for one turn.
    pub fn build_messages(
        &self,
        context: &ChatContext,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<Vec<Message>, ActionLensError> {
        let message = required_message(message)?;

        let mut messages = Vec::new();
        match context {
            ChatContext::Report(report) => {
                messages.push(Message::system(REPORT_SYSTEM_PROMPT));
                messages.push(Message::user(format!(
                    "Here is the report to use:\n\n{}",
                    report_excerpt(&report.render(), self.settings.max_context_chars)
                )));
            }
            ChatContext::Project => {
                messages.push(Message::system(PROJECT_SYSTEM_PROMPT));
            }
        }

        let skip = history.len().saturating_sub(self.settings.max_history_turns);
        for turn in &history[skip..] {
            match turn.role {
                Role::User => messages.push(Message::user(turn.message.clone())),
                Role::Assistant => messages.push(Message::assistant(turn.message.clone())),
                Role::System => {}
            }
        }
        messages.push(Message::user(message));
        Ok(messages)
    }
}

fn required_message(message: &str) -> Result<&str, ActionLensError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ActionLensError::InvalidInput("Message is required".into()));
    }
    Ok(message)
}

/// Report text cut to at most `max_chars` characters, marked when cut.
pub fn report_excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}\n\n[report truncated]", &text[..cut]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(settings: ChatConfig) -> ChatSessionManager {
        struct Unused;
        #[async_trait::async_trait]
        impl ModelProvider for Unused {
            fn id(&self) -> &str {
                "unused"
            }
            fn name(&self) -> &str {
                "Unused"
            }
            async fn chat(
                &self,
                _req: ChatRequest,
            ) -> Result<crate::provider::ChatResponse, ActionLensError> {
                unimplemented!()
            }
            async fn chat_stream(
                &self,
                _req: ChatRequest,
            ) -> Result<crate::provider::ChunkStream, ActionLensError> {
                unimplemented!()
            }
        }
        ChatSessionManager::new(
            Arc::new(Unused),
            ReportStore::new("/nonexistent/actionlens/reports"),
            settings,
        )
    }

    #[test]
    fn test_empty_message_rejected() {
        let m = manager(ChatConfig::default());
        let err = m
            .build_messages(&ChatContext::Project, "   ", &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: Message is required");
    }

    #[test]
    fn test_project_scope_messages() {
        let m = manager(ChatConfig::default());
        let history = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")];
        let msgs = m
            .build_messages(&ChatContext::Project, " what formats? ", &history)
            .unwrap();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.contains("product guide"));
        assert_eq!(msgs[1].content, "hi");
        assert_eq!(msgs[2].role, Role::Assistant);
        assert_eq!(msgs[3].content, "what formats?");
    }

    #[test]
    fn test_history_bounded() {
        let m = manager(ChatConfig {
            max_history_turns: 2,
            ..ChatConfig::default()
        });
        let history: Vec<ChatTurn> = (0..5).map(|i| ChatTurn::user(format!("t{i}"))).collect();
        let msgs = m
            .build_messages(&ChatContext::Project, "now", &history)
            .unwrap();
        let contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1..], ["t3", "t4", "now"]);
    }

    #[tokio::test]
    async fn test_missing_report_is_not_found() {
        let m = manager(ChatConfig::default());
        let err = m
            .resolve(&ChatScope::ReportBound("missing.txt".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionLensError::ReportNotFound { .. }));
    }

    #[test]
    fn test_report_excerpt_cuts_on_char_boundary() {
        let text = "[Frame 0 at 0.0s]: Un café près de la fenêtre";
        assert_eq!(report_excerpt(text, 100), text);
        assert_eq!(
            report_excerpt(text, 23),
            "[Frame 0 at 0.0s]: Un c\n\n[report truncated]"
        );
        assert_eq!(
            report_excerpt(text, 24),
            "[Frame 0 at 0.0s]: Un ca\n\n[report truncated]"
        );
        assert_eq!(
            report_excerpt(text, 25),
            "[Frame 0 at 0.0s]: Un caf\n\n[report truncated]"
        );
        // 'é' is two bytes; the cut lands after it, not inside it.
        assert_eq!(
            report_excerpt(text, 26),
            "[Frame 0 at 0.0s]: Un café\n\n[report truncated]"
        );
    }
}
