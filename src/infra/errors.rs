// src/infra/errors.rs — Error types for ActionLens

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ActionLensError {
    // Inference service errors (retriable when flagged)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    // Pipeline errors
    #[error("Video source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("Session {session_id} has no usable frames ({failed} of {sampled} failed)")]
    EmptyTimeline {
        session_id: String,
        sampled: usize,
        failed: usize,
    },

    #[error("Summary unavailable: {0}")]
    SummaryUnavailable(String),

    #[error("Chat unavailable: {0}")]
    ChatUnavailable(String),

    #[error("Report '{filename}' not found")]
    ReportNotFound { filename: String },

    // User errors
    #[error("No API key found. Set {env_var} or ACTIONLENS_API_KEY.")]
    NoProvider { env_var: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ActionLensError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ActionLensError::Provider {
                retriable: true,
                ..
            } | ActionLensError::RateLimited { .. }
        )
    }

    /// The provider rejected the model itself (retired or unknown), so another
    /// model may still succeed.
    pub fn is_model_unavailable(&self) -> bool {
        match self {
            ActionLensError::Provider {
                message,
                retriable: false,
                ..
            } => {
                let lower = message.to_lowercase();
                lower.contains("decommissioned")
                    || lower.contains("no longer supported")
                    || lower.contains("model_not_found")
                    || lower.contains("does not exist")
            }
            _ => false,
        }
    }
}
