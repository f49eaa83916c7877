// src/provider/fallback.rs — Model fallback chain for retired models

use std::sync::Arc;

use super::{ChatRequest, ChatResponse, ChunkStream, ModelProvider};
use crate::infra::errors::ActionLensError;

/// Ordered list of models to try on one provider. The next candidate is only
/// used when the provider rejects the current model itself; every other error
/// is returned straight away.
pub struct ModelFallback {
    provider: Arc<dyn ModelProvider>,
    candidates: Vec<String>,
}

impl ModelFallback {
    pub fn new(provider: Arc<dyn ModelProvider>, primary: &str, fallbacks: &[String]) -> Self {
        let mut candidates = vec![primary.to_string()];
        for model in fallbacks {
            if !candidates.contains(model) {
                candidates.push(model.clone());
            }
        }
        Self {
            provider,
            candidates,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Run a chat request through the chain. Returns the model that answered.
    pub async fn chat(
        &self,
        mut request: ChatRequest,
    ) -> Result<(String, ChatResponse), ActionLensError> {
        let mut last_error = None;
        for model in &self.candidates {
            request.model = model.clone();
            match self.provider.chat(request.clone()).await {
                Ok(response) => return Ok((model.clone(), response)),
                Err(e) if e.is_model_unavailable() => {
                    tracing::warn!(model = %model, "Model unavailable, trying fallback: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            ActionLensError::Config("no summary model configured".into())
        }))
    }

    /// Open a stream through the chain. Returns the model that accepted it.
    pub async fn chat_stream(
        &self,
        mut request: ChatRequest,
    ) -> Result<(String, ChunkStream), ActionLensError> {
        let mut last_error = None;
        for model in &self.candidates {
            request.model = model.clone();
            match self.provider.chat_stream(request.clone()).await {
                Ok(stream) => return Ok((model.clone(), stream)),
                Err(e) if e.is_model_unavailable() => {
                    tracing::warn!(model = %model, "Model unavailable, trying fallback: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            ActionLensError::Config("no summary model configured".into())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{StopReason, TokenUsage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Rejects every model listed in `retired`, records the models it saw.
    struct RetiringProvider {
        retired: Vec<String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelProvider for RetiringProvider {
        fn id(&self) -> &str {
            "retiring"
        }
        fn name(&self) -> &str {
            "Retiring"
        }
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ActionLensError> {
            self.seen.lock().unwrap().push(req.model.clone());
            if self.retired.contains(&req.model) {
                return Err(ActionLensError::Provider {
                    provider: "retiring".into(),
                    message: format!("The model `{}` has been decommissioned", req.model),
                    retriable: false,
                });
            }
            Ok(ChatResponse {
                content: format!("answered by {}", req.model),
                usage: TokenUsage::default(),
                stop_reason: StopReason::EndTurn,
            })
        }
        async fn chat_stream(&self, req: ChatRequest) -> Result<ChunkStream, ActionLensError> {
            Err(ActionLensError::Provider {
                provider: "retiring".into(),
                message: format!("bad request for {}", req.model),
                retriable: false,
            })
        }
    }

    #[test]
    fn test_candidates_deduplicated() {
        let provider = Arc::new(RetiringProvider {
            retired: vec![],
            seen: Mutex::new(vec![]),
        });
        let chain = ModelFallback::new(provider, "a", &["b".into(), "a".into()]);
        assert_eq!(chain.candidates(), &["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_falls_back_on_retired_model() {
        let provider = Arc::new(RetiringProvider {
            retired: vec!["old".into()],
            seen: Mutex::new(vec![]),
        });
        let chain = ModelFallback::new(provider.clone(), "old", &["new".into()]);
        let (model, resp) = chain.chat(ChatRequest::default()).await.unwrap();
        assert_eq!(model, "new");
        assert_eq!(resp.content, "answered by new");
        assert_eq!(*provider.seen.lock().unwrap(), vec!["old", "new"]);
    }

    #[tokio::test]
    async fn test_other_errors_do_not_fall_back() {
        let provider = Arc::new(RetiringProvider {
            retired: vec![],
            seen: Mutex::new(vec![]),
        });
        let chain = ModelFallback::new(provider, "a", &["b".into()]);
        let err = match chain.chat_stream(ChatRequest::default()).await {
            Ok(_) => panic!("stream should fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("bad request for a"));
    }
}
