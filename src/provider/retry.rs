// src/provider/retry.rs — Retry with exponential backoff for model providers
//
// Wraps any ModelProvider with automatic retry on transient failures.
// Retries: rate limits (429), server errors (5xx), timeouts, connection resets.
// Does NOT retry: bad request (400), auth errors (401, 403), unknown model,
// content-policy refusals.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, ChunkStream, ModelProvider};
use crate::infra::config::RetrySettings;
use crate::infra::errors::ActionLensError;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter_fraction: 0.2,
        }
    }
}

/// How a failed inference call should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network trouble, timeouts, throttling, overloaded service.
    Transient,
    /// Bad model id, rejected payload, refusal. Retrying cannot help.
    NonRetriable,
}

/// Classify an error returned by a provider.
pub fn classify(error: &ActionLensError) -> ErrorClass {
    if error.is_retriable() {
        ErrorClass::Transient
    } else {
        ErrorClass::NonRetriable
    }
}

/// A provider wrapper that adds retry with exponential backoff.
///
/// Delegates to the inner provider, retrying `chat()` and the connection
/// phase of `chat_stream()` on transient errors.
pub struct RetryProvider {
    inner: Arc<dyn ModelProvider>,
    config: RetryConfig,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn ModelProvider>) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(inner: Arc<dyn ModelProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Calculate the delay for a given retry attempt (0-indexed).
    fn delay_for_attempt(&self, attempt: u32, rate_limit_delay: Option<Duration>) -> Duration {
        // If the server told us how long to wait, use that (with a small buffer).
        if let Some(rl_delay) = rate_limit_delay {
            return rl_delay + Duration::from_millis(100);
        }

        let base_ms = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_factor.powi(attempt as i32);
        let capped_ms = base_ms.min(self.config.max_delay.as_millis() as f64);

        let jitter = deterministic_jitter(attempt, self.config.jitter_fraction);
        Duration::from_millis((capped_ms * jitter) as u64)
    }

    /// Shared loop: run `call` until it succeeds, fails non-retriably, or the
    /// attempt cap is hit. The last error is returned as-is.
    async fn with_retries<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, ActionLensError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ActionLensError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if classify(&e) == ErrorClass::NonRetriable
                        || attempt >= self.config.max_retries
                    {
                        return Err(e);
                    }

                    let delay = self.delay_for_attempt(attempt, rate_limit_delay(&e));
                    tracing::warn!(
                        provider = self.inner.id(),
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying {} after error: {}",
                        what,
                        e
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Extract rate-limit retry delay from the error, if available.
fn rate_limit_delay(error: &ActionLensError) -> Option<Duration> {
    match error {
        ActionLensError::RateLimited { retry_after_ms, .. } if *retry_after_ms > 0 => {
            Some(Duration::from_millis(*retry_after_ms))
        }
        _ => None,
    }
}

/// Deterministic jitter for a given attempt to keep retries reproducible in tests.
/// Returns a multiplier in [1 - fraction, 1 + fraction].
fn deterministic_jitter(attempt: u32, fraction: f64) -> f64 {
    let hash = (attempt.wrapping_mul(2654435761)) as f64 / u32::MAX as f64; // 0.0..1.0
    1.0 + fraction * (2.0 * hash - 1.0)
}

#[async_trait]
impl ModelProvider for RetryProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ActionLensError> {
        self.with_retries("chat", || self.inner.chat(request.clone()))
            .await
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream, ActionLensError> {
        // Retry only the initial connection, not mid-stream errors
        self.with_retries("stream", || self.inner.chat_stream(request.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{StopReason, TokenUsage};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(4),
            jitter_fraction: 0.0,
        }
    }

    #[test]
    fn test_classify_rate_limited() {
        let err = ActionLensError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 5000,
        };
        assert_eq!(classify(&err), ErrorClass::Transient);
    }

    #[test]
    fn test_classify_provider_flags() {
        let transient = ActionLensError::Provider {
            provider: "test".into(),
            message: "HTTP 500".into(),
            retriable: true,
        };
        let fatal = ActionLensError::Provider {
            provider: "test".into(),
            message: "HTTP 400 bad request".into(),
            retriable: false,
        };
        assert_eq!(classify(&transient), ErrorClass::Transient);
        assert_eq!(classify(&fatal), ErrorClass::NonRetriable);
    }

    #[test]
    fn test_classify_pipeline_errors_not_retriable() {
        assert_eq!(
            classify(&ActionLensError::SummaryUnavailable("x".into())),
            ErrorClass::NonRetriable
        );
        assert_eq!(
            classify(&ActionLensError::InvalidInput("x".into())),
            ErrorClass::NonRetriable
        );
    }

    #[test]
    fn test_rate_limit_delay_extraction() {
        let err = ActionLensError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 3000,
        };
        assert_eq!(rate_limit_delay(&err), Some(Duration::from_millis(3000)));

        let zero = ActionLensError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 0,
        };
        assert!(rate_limit_delay(&zero).is_none());
    }

    #[test]
    fn test_delay_for_attempt_exponential() {
        let provider = RetryProvider::new(Arc::new(ScriptedProvider::new(0, true)));
        let d0 = provider.delay_for_attempt(0, None);
        let d1 = provider.delay_for_attempt(1, None);
        let d2 = provider.delay_for_attempt(2, None);

        // d0 ≈ 1000ms, d1 ≈ 2000ms, d2 ≈ 4000ms
        assert!(d0.as_millis() >= 800 && d0.as_millis() <= 1200);
        assert!(d1.as_millis() >= 1600 && d1.as_millis() <= 2400);
        assert!(d2.as_millis() >= 3200 && d2.as_millis() <= 4800);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let provider = RetryProvider::new(Arc::new(ScriptedProvider::new(0, true)));
        let d = provider.delay_for_attempt(10, None);
        assert!(d.as_millis() <= 9_600); // max + jitter margin
    }

    #[test]
    fn test_delay_uses_rate_limit_hint() {
        let provider = RetryProvider::new(Arc::new(ScriptedProvider::new(0, true)));
        let d = provider.delay_for_attempt(0, Some(Duration::from_millis(10_000)));
        assert_eq!(d.as_millis(), 10_100);
    }

    #[test]
    fn test_deterministic_jitter_range() {
        for attempt in 0..20 {
            let j = deterministic_jitter(attempt, 0.2);
            assert!(
                (0.8..=1.2).contains(&j),
                "jitter {} out of range for attempt {}",
                j,
                attempt
            );
        }
    }

    #[test]
    fn test_default_config_matches_settings() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.initial_delay, Duration::from_millis(1000));
        assert_eq!(cfg.max_delay, Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let inner = Arc::new(ScriptedProvider::new(2, true));
        let provider = RetryProvider::with_config(inner.clone(), fast_config(3));
        let resp = provider.chat(ChatRequest::default()).await.unwrap();
        assert_eq!(resp.content, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_cap() {
        let inner = Arc::new(ScriptedProvider::new(10, true));
        let provider = RetryProvider::with_config(inner.clone(), fast_config(2));
        let err = provider.chat(ChatRequest::default()).await.unwrap_err();
        assert!(err.is_retriable());
        // One initial attempt plus two retries
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retriable_fails_immediately() {
        let inner = Arc::new(ScriptedProvider::new(10, false));
        let provider = RetryProvider::with_config(inner.clone(), fast_config(5));
        assert!(provider.chat(ChatRequest::default()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    /// Fails the first `failures` calls, then answers "ok".
    struct ScriptedProvider {
        failures: u32,
        retriable: bool,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(failures: u32, retriable: bool) -> Self {
            Self {
                failures,
                retriable,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }
        fn name(&self) -> &str {
            "Scripted"
        }
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, ActionLensError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(ActionLensError::Provider {
                    provider: "scripted".into(),
                    message: format!("failure {n}"),
                    retriable: self.retriable,
                });
            }
            Ok(ChatResponse {
                content: "ok".into(),
                usage: TokenUsage::default(),
                stop_reason: StopReason::EndTurn,
            })
        }
        async fn chat_stream(&self, _req: ChatRequest) -> Result<ChunkStream, ActionLensError> {
            Err(ActionLensError::Provider {
                provider: "scripted".into(),
                message: "no streaming".into(),
                retriable: false,
            })
        }
    }
}
