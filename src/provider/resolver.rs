// src/provider/resolver.rs — Build the configured inference provider

use std::sync::Arc;
use std::time::Duration;

use super::openai_compat::OpenAICompatProvider;
use super::retry::{RetryConfig, RetryProvider};
use super::ModelProvider;
use crate::infra::config::Config;
use crate::infra::errors::ActionLensError;

/// Secondary env var checked when the configured one is unset.
pub const FALLBACK_KEY_ENV: &str = "ACTIONLENS_API_KEY";

/// Resolve the API key: configured env var first, then `ACTIONLENS_API_KEY`.
pub fn resolve_api_key(config: &Config) -> Option<String> {
    resolve_api_key_with(config, |name| std::env::var(name).ok())
}

fn resolve_api_key_with(
    config: &Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    [config.provider.api_key_env.as_str(), FALLBACK_KEY_ENV]
        .into_iter()
        .filter_map(|name| lookup(name))
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}

/// Short provider id derived from the endpoint host (`api.groq.com` → `groq`).
/// IP hosts are kept whole; unparsable URLs are `custom`.
fn provider_id(base_url: &str) -> String {
    let Ok(parsed) = url::Url::parse(base_url) else {
        return "custom".into();
    };
    match parsed.host() {
        Some(url::Host::Domain(domain)) => {
            let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
            match labels.len() {
                0 => "custom".into(),
                1 => labels[0].to_string(),
                n => labels[n - 2].to_string(),
            }
        }
        Some(url::Host::Ipv4(ip)) => ip.to_string(),
        Some(url::Host::Ipv6(ip)) => ip.to_string(),
        None => "custom".into(),
    }
}

/// Build the retry-wrapped provider every component shares.
pub fn build_provider(config: &Config) -> Result<Arc<dyn ModelProvider>, ActionLensError> {
    let api_key = resolve_api_key(config).ok_or_else(|| ActionLensError::NoProvider {
        env_var: config.provider.api_key_env.clone(),
    })?;

    let id = provider_id(&config.provider.base_url);
    tracing::debug!(provider = %id, base_url = %config.provider.base_url, "Using provider");

    let inner: Arc<dyn ModelProvider> = Arc::new(OpenAICompatProvider::new(
        id.clone(),
        id,
        api_key,
        config.provider.base_url.clone(),
        Duration::from_secs(config.provider.timeout_secs),
    ));
    Ok(Arc::new(RetryProvider::with_config(
        inner,
        RetryConfig::from(&config.retry),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_from_url() {
        assert_eq!(provider_id("https://api.groq.com/openai/v1"), "groq");
        assert_eq!(provider_id("https://api.openai.com/v1"), "openai");
        assert_eq!(provider_id("http://localhost:8000/v1"), "localhost");
    }

    #[test]
    fn test_provider_id_keeps_ip_hosts() {
        assert_eq!(provider_id("http://127.0.0.1:8000/v1"), "127.0.0.1");
        assert_eq!(provider_id("http://[::1]:11434/v1"), "::1");
    }

    #[test]
    fn test_provider_id_unparsable_is_custom() {
        assert_eq!(provider_id("not a url"), "custom");
        assert_eq!(provider_id(""), "custom");
    }

    #[test]
    fn test_key_prefers_configured_env() {
        let config = Config::default();
        let key = resolve_api_key_with(&config, |name| match name {
            "GROQ_API_KEY" => Some("primary".into()),
            FALLBACK_KEY_ENV => Some("secondary".into()),
            _ => None,
        });
        assert_eq!(key.as_deref(), Some("primary"));
    }

    #[test]
    fn test_key_falls_back_and_skips_blank() {
        let config = Config::default();
        let key = resolve_api_key_with(&config, |name| match name {
            "GROQ_API_KEY" => Some("   ".into()),
            FALLBACK_KEY_ENV => Some("secondary".into()),
            _ => None,
        });
        assert_eq!(key.as_deref(), Some("secondary"));
    }

    #[test]
    fn test_no_key() {
        let config = Config::default();
        assert!(resolve_api_key_with(&config, |_| None).is_none());
    }
}
