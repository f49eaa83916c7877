// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub live: LiveConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub reports: ReportsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// OpenAI-compatible endpoint (must accept image_url content parts).
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".into(),
            api_key_env: "GROQ_API_KEY".into(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub model: String,
    /// Analyze every Nth frame.
    pub frame_interval: u32,
    /// Max simultaneous frame-analysis requests.
    pub max_concurrency: usize,
    pub jpeg_quality: u8,
    /// Longest edge in pixels; larger frames are downscaled before upload.
    pub max_dimension: u32,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: "meta-llama/llama-4-scout-17b-16e-instruct".into(),
            frame_interval: 30,
            max_concurrency: 4,
            jpeg_quality: 80,
            max_dimension: 1024,
            temperature: 0.7,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub duration_secs: u64,
    /// Capture device (`/dev/video0`, `0`, `video=...`).
    pub device: String,
    /// ffmpeg input format (`v4l2`, `avfoundation`, `dshow`).
    pub input_format: String,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

impl Default for LiveConfig {
    fn default() -> Self {
        let (input_format, device) = if cfg!(target_os = "macos") {
            ("avfoundation", "0")
        } else if cfg!(target_os = "windows") {
            ("dshow", "video=Integrated Camera")
        } else {
            ("v4l2", "/dev/video0")
        };
        Self {
            duration_secs: 30,
            device: device.into(),
            input_format: input_format.into(),
            width: 640,
            height: 480,
            framerate: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Defaults to the analysis model when unset.
    pub model: Option<String>,
    /// Tried in order when the summary model has been retired.
    pub fallback_models: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub executive_brief: bool,
    pub brief_max_tokens: u32,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            model: None,
            fallback_models: default_fallback_models(),
            max_tokens: 1024,
            temperature: 0.7,
            executive_brief: true,
            brief_max_tokens: 256,
        }
    }
}

fn default_fallback_models() -> Vec<String> {
    vec!["llama-3.1-70b-versatile".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_history_turns: usize,
    pub max_context_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-oss-120b".into(),
            temperature: 0.3,
            max_tokens: 800,
            max_history_turns: 20,
            max_context_chars: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportsConfig {
    pub dir: Option<String>,
}

impl ReportsConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => PathBuf::from(dir),
            None => paths::reports_dir(),
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Model used for the summary call.
    pub fn summary_model(&self) -> &str {
        self.summary
            .model
            .as_deref()
            .unwrap_or(&self.analysis.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.analysis.frame_interval, 30);
        assert_eq!(c.analysis.max_concurrency, 4);
        assert_eq!(c.live.duration_secs, 30);
        assert_eq!(c.retry.max_retries, 3);
        assert!(c.summary.executive_brief);
        assert_eq!(c.chat.model, "openai/gpt-oss-120b");
        assert!((c.chat.temperature - 0.3).abs() < 0.001);
    }

    #[test]
    fn test_summary_model_falls_back_to_analysis_model() {
        let mut c = Config::default();
        assert_eq!(c.summary_model(), c.analysis.model);
        c.summary.model = Some("llama-3.3-70b-versatile".into());
        assert_eq!(c.summary_model(), "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.analysis.frame_interval, 30);
        assert_eq!(config.provider.api_key_env, "GROQ_API_KEY");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[provider]
base_url = "http://localhost:8000/v1"
api_key_env = "LOCAL_KEY"
timeout_secs = 30

[analysis]
model = "llama-3.2-11b-vision-preview"
frame_interval = 15
max_concurrency = 2
jpeg_quality = 70
max_dimension = 768
temperature = 0.5
max_tokens = 256

[summary]
model = "llama-3.3-70b-versatile"
fallback_models = []
max_tokens = 2048
temperature = 0.2
executive_brief = false
brief_max_tokens = 128

[retry]
max_retries = 5
initial_delay_ms = 200
max_delay_ms = 1000

[reports]
dir = "/tmp/reports"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider.base_url, "http://localhost:8000/v1");
        assert_eq!(config.analysis.frame_interval, 15);
        assert_eq!(config.analysis.max_concurrency, 2);
        assert_eq!(config.summary_model(), "llama-3.3-70b-versatile");
        assert!(config.summary.fallback_models.is_empty());
        assert!(!config.summary.executive_brief);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(
            config.reports.resolved_dir(),
            PathBuf::from("/tmp/reports")
        );
        // Sections left out keep their defaults
        assert_eq!(config.chat.max_tokens, 800);
    }

    #[test]
    fn test_partial_section_keeps_field_defaults() {
        let config: Config = toml::from_str("[summary]\nmax_tokens = 300\n").unwrap();
        assert_eq!(config.summary.max_tokens, 300);
        assert_eq!(config.summary.fallback_models, vec!["llama-3.1-70b-versatile"]);
        assert!(config.summary.executive_brief);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(
            deserialized.analysis.frame_interval,
            config.analysis.frame_interval
        );
        assert_eq!(deserialized.live.device, config.live.device);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_reports_dir_default() {
        let r = ReportsConfig::default();
        assert_eq!(r.resolved_dir(), paths::reports_dir());
    }
}
