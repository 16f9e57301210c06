use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::chunker::DEFAULT_MAX_CHUNK_CHARS;
use crate::dispatch::http::DEFAULT_API_BASE;
use crate::error::ProofreadError;
use crate::retry::RetryPolicy;

pub const CONFIG_FILE: &str = "proofpane.toml";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MODEL_PREFIX: &str = "gpt-";

/// Long-document delivery strategy. Exactly one is active per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Whole document when short, otherwise paragraph chunks with retry.
    #[default]
    Chunked,
    /// Whole document over one streamed chat request.
    Streamed,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunked => "chunked",
            Self::Streamed => "streamed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chunked" => Some(Self::Chunked),
            "streamed" | "stream" => Some(Self::Streamed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Documents at or under this many characters are sent whole.
    pub threshold_chars: usize,
    pub max_chunk_chars: usize,
    /// Pause before the first block of a split document.
    pub start_delay_ms: u64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            threshold_chars: DEFAULT_MAX_CHUNK_CHARS,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            start_delay_ms: 500,
        }
    }
}

impl ChunkingConfig {
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Output cap for request/response deliveries.
    pub max_output_tokens: u64,
    /// Output cap for the streamed whole-document request.
    pub stream_max_tokens: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 4096,
            stream_max_tokens: 16384,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub stall_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stall_timeout_secs: 120,
        }
    }
}

impl StreamConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

/// Tunables. The saved credential and model live in settings; config only
/// supplies their fallbacks.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    /// From `OPENAI_API_KEY`; never read from the config file.
    #[serde(skip)]
    pub api_key: Option<String>,
    pub default_model: String,
    /// Prefix used to filter `listmodels` output.
    pub model_prefix: String,
    pub strategy: Strategy,
    pub chunking: ChunkingConfig,
    pub retry: RetryPolicy,
    pub tokens: TokenConfig,
    pub stream: StreamConfig,
    pub settings_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            default_model: DEFAULT_MODEL.to_string(),
            model_prefix: DEFAULT_MODEL_PREFIX.to_string(),
            strategy: Strategy::default(),
            chunking: ChunkingConfig::default(),
            retry: RetryPolicy::default(),
            tokens: TokenConfig::default(),
            stream: StreamConfig::default(),
            settings_path: PathBuf::from(".proofpane/settings.toml"),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("default_model", &self.default_model)
            .field("model_prefix", &self.model_prefix)
            .field("strategy", &self.strategy)
            .field("chunking", &self.chunking)
            .field("retry", &self.retry)
            .field("tokens", &self.tokens)
            .field("stream", &self.stream)
            .field("settings_path", &self.settings_path)
            .finish()
    }
}

impl Config {
    /// Load `proofpane.toml` (or `$PROOFPANE_CONFIG`), then apply environment
    /// overrides. A broken file is logged and replaced by defaults.
    pub fn load() -> Self {
        let path = env::var("PROOFPANE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE));

        let mut config = match Self::from_file(&path) {
            Ok(Some(c)) => {
                tracing::info!("loaded config from {}", path.display());
                c
            }
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("{e}; using defaults");
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    /// Parse a config file. `Ok(None)` when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ProofreadError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ProofreadError::Config(format!("{}: {e}", path.display())));
            }
        };
        Self::from_toml(&raw)
            .map(Some)
            .map_err(|e| ProofreadError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = env::var("OPENAI_API_KEY")
            && !key.trim().is_empty()
        {
            self.api_key = Some(key.trim().to_string());
        }
        if let Ok(base) = env::var("OPENAI_BASE_URL")
            && !base.trim().is_empty()
        {
            self.api_base = base.trim().to_string();
        }
        if let Ok(model) = env::var("PROOFPANE_MODEL")
            && !model.trim().is_empty()
        {
            self.default_model = model.trim().to_string();
        }
        if let Ok(s) = env::var("PROOFPANE_STRATEGY") {
            match Strategy::parse(&s) {
                Some(strategy) => self.strategy = strategy,
                None => tracing::warn!("PROOFPANE_STRATEGY={s} not recognized, keeping {}", self.strategy.as_str()),
            }
        }
    }
}
