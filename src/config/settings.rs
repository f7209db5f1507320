//! Configuration settings for Ekko.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub providers: ProviderSettings,
    pub rate_limit: RateLimitSettings,
    pub tag_cache: TagCacheSettings,
    pub fetcher: FetcherSettings,
    pub embedding: EmbeddingSettings,
    pub rag: RagSettings,
    pub queue: QueueSettings,
    pub worker: WorkerSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Language-model provider kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions.
    #[default]
    OpenAI,
    /// Anthropic messages API.
    Anthropic,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "anthropic" => Ok(ProviderKind::Anthropic),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAI => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Circuit-breaker settings for a provider pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive retryable failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before a half-open trial.
    pub cooldown_seconds: u64,
    /// Attempts against the primary when no secondary is configured.
    pub max_attempts: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_seconds: 30,
            max_attempts: 3,
        }
    }
}

/// Language-model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Primary provider.
    pub primary: ProviderKind,
    /// Optional secondary provider for failover.
    pub secondary: Option<ProviderKind>,
    /// Model used for tagging and RAG completions (primary provider).
    pub model: String,
    /// Model used when a call is diverted to the secondary provider.
    pub secondary_model: String,
    /// Request timeout in seconds for provider calls.
    pub timeout_seconds: u64,
    /// Circuit-breaker configuration.
    pub breaker: BreakerSettings,
    /// Per-organization primary-provider overrides.
    pub org_overrides: HashMap<String, ProviderKind>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            primary: ProviderKind::OpenAI,
            secondary: None,
            model: "gpt-4o-mini".to_string(),
            secondary_model: "claude-3-5-haiku-latest".to_string(),
            timeout_seconds: 60,
            breaker: BreakerSettings::default(),
            org_overrides: HashMap::new(),
        }
    }
}

/// Rate limiter settings (per 60-second window).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Maximum requests per minute.
    pub requests_per_minute: u32,
    /// Maximum tokens per minute.
    pub tokens_per_minute: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            tokens_per_minute: 90_000,
        }
    }
}

/// Tag cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagCacheSettings {
    /// Maximum number of cached entries.
    pub max_entries: usize,
    /// Entry time-to-live in seconds.
    pub ttl_seconds: u64,
}

impl Default for TagCacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_seconds: 24 * 60 * 60,
        }
    }
}

/// Retry schedule for one recording provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryScheduleSettings {
    /// Initial retry delay in seconds.
    pub initial_delay_seconds: u64,
    /// Maximum fetch attempts.
    pub max_attempts: u32,
}

impl Default for RetryScheduleSettings {
    fn default() -> Self {
        Self {
            initial_delay_seconds: 30,
            max_attempts: 5,
        }
    }
}

/// Transcript fetcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    /// Per-provider retry schedules, keyed by provider name.
    pub providers: HashMap<String, RetryScheduleSettings>,
    /// Ceiling on any computed backoff delay, in seconds.
    pub max_delay_seconds: u64,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            max_delay_seconds: 15 * 60,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use. Fixed per deployment: switching models
    /// requires re-indexing every stored vector.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// RAG engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// Default number of context chunks to retrieve.
    pub top_k: usize,
    /// Minimum similarity score for a retrieved chunk.
    pub min_score: f32,
    /// Maximum prior messages carried in chat mode.
    pub max_history: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: 0.3,
            max_history: 10,
        }
    }
}

/// Job queue submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Maximum attempts when submitting a job to the broker.
    pub enqueue_max_attempts: u32,
    /// Base delay between submission attempts, in milliseconds.
    pub enqueue_backoff_ms: u64,
    /// Default max executions the queue should attempt per job.
    pub job_max_attempts: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            enqueue_max_attempts: 3,
            enqueue_backoff_ms: 200,
            job_max_attempts: 5,
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Number of concurrent workers.
    pub concurrency: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::EkkoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ekko")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Retry schedule for a provider, falling back to defaults.
    pub fn retry_schedule(&self, provider: &str) -> RetryScheduleSettings {
        self.fetcher
            .providers
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.rate_limit.requests_per_minute, 60);
        assert_eq!(parsed.embedding.dimensions, 1536);
    }

    #[test]
    fn test_retry_schedule_fallback() {
        let mut settings = Settings::default();
        settings.fetcher.providers.insert(
            "zoom".to_string(),
            RetryScheduleSettings {
                initial_delay_seconds: 10,
                max_attempts: 8,
            },
        );

        assert_eq!(settings.retry_schedule("zoom").max_attempts, 8);
        assert_eq!(settings.retry_schedule("gong").max_attempts, 5);
    }

    #[test]
    fn test_partial_config_parses() {
        let toml = r#"
            [rate_limit]
            requests_per_minute = 5
        "#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.rate_limit.requests_per_minute, 5);
        assert_eq!(settings.rag.top_k, 10);
    }
}
