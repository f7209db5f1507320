//! Configuration management for Ekko.

mod settings;

pub use settings::{
    BreakerSettings, EmbeddingSettings, FetcherSettings, GeneralSettings, ProviderKind,
    ProviderSettings, QueueSettings, RagSettings, RateLimitSettings, RetryScheduleSettings,
    Settings, TagCacheSettings, WorkerSettings,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging for a process embedding this crate.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this
/// twice panics, so binaries should call it exactly once at startup.
pub fn init_logging(general: &GeneralSettings) {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("ekko={}", general.log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
