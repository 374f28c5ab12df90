//! Logging setup for binaries and demos built on the pool.
//!
//! The library itself only emits `tracing` events; nothing is printed until a
//! subscriber is installed, either by the host application or by [`init`].

use std::io;

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_subscriber::{
  EnvFilter,
  fmt::{self, format::FmtSpan},
  layer::SubscriberExt,
  util::SubscriberInitExt,
};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct LogConfig {
  pub level: Level,
  /// JSON lines instead of human-readable output.
  pub json_format: bool,
  /// Emit span enter/close events.
  pub show_spans: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: Level::INFO,
      json_format: false,
      show_spans: false,
    }
  }
}

impl LogConfig {
  /// Create config from environment variables
  pub fn from_env() -> Self {
    let mut config = Self::default();

    // RPOOL_LOG_LEVEL: trace, debug, info, warn, error
    if let Ok(level) = std::env::var("RPOOL_LOG_LEVEL") {
      config.level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
      };
    }

    config.json_format = std::env::var("RPOOL_LOG_JSON").is_ok();
    config.show_spans = std::env::var("RPOOL_LOG_SPANS").is_ok();

    config
  }
}

/// Initialize logging with configuration from the environment
pub fn init() {
  init_with_config(LogConfig::from_env());
}

/// Initialize logging once. Later calls are no-ops, as is a call made after
/// the host already installed a global subscriber.
pub fn init_with_config(config: LogConfig) {
  LOGGER_INITIALIZED.get_or_init(|| {
    let env_filter = EnvFilter::try_from_default_env()
      .unwrap_or_else(|_| EnvFilter::new(format!("rpool={}", config.level.as_str().to_lowercase())));

    let span_events = if config.show_spans {
      FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
      FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.json_format {
      registry
        .with(fmt::layer().json().with_writer(io::stderr).with_span_events(span_events))
        .try_init()
    } else {
      registry
        .with(
          fmt::layer()
            .with_writer(io::stderr)
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_ids(cfg!(debug_assertions)),
        )
        .try_init()
    };

    if result.is_err() {
      tracing::debug!("global subscriber already set, keeping it");
    }
  });
}

pub fn is_initialized() -> bool {
  LOGGER_INITIALIZED.get().is_some()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_init_is_idempotent() {
    init_with_config(LogConfig::default());
    init_with_config(LogConfig {
      level: Level::TRACE,
      json_format: true,
      show_spans: true,
    });

    assert!(is_initialized());
  }
}
