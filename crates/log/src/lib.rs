//! # Ephemera Log
//!
//! Logging setup shared by the ephemera crates: a `tracing-subscriber`
//! registry with an [`EnvFilter`](tracing_subscriber::EnvFilter) and one
//! fmt layer (pretty, compact or JSON) configured from [`LogConfig`].
//!
//! ```no_run
//! use ephemera_log::{LogConfig, try_init};
//!
//! try_init(&LogConfig::production().with_env_overrides()).ok();
//! tracing::info!(connection = "primary", "broker starting");
//! ```

#![forbid(unsafe_code)]

mod builder;
mod config;

pub use config::{Format, LogConfig};

/// Result type for logger setup
pub type LogResult<T> = Result<T, LogError>;

/// Logger setup errors
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The filter directive could not be parsed
    #[error("invalid log filter '{directive}': {reason}")]
    Filter {
        /// Directive as configured
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("logger already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Install the global subscriber, failing if one is already set
pub fn try_init(config: &LogConfig) -> LogResult<()> {
    builder::install(config)
}

/// Install the global subscriber, ignoring an already installed one.
///
/// An invalid filter is still reported.
pub fn init(config: &LogConfig) -> LogResult<()> {
    match builder::install(config) {
        Err(LogError::AlreadyInitialized(_)) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_tolerated() {
        let config = LogConfig {
            ansi: false,
            ..LogConfig::default()
        };
        init(&config).unwrap();
        init(&config).unwrap();
        assert!(matches!(
            try_init(&config),
            Err(LogError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn bad_filter_fails_even_when_initialized() {
        let config = LogConfig {
            level: "ephemera=loud".to_string(),
            ..LogConfig::default()
        };
        assert!(matches!(init(&config), Err(LogError::Filter { .. })));
    }
}
