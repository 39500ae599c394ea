//! Logging configuration

use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Filter directive (e.g. `"info"`, `"ephemera_broker=debug,reqwest=warn"`)
    pub level: String,

    /// Output format
    pub format: Format,

    /// Colored output
    pub ansi: bool,

    /// Include the event target
    pub target: bool,

    /// Include file and line of the call site
    pub source: bool,

    /// Include timestamps
    pub time: bool,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Human-readable multi-line output
    Pretty,
    /// Compact single-line output
    Compact,
    /// Structured JSON, one object per line
    Json,
}

impl Format {
    fn parse_lossy(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            ansi: true,
            target: true,
            source: false,
            time: true,
        }
    }
}

impl LogConfig {
    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            source: true,
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level, no colors)
    #[must_use]
    pub fn production() -> Self {
        Self {
            format: Format::Json,
            ansi: false,
            ..Self::default()
        }
    }

    /// Apply `LOG_LEVEL` / `RUST_LOG` and `LOG_FORMAT` from the process environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// `LOG_LEVEL` wins over `RUST_LOG`; empty values are ignored.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(level) = non_empty("LOG_LEVEL").or_else(|| non_empty("RUST_LOG")) {
            self.level = level;
        }
        if let Some(format) = non_empty("LOG_FORMAT") {
            self.format = Format::parse_lossy(&format);
        }
        self
    }
}
