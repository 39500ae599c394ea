//! Broker settings
//!
//! ```toml
//! rollback_min_age = "5m"
//! session_ttl = "45m"
//! default_connect_timeout = "30s"
//! default_lease_ttl = "1h"
//! probe_on_renew = true
//!
//! [log]
//! level = "info"
//! format = "json"
//! ```

use std::path::Path;
use std::time::Duration;

use ephemera_log::{LogConfig, LogResult};
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};
use crate::model::ConnectionDefaults;
use crate::rollback::DEFAULT_ROLLBACK_MIN_AGE;

/// Settings of a [`Broker`](crate::Broker)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    /// Age a rollback entry must reach before the sweep acts on it
    #[serde(with = "humantime_serde")]
    pub rollback_min_age: Duration,

    /// Lifetime of a cached session key, kept below the remote one
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,

    /// Timeout for connections that do not set their own
    #[serde(with = "humantime_serde")]
    pub default_connect_timeout: Duration,

    /// Lease TTL for roles without a `default_ttl`
    #[serde(with = "humantime_serde")]
    pub default_lease_ttl: Duration,

    /// `User-Agent` of outgoing requests
    pub user_agent: String,

    /// Check the connection with a `server_info` call on every renewal
    pub probe_on_renew: bool,

    /// Logging
    pub log: LogConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            rollback_min_age: DEFAULT_ROLLBACK_MIN_AGE,
            session_ttl: ephemera_splunk::DEFAULT_SESSION_TTL,
            default_connect_timeout: ephemera_splunk::DEFAULT_TIMEOUT,
            default_lease_ttl: Duration::from_secs(60 * 60),
            user_agent: ephemera_splunk::DEFAULT_USER_AGENT.to_string(),
            probe_on_renew: true,
            log: LogConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Parse TOML; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BrokerError::invalid_config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BrokerError::invalid_config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject settings the broker cannot work with
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("session_ttl", self.session_ttl),
            ("default_connect_timeout", self.default_connect_timeout),
            ("default_lease_ttl", self.default_lease_ttl),
        ] {
            if value.is_zero() {
                return Err(BrokerError::invalid_config(format!(
                    "{field} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    /// Install the global logger from the `[log]` section
    ///
    /// `LOG_LEVEL`, `RUST_LOG` and `LOG_FORMAT` override the file. An
    /// already installed logger is kept.
    pub fn init_logging(&self) -> LogResult<()> {
        ephemera_log::init(&self.log.clone().with_env_overrides())
    }

    /// Client settings for connections
    pub fn connection_defaults(&self) -> ConnectionDefaults {
        ConnectionDefaults {
            connect_timeout: self.default_connect_timeout,
            session_ttl: self.session_ttl,
            user_agent: self.user_agent.clone(),
        }
    }
}
