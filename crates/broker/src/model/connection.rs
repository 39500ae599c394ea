//! Connection configuration (`config/<name>`)

use std::fmt;
use std::time::Duration;

use ephemera_splunk::{ClientParams, TlsOptions, TlsVersion, normalize_base_url};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::REDACTED;
use crate::error::{BrokerError, Result};

/// Settings taken from the broker configuration when building a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDefaults {
    /// Timeout for connections that do not set one
    pub connect_timeout: Duration,
    /// Lifetime of a cached session key
    pub session_ttl: Duration,
    /// `User-Agent` header
    pub user_agent: String,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            connect_timeout: ephemera_splunk::DEFAULT_TIMEOUT,
            session_ttl: ephemera_splunk::DEFAULT_SESSION_TTL,
            user_agent: ephemera_splunk::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Administrative connection to one deployment
///
/// `id` is regenerated on every successful store, so cache entries keyed by
/// an older ID are never reused for the new settings.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Opaque identity of this version of the configuration
    pub id: String,
    /// Administrative account
    pub username: String,
    /// Password of the administrative account
    pub password: String,
    /// Management endpoint, e.g. `https://splunk.example.com:8089`
    pub url: String,
    /// Roles allowed to use this connection (`*` wildcards)
    pub allowed_roles: Vec<String>,
    /// Persisted and reported only
    pub verify: bool,
    /// Skip server certificate verification
    pub insecure_tls: bool,
    /// Minimum TLS version (`tls10` .. `tls13`), client default when empty
    pub tls_min_version: String,
    /// Client certificate (PEM)
    pub certificate: String,
    /// Client private key (PEM)
    pub private_key: String,
    /// Issuing CA certificates (PEM)
    pub ca_chain: Vec<String>,
    /// Extra trust anchors (PEM)
    pub root_ca: Vec<String>,
    /// Per-request timeout, login included
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("url", &self.url)
            .field("allowed_roles", &self.allowed_roles)
            .field("verify", &self.verify)
            .field("insecure_tls", &self.insecure_tls)
            .field("tls_min_version", &self.tls_min_version)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectionConfig {
    /// Check the fields a usable connection needs
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(BrokerError::EmptyRequiredField { field: "username" });
        }
        if self.url.is_empty() {
            return Err(BrokerError::EmptyRequiredField { field: "url" });
        }
        if self.allowed_roles.is_empty() {
            return Err(BrokerError::EmptyRequiredField {
                field: "allowed_roles",
            });
        }
        normalize_base_url(&self.url)
            .map_err(|e| BrokerError::invalid_config(e.to_string()))?;
        self.min_tls_version()?;
        if !self.certificate.is_empty() && self.private_key.is_empty() {
            return Err(BrokerError::invalid_config(
                "found certificate for TLS authentication but no private key",
            ));
        }
        Ok(())
    }

    /// Parsed `tls_min_version`
    pub fn min_tls_version(&self) -> Result<Option<TlsVersion>> {
        if self.tls_min_version.is_empty() {
            return Ok(None);
        }
        self.tls_min_version
            .parse()
            .map(Some)
            .map_err(|_| BrokerError::InvalidTlsVersion {
                value: self.tls_min_version.clone(),
            })
    }

    /// Whether `role` may use this connection
    pub fn allows_role(&self, role: &str) -> bool {
        crate::glob::any_matches(&self.allowed_roles, role)
    }

    /// Client parameters for this configuration
    pub fn client_params(&self, defaults: &ConnectionDefaults) -> Result<ClientParams> {
        let timeout = if self.connect_timeout.is_zero() {
            defaults.connect_timeout
        } else {
            self.connect_timeout
        };
        let tls = TlsOptions {
            insecure: self.insecure_tls,
            min_version: self.min_tls_version()?,
            root_ca: self.root_ca.clone(),
            certificate: non_empty(&self.certificate),
            private_key: non_empty(&self.private_key).map(SecretString::from),
            ca_chain: self.ca_chain.clone(),
        };
        let params = ClientParams::new(&self.url, &self.username, &self.password)
            .map_err(|e| BrokerError::invalid_config(e.to_string()))?
            .with_timeout(timeout)
            .with_session_ttl(defaults.session_ttl)
            .with_user_agent(defaults.user_agent.clone())
            .with_tls(tls);
        Ok(params)
    }

    /// Redacted view for reads
    pub fn view(&self) -> ConnectionView {
        ConnectionView {
            id: self.id.clone(),
            username: self.username.clone(),
            password: REDACTED.to_string(),
            url: self.url.clone(),
            allowed_roles: self.allowed_roles.clone(),
            verify: self.verify,
            insecure_tls: self.insecure_tls,
            tls_min_version: self.tls_min_version.clone(),
            certificate: self.certificate.clone(),
            private_key: REDACTED.to_string(),
            ca_chain: self.ca_chain.clone(),
            root_ca: self.root_ca.clone(),
            connect_timeout: self.connect_timeout.as_secs(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Fields of a connection write; `None` keeps the stored value
#[derive(Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionPatch {
    /// Administrative account
    pub username: Option<String>,
    /// Administrative password
    pub password: Option<String>,
    /// Management endpoint
    pub url: Option<String>,
    /// Allowed roles
    pub allowed_roles: Option<Vec<String>>,
    /// Stored, never acted upon
    pub verify: Option<bool>,
    /// Skip certificate verification
    pub insecure_tls: Option<bool>,
    /// Minimum TLS version
    pub tls_min_version: Option<String>,
    /// Client certificate (PEM)
    pub certificate: Option<String>,
    /// Client private key (PEM)
    pub private_key: Option<String>,
    /// Issuing CA certificates (PEM)
    pub ca_chain: Option<Vec<String>>,
    /// Extra trust anchors (PEM)
    pub root_ca: Option<Vec<String>>,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
}

impl fmt::Debug for ConnectionPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPatch")
            .field("username", &self.username)
            .field("url", &self.url)
            .field("allowed_roles", &self.allowed_roles)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .finish_non_exhaustive()
    }
}

impl ConnectionPatch {
    /// Merge into `existing`, or into a fresh configuration when there is
    /// none, and validate the result.
    ///
    /// The returned configuration keeps the stored `id`; storing it assigns
    /// a new one.
    pub fn merge(
        self,
        existing: Option<ConnectionConfig>,
        defaults: &ConnectionDefaults,
    ) -> Result<ConnectionConfig> {
        let mut config = existing.unwrap_or_else(|| ConnectionConfig {
            connect_timeout: defaults.connect_timeout,
            ..ConnectionConfig::default()
        });

        let patch = self;
        macro_rules! apply {
            ($patch:ident => $config:ident: $($field:ident),+ $(,)?) => {
                $(if let Some(value) = $patch.$field {
                    $config.$field = value;
                })+
            };
        }
        apply!(
            patch => config:
            username,
            password,
            url,
            allowed_roles,
            verify,
            insecure_tls,
            tls_min_version,
            certificate,
            private_key,
            ca_chain,
            root_ca,
            connect_timeout,
        );

        config.validate()?;
        Ok(config)
    }
}

/// Connection as reported on read, secrets replaced by `"n/a"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionView {
    /// Current configuration ID
    pub id: String,
    /// Administrative account
    pub username: String,
    /// Always `"n/a"`
    pub password: String,
    /// Management endpoint
    pub url: String,
    /// Allowed roles
    pub allowed_roles: Vec<String>,
    /// Stored flag
    pub verify: bool,
    /// Skip certificate verification
    pub insecure_tls: bool,
    /// Minimum TLS version
    pub tls_min_version: String,
    /// Client certificate (PEM)
    pub certificate: String,
    /// Always `"n/a"`
    pub private_key: String,
    /// Issuing CA certificates
    pub ca_chain: Vec<String>,
    /// Extra trust anchors
    pub root_ca: Vec<String>,
    /// Timeout in seconds
    pub connect_timeout: u64,
}
