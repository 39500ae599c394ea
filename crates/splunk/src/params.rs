//! Connection parameters for building a client

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SplunkError};

/// Default lifetime of a cached session key.
///
/// The service expires idle sessions after 60 minutes; refreshing after 45
/// leaves a margin for clock skew and long-running requests.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(45 * 60);

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default `User-Agent` header
pub const DEFAULT_USER_AGENT: &str = concat!("ephemera/", env!("CARGO_PKG_VERSION"));

/// Minimum TLS protocol version accepted for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Configuration spelling (`tls12`)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tls10 => "tls10",
            Self::Tls11 => "tls11",
            Self::Tls12 => "tls12",
            Self::Tls13 => "tls13",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::tls::Version {
        match self {
            Self::Tls10 => reqwest::tls::Version::TLS_1_0,
            Self::Tls11 => reqwest::tls::Version::TLS_1_1,
            Self::Tls12 => reqwest::tls::Version::TLS_1_2,
            Self::Tls13 => reqwest::tls::Version::TLS_1_3,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown TLS version name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown TLS version '{0}', expected one of tls10, tls11, tls12, tls13")]
pub struct UnknownTlsVersion(pub String);

impl FromStr for TlsVersion {
    type Err = UnknownTlsVersion;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tls10" => Ok(Self::Tls10),
            "tls11" => Ok(Self::Tls11),
            "tls12" => Ok(Self::Tls12),
            "tls13" => Ok(Self::Tls13),
            other => Err(UnknownTlsVersion(other.to_string())),
        }
    }
}

/// TLS material and policy for a connection
///
/// PEM blocks are handed to the HTTP client as-is.
#[derive(Default)]
pub struct TlsOptions {
    /// Skip server certificate verification
    pub insecure: bool,
    /// Minimum protocol version, client default when `None`
    pub min_version: Option<TlsVersion>,
    /// Extra trust anchors (PEM)
    pub root_ca: Vec<String>,
    /// Client certificate (PEM)
    pub certificate: Option<String>,
    /// Client private key (PEM)
    pub private_key: Option<SecretString>,
    /// Intermediate certificates sent with the client certificate (PEM)
    pub ca_chain: Vec<String>,
}

impl fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsOptions")
            .field("insecure", &self.insecure)
            .field("min_version", &self.min_version)
            .field("root_ca", &self.root_ca.len())
            .field("certificate", &self.certificate.is_some())
            .field("ca_chain", &self.ca_chain.len())
            .finish_non_exhaustive()
    }
}

/// Everything needed to build a connection to one remote endpoint
///
/// Building a connection from these parameters never talks to the remote
/// service; the first API call triggers the login.
#[derive(Debug)]
pub struct ClientParams {
    /// Endpoint base URL, normalized to end with `/`
    pub base_url: Url,
    /// Account used to log in
    pub username: String,
    /// Password of that account
    pub password: SecretString,
    /// Lifetime of a cached session key
    pub session_ttl: Duration,
    /// Timeout applied to every request, including login
    pub timeout: Duration,
    /// `User-Agent` header value
    pub user_agent: String,
    /// TLS settings
    pub tls: TlsOptions,
}

impl ClientParams {
    /// Parameters with default timeouts for the given endpoint and account
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            username: username.into(),
            password: SecretString::from(password.into()),
            session_ttl: DEFAULT_SESSION_TTL,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            tls: TlsOptions::default(),
        })
    }

    /// Replace the base URL, keeping credentials and settings
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the session key lifetime
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the `User-Agent` header
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the TLS options
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }
}

/// Parse a base URL and make sure relative endpoint paths resolve below it.
pub fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|e| SplunkError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SplunkError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(SplunkError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
