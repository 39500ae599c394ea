//! Error types for remote API calls
//!
//! Every remote call resolves to one of three outcomes: the transport failed
//! (connect, TLS handshake, timeout), the service answered with a non-empty
//! message list or a non-success status, or the payload could not be decoded.
//! Authentication failures are split out because callers treat them
//! differently from generic API errors.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for remote API operations
pub type Result<T> = std::result::Result<T, SplunkError>;

/// A single `{type, text, code}` entry of the response envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    /// Severity as reported by the service (`ERROR`, `WARN`, `INFO`)
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Human readable text
    #[serde(default)]
    pub text: String,
    /// Optional machine readable code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl fmt::Display for ApiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} [{}]: {}", self.kind, code, self.text),
            None => write!(f, "{}: {}", self.kind, self.text),
        }
    }
}

/// Errors returned by [`SplunkApi`](crate::SplunkApi) implementations
#[derive(Debug, Error)]
pub enum SplunkError {
    /// The request never produced a response
    #[error("transport error calling {operation}: {source}")]
    Transport {
        /// Remote operation that was attempted
        operation: &'static str,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// The service rejected the request
    #[error("remote API error calling {operation} (HTTP {status}): {}", render_messages(.messages))]
    Api {
        /// Remote operation that was attempted
        operation: &'static str,
        /// HTTP status code of the response
        status: u16,
        /// Messages from the response envelope
        messages: Vec<ApiMessage>,
    },

    /// Login was refused, or the session was rejected
    #[error("authentication failed for user '{username}': {}", render_messages(.messages))]
    Auth {
        /// Account that attempted to authenticate
        username: String,
        /// Messages from the response envelope
        messages: Vec<ApiMessage>,
    },

    /// The response body did not match the expected shape
    #[error("failed to decode {operation} response: {source}")]
    Decode {
        /// Remote operation that was attempted
        operation: &'static str,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// A base URL or derived endpoint URL is malformed
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// TLS material could not be loaded into the client
    #[error("invalid TLS configuration: {reason}")]
    Tls {
        /// Why it was rejected
        reason: String,
    },
}

impl SplunkError {
    /// HTTP status code, when the service produced a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Auth { .. } => Some(401),
            _ => None,
        }
    }

    /// Messages from the response envelope, if any
    pub fn messages(&self) -> &[ApiMessage] {
        match self {
            Self::Api { messages, .. } | Self::Auth { messages, .. } => messages,
            _ => &[],
        }
    }

    /// Whether this is an authentication failure
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Whether repeating the same call may succeed
    ///
    /// Transport failures and server-side (5xx) errors are transient;
    /// everything else needs a change on the caller's side first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

fn render_messages(messages: &[ApiMessage]) -> String {
    if messages.is_empty() {
        return "no message".to_string();
    }
    messages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
