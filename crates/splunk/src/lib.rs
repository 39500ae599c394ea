//! Ephemera Splunk - REST client for the Splunk management API
//!
//! The broker only needs a handful of remote operations: log in, manage
//! user accounts, list search peers and read the server identity. They are
//! expressed by the [`SplunkApi`] trait so the broker can run against the
//! HTTP [`Client`] in production and an in-memory fake in tests.
//!
//! Handles are created through a [`Connector`] and authenticate lazily: the
//! first remote call logs in and caches the session key for
//! [`ClientParams::session_ttl`].
#![forbid(unsafe_code)]

mod api;
mod client;
mod error;
mod model;
mod params;
mod session;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use api::{Connector, SplunkApi};
pub use client::{Client, HttpConnector};
pub use error::{ApiMessage, Result, SplunkError};
pub use model::{
    CreateUserOptions, Envelope, LoginResponse, PeerFilter, ServerInfo, ServerInfoEntry,
    UpdateUserOptions, UserContent, UserEntry,
};
pub use params::{
    ClientParams, DEFAULT_SESSION_TTL, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, TlsOptions,
    TlsVersion, UnknownTlsVersion, normalize_base_url,
};
