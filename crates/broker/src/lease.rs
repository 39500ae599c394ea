//! Leases on issued accounts: renewal and revocation

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ephemera_splunk::SplunkApi;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::error::Result;
use crate::model::{REDACTED, RoleConfig};

/// Credentials handed to the caller
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialData {
    /// Account name
    pub username: String,
    /// Account password
    pub password: String,
    /// Remote roles of the account
    pub roles: Vec<String>,
    /// Endpoint the account lives on
    pub url: String,
    /// Connection the account was created through
    pub connection: String,
}

impl std::fmt::Debug for CredentialData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialData")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("roles", &self.roles)
            .field("url", &self.url)
            .field("connection", &self.connection)
            .finish()
    }
}

/// What renewal and revocation need to find the account again
///
/// Kept by the host alongside the lease and never shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseBookkeeping {
    /// Account name
    pub username: String,
    /// Connection name
    pub connection: String,
    /// Node the account was created on, when not the connection itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Role the lease was issued under
    pub role: String,
}

/// An issued account with its lease terms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSecret {
    /// Public part
    pub data: CredentialData,
    /// Private part
    pub internal: LeaseBookkeeping,
    /// Initial lease duration
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Lifetime cap; zero means unbounded
    #[serde(with = "humantime_serde")]
    pub max_ttl: Duration,
    /// When the account was created
    pub issued_at: DateTime<Utc>,
}

/// Result of a renewal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewResponse {
    /// Lease duration from now on; zero once the lease reached `max_ttl`
    pub ttl: Duration,
    /// Non-fatal problems noticed while renewing
    pub warnings: Vec<String>,
}

/// Next lease duration
///
/// The larger of `increment` and the role's default TTL (`fallback_ttl` when
/// the role has none), capped by what is left of `max_ttl`.
pub fn next_ttl(
    role: &RoleConfig,
    increment: Duration,
    fallback_ttl: Duration,
    elapsed: Duration,
) -> Duration {
    let default_ttl = if role.default_ttl.is_zero() {
        fallback_ttl
    } else {
        role.default_ttl
    };
    let ttl = increment.max(default_ttl);
    if role.max_ttl.is_zero() {
        ttl
    } else {
        ttl.min(role.max_ttl.saturating_sub(elapsed))
    }
}

impl Broker {
    /// Extend the lease of `secret` by at least `increment`
    pub async fn renew(&self, secret: &LeaseSecret, increment: Duration) -> Result<RenewResponse> {
        self.renew_at(secret, increment, Utc::now()).await
    }

    /// [`renew`](Self::renew) as of `now`
    pub async fn renew_at(
        &self,
        secret: &LeaseSecret,
        increment: Duration,
        now: DateTime<Utc>,
    ) -> Result<RenewResponse> {
        let internal = &secret.internal;
        let role = self.store().role(&internal.role).await?;
        let elapsed = (now - secret.issued_at).to_std().unwrap_or_default();

        let ttl = next_ttl(&role, increment, self.config().default_lease_ttl, elapsed);
        let mut warnings = Vec::new();
        if ttl.is_zero() {
            warnings.push(format!(
                "lease of {} reached its max_ttl of {}s",
                internal.username,
                role.max_ttl.as_secs()
            ));
        }

        if self.config().probe_on_renew {
            if let Err(error) = self.probe(internal).await {
                warn!(
                    connection = %internal.connection,
                    username = %internal.username,
                    %error,
                    "connection probe failed during renewal"
                );
                warnings.push(format!("connection probe failed: {error}"));
            }
        }

        debug!(
            role = %internal.role,
            username = %internal.username,
            ttl_secs = ttl.as_secs(),
            "renewed lease"
        );
        Ok(RenewResponse { ttl, warnings })
    }

    /// Delete the account named in `internal`
    ///
    /// Node-scoped accounts are deleted on their node; the server role check
    /// made at issue time is not repeated.
    pub async fn revoke(&self, internal: &LeaseBookkeeping) -> Result<()> {
        let conn = self.lease_connection(internal).await?;
        conn.delete_user(&internal.username).await?;
        info!(
            connection = %internal.connection,
            node = internal.node.as_deref().unwrap_or(""),
            username = %internal.username,
            "revoked account"
        );
        Ok(())
    }

    async fn probe(&self, internal: &LeaseBookkeeping) -> Result<()> {
        let conn = self.lease_connection(internal).await?;
        conn.server_info().await?;
        Ok(())
    }

    async fn lease_connection(&self, internal: &LeaseBookkeeping) -> Result<Arc<dyn SplunkApi>> {
        let (config, master) = self.cached_connection(&internal.connection).await?;
        match &internal.node {
            Some(node) => {
                let peer = self.router().resolve(master.as_ref(), node, None).await?;
                self.router().connect(&config, &peer)
            }
            None => Ok(master),
        }
    }
}
