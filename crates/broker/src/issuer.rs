//! Issuance of short-lived accounts

use std::sync::Arc;

use chrono::Utc;
use ephemera_splunk::{CreateUserOptions, SplunkApi};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::broker::Broker;
use crate::error::{BrokerError, Result};
use crate::generator::{PasswordSpec, generate_password, opaque_token};
use crate::lease::{CredentialData, LeaseBookkeeping, LeaseSecret};
use crate::model::{DEFAULT_USER_PREFIX, RoleConfig};

/// Who asks for credentials and where they should live
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueRequest {
    /// Role to issue under
    pub role: String,
    /// Cluster node to create the account on, instead of the connection
    pub node: Option<String>,
    /// Caller display name, folded into the account name
    pub display_name: String,
}

impl IssueRequest {
    /// Request for `role` on the connection itself
    pub fn new(role: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            node: None,
            display_name: display_name.into(),
        }
    }

    /// Target a cluster node
    #[must_use]
    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

/// Account name for a new credential
///
/// Under the default prefix the caller's display name is included as a hex
/// SHA-256 digest, which keeps names valid whatever the caller is called.
pub fn account_name(prefix: &str, display_name: &str, id: &str) -> String {
    if prefix == DEFAULT_USER_PREFIX {
        let mut hasher = Sha256::new();
        hasher.update(display_name.as_bytes());
        let digest = hex::encode(hasher.finalize().as_slice());
        format!("{prefix}_{digest}_{id}")
    } else {
        format!("{prefix}_{id}")
    }
}

/// Password following `spec`, or an opaque token if `spec` cannot be met
pub fn password_or_token(spec: &PasswordSpec) -> String {
    generate_password(spec).unwrap_or_else(|error| {
        warn!(%error, "password spec cannot be satisfied, using an opaque token");
        opaque_token()
    })
}

fn create_options(role: &RoleConfig, name: String, password: String) -> CreateUserOptions {
    CreateUserOptions {
        name,
        password,
        roles: role.roles.clone(),
        default_app: role.default_app.clone(),
        email: role.email.clone(),
        tz: role.tz.clone(),
    }
}

impl Broker {
    /// Create an account for `request` and return it with its lease terms
    pub async fn issue(&self, request: &IssueRequest) -> Result<LeaseSecret> {
        let role = self.store().role(&request.role).await?;
        let config = self.store().connection(&role.connection).await?;
        if !config.allows_role(&request.role) {
            return Err(BrokerError::PermissionDenied {
                role: request.role.clone(),
                connection: role.connection.clone(),
            });
        }

        let master = self.cached(&config).await?;

        let conn: Arc<dyn SplunkApi> = match &request.node {
            Some(node) => {
                let peer = self
                    .router()
                    .resolve(master.as_ref(), node, Some(role.allowed_server_roles.as_slice()))
                    .await?;
                self.router().connect(&config, &peer)?
            }
            None => master,
        };

        let id = role.scheme()?.generate();
        let username = account_name(&role.user_prefix, &request.display_name, &id);
        let password = password_or_token(&role.password_spec);

        let created = conn
            .create_user(&create_options(&role, username.clone(), password.clone()))
            .await?;
        let roles = if created.content.roles.is_empty() {
            role.roles.clone()
        } else {
            created.content.roles
        };

        info!(
            role = %request.role,
            connection = %role.connection,
            node = request.node.as_deref().unwrap_or(""),
            username = %username,
            "issued account"
        );

        Ok(LeaseSecret {
            data: CredentialData {
                username: username.clone(),
                password,
                roles,
                url: conn.base_url().to_string(),
                connection: role.connection.clone(),
            },
            internal: LeaseBookkeeping {
                username,
                connection: role.connection.clone(),
                node: request.node.clone(),
                role: request.role.clone(),
            },
            ttl: if role.default_ttl.is_zero() {
                self.config().default_lease_ttl
            } else {
                role.default_ttl
            },
            max_ttl: role.max_ttl,
            issued_at: Utc::now(),
        })
    }
}
