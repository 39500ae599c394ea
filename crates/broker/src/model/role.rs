//! Role configuration (`roles/<name>`)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};
use crate::generator::{PasswordSpec, UserIdScheme};

/// Prefix whose account names also carry a digest of the caller's name
pub const DEFAULT_USER_PREFIX: &str = "ephemera";

/// What an issued account looks like and how long it lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    /// Connection the accounts are created through
    pub connection: String,
    /// Remote roles assigned to issued accounts
    pub roles: Vec<String>,
    /// Lease TTL at issue; zero means the broker default
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Upper bound on the lease lifetime; zero means unbounded
    #[serde(with = "humantime_serde")]
    pub max_ttl: Duration,
    /// Default app of issued accounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_app: Option<String>,
    /// Email of issued accounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Time zone of issued accounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
    /// Account name prefix
    pub user_prefix: String,
    /// Identifier scheme as written; empty in roles that predate schemes
    pub user_id_scheme: String,
    /// Password shape
    pub password_spec: PasswordSpec,
    /// Server roles a node must advertise to be targeted (`*` wildcards)
    pub allowed_server_roles: Vec<String>,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            connection: String::new(),
            roles: Vec::new(),
            default_ttl: Duration::ZERO,
            max_ttl: Duration::ZERO,
            default_app: None,
            email: None,
            tz: None,
            user_prefix: DEFAULT_USER_PREFIX.to_string(),
            user_id_scheme: UserIdScheme::Uuid4.as_str().to_string(),
            password_spec: PasswordSpec::default(),
            allowed_server_roles: vec!["*".to_string()],
        }
    }
}

impl RoleConfig {
    /// Parsed identifier scheme
    pub fn scheme(&self) -> Result<UserIdScheme> {
        self.user_id_scheme.parse()
    }

    /// Check the invariants of a stored role
    pub fn validate(&self) -> Result<()> {
        if self.connection.is_empty() {
            return Err(BrokerError::EmptyRequiredField {
                field: "connection",
            });
        }
        if self.roles.is_empty() {
            return Err(BrokerError::EmptyRequiredField { field: "roles" });
        }
        if self.user_prefix.is_empty() {
            return Err(BrokerError::EmptyRequiredField {
                field: "user_prefix",
            });
        }
        self.scheme()?;
        if !self.max_ttl.is_zero() && !self.default_ttl.is_zero() && self.max_ttl < self.default_ttl
        {
            return Err(BrokerError::invalid_config(format!(
                "max_ttl ({}s) cannot be below default_ttl ({}s)",
                self.max_ttl.as_secs(),
                self.default_ttl.as_secs()
            )));
        }
        Ok(())
    }
}

/// Fields of a role write; `None` keeps the stored value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RolePatch {
    /// Connection name
    pub connection: Option<String>,
    /// Remote roles
    pub roles: Option<Vec<String>>,
    /// Lease TTL at issue
    #[serde(with = "humantime_serde")]
    pub default_ttl: Option<Duration>,
    /// Maximum lease lifetime
    #[serde(with = "humantime_serde")]
    pub max_ttl: Option<Duration>,
    /// Default app; empty clears it
    pub default_app: Option<String>,
    /// Email; empty clears it
    pub email: Option<String>,
    /// Time zone; empty clears it
    pub tz: Option<String>,
    /// Account name prefix
    pub user_prefix: Option<String>,
    /// Identifier scheme
    pub user_id_scheme: Option<String>,
    /// Password shape
    pub password_spec: Option<PasswordSpec>,
    /// Allowed node server roles
    pub allowed_server_roles: Option<Vec<String>>,
}

impl RolePatch {
    /// Merge into `existing`, or into a role with defaults when there is
    /// none, and validate the result.
    pub fn merge(self, existing: Option<RoleConfig>) -> Result<RoleConfig> {
        let mut role = existing.unwrap_or_default();
        let patch = self;

        macro_rules! apply {
            ($patch:ident => $role:ident: $($field:ident),+ $(,)?) => {
                $(if let Some(value) = $patch.$field {
                    $role.$field = value;
                })+
            };
        }
        apply!(
            patch => role:
            connection,
            roles,
            default_ttl,
            max_ttl,
            user_prefix,
            user_id_scheme,
            password_spec,
            allowed_server_roles,
        );
        for (slot, value) in [
            (&mut role.default_app, patch.default_app),
            (&mut role.email, patch.email),
            (&mut role.tz, patch.tz),
        ] {
            if let Some(value) = value {
                *slot = (!value.is_empty()).then_some(value);
            }
        }

        role.validate()?;
        Ok(role)
    }
}
