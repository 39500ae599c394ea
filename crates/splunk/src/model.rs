//! Request options and response entries
//!
//! Every JSON response is wrapped in the same envelope: a list of `entry`
//! objects plus a list of status `messages`. Only the fields the broker
//! actually consumes are modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};

use crate::error::ApiMessage;

/// Response envelope shared by all endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope<T> {
    /// Entries returned by the call
    #[serde(default = "Vec::new")]
    pub entry: Vec<T>,
    /// Status and error messages
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
}

/// Body of a login call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    /// Session key to present as `Authorization: Splunk <key>`
    #[serde(rename = "sessionKey")]
    pub session_key: Option<String>,
    /// Status and error messages
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
}

/// A user account as reported by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserEntry {
    /// Account name
    #[serde(default)]
    pub name: String,
    /// Account attributes
    #[serde(default)]
    pub content: UserContent,
}

/// Attributes of a [`UserEntry`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserContent {
    /// Assigned remote roles
    #[serde(default)]
    pub roles: Vec<String>,
    /// Default app
    #[serde(default, rename = "defaultApp")]
    pub default_app: String,
    /// Email address
    #[serde(default)]
    pub email: String,
    /// Time zone
    #[serde(default)]
    pub tz: String,
    /// Account type (`Splunk`, `SAML`, ...)
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Server identity, used both for `server/info` and peer listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfoEntry {
    /// Entry name (peer address for peer listings)
    #[serde(default)]
    pub name: String,
    /// Server attributes
    #[serde(default)]
    pub content: ServerInfo,
}

/// Attributes of a [`ServerInfoEntry`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    /// Short host name
    #[serde(default)]
    pub host: String,
    /// Fully qualified host name
    #[serde(default)]
    pub host_fqdn: String,
    /// Roles this node plays in the deployment
    #[serde(default)]
    pub server_roles: Vec<String>,
    /// Configured server name
    #[serde(default, rename = "serverName")]
    pub server_name: String,
    /// Product version
    #[serde(default)]
    pub version: String,
    /// Instance GUID
    #[serde(default)]
    pub guid: String,
}

/// Attributes of a new account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateUserOptions {
    /// Account name
    pub name: String,
    /// Initial password
    pub password: String,
    /// Remote roles to assign
    pub roles: Vec<String>,
    /// Default app
    pub default_app: Option<String>,
    /// Email address
    pub email: Option<String>,
    /// Time zone
    pub tz: Option<String>,
}

impl CreateUserOptions {
    /// Form fields in the order the service expects them
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("name", self.name.clone()),
            ("password", self.password.clone()),
        ];
        fields.extend(self.roles.iter().map(|role| ("roles", role.clone())));
        push_optional(&mut fields, "defaultApp", self.default_app.as_deref());
        push_optional(&mut fields, "email", self.email.as_deref());
        push_optional(&mut fields, "tz", self.tz.as_deref());
        fields
    }
}

/// Changes to an existing account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateUserOptions {
    /// Current password, required when changing one's own password
    pub old_password: Option<String>,
    /// New password
    pub password: Option<String>,
    /// Replacement remote roles
    pub roles: Vec<String>,
}

impl UpdateUserOptions {
    /// Password change authenticated with the current password
    pub fn change_password(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old_password: Some(old.into()),
            password: Some(new.into()),
            roles: Vec::new(),
        }
    }

    /// Form fields in the order the service expects them
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        push_optional(&mut fields, "oldpassword", self.old_password.as_deref());
        push_optional(&mut fields, "password", self.password.as_deref());
        fields.extend(self.roles.iter().map(|role| ("roles", role.clone())));
        fields
    }
}

/// Field filter for peer listings
///
/// Each field becomes one `f=<field>` query parameter so the service only
/// returns what routing needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerFilter {
    /// Fields to keep; empty means everything
    pub fields: Vec<String>,
}

impl PeerFilter {
    /// Filter keeping only what node routing looks at
    pub fn routing() -> Self {
        Self {
            fields: ["host", "host_fqdn", "server_roles"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

fn push_optional(fields: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        fields.push((key, value.to_string()));
    }
}
