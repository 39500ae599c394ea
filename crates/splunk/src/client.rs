//! HTTP implementation of [`SplunkApi`]

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::api::{Connector, SplunkApi};
use crate::error::{ApiMessage, Result, SplunkError};
use crate::model::{
    CreateUserOptions, Envelope, LoginResponse, PeerFilter, ServerInfoEntry, UpdateUserOptions,
    UserEntry,
};
use crate::params::ClientParams;
use crate::session::{Session, SessionSlot};

/// REST client for one endpoint, authenticating with a session key
pub struct Client {
    http: reqwest::Client,
    params: ClientParams,
    session: SessionSlot,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.params.base_url.as_str())
            .field("username", &self.params.username)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build a client; no request is sent until the first call
    pub fn new(params: ClientParams) -> Result<Self> {
        let http = build_http_client(&params)?;
        let session = SessionSlot::new(params.session_ttl);
        Ok(Self {
            http,
            params,
            session,
        })
    }

    /// Number of logins this client has performed
    pub fn session_logins(&self) -> u64 {
        self.session.logins()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.params.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SplunkError::InvalidUrl {
                url: self.params.base_url.to_string(),
                reason: "cannot be used as a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut()
            .append_pair("output_mode", "json")
            .append_pair("count", "0");
        Ok(url)
    }

    async fn authorized(&self) -> Result<Arc<Session>> {
        self.session
            .get_or_login(|| {
                self.login(&self.params.username, self.params.password.expose_secret())
            })
            .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        form: Option<&[(&'static str, String)]>,
    ) -> Result<Envelope<T>> {
        let session = self.authorized().await?;
        debug!(operation, url = %url.path(), "calling remote API");

        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, session.authorization());
        if let Some(form) = form {
            request = request.form(form);
        }
        let response = request
            .send()
            .await
            .map_err(|source| SplunkError::Transport { operation, source })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| SplunkError::Transport { operation, source })?;

        if status == StatusCode::UNAUTHORIZED {
            // the service forgot our session (restart, manual logout); the
            // next call logs in again
            warn!(operation, "session key rejected, dropping cached session");
            self.session.invalidate(&session);
            return Err(SplunkError::Auth {
                username: self.params.username.clone(),
                messages: messages_of(&body),
            });
        }
        decode_envelope(operation, status, &body)
    }
}

/// Decode a response body, treating any message as a failure.
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    operation: &'static str,
    status: StatusCode,
    body: &[u8],
) -> Result<Envelope<T>> {
    let envelope: Envelope<T> = if body.iter().all(u8::is_ascii_whitespace) {
        Envelope {
            entry: Vec::new(),
            messages: Vec::new(),
        }
    } else {
        match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(source) if status.is_success() => {
                return Err(SplunkError::Decode { operation, source });
            }
            Err(_) => {
                return Err(SplunkError::Api {
                    operation,
                    status: status.as_u16(),
                    messages: Vec::new(),
                });
            }
        }
    };

    if !envelope.messages.is_empty() || !status.is_success() {
        return Err(SplunkError::Api {
            operation,
            status: status.as_u16(),
            messages: envelope.messages,
        });
    }
    Ok(envelope)
}

fn messages_of(body: &[u8]) -> Vec<ApiMessage> {
    #[derive(Deserialize)]
    struct Messages {
        #[serde(default)]
        messages: Vec<ApiMessage>,
    }
    serde_json::from_slice::<Messages>(body)
        .map(|m| m.messages)
        .unwrap_or_default()
}

#[async_trait]
impl SplunkApi for Client {
    fn base_url(&self) -> &Url {
        &self.params.base_url
    }

    fn username(&self) -> &str {
        &self.params.username
    }

    async fn login(&self, username: &str, password: &str) -> Result<String> {
        const OPERATION: &str = "login";
        let url = self.endpoint(&["services", "auth", "login"])?;
        debug!(username, "logging in");

        let response = self
            .http
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|source| SplunkError::Transport {
                operation: OPERATION,
                source,
            })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| SplunkError::Transport {
                operation: OPERATION,
                source,
            })?;

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(SplunkError::Auth {
                username: username.to_string(),
                messages: messages_of(&body),
            });
        }
        let parsed: LoginResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(source) if status.is_success() => {
                return Err(SplunkError::Decode {
                    operation: OPERATION,
                    source,
                });
            }
            Err(_) => LoginResponse::default(),
        };
        match parsed.session_key {
            Some(key) if status.is_success() && parsed.messages.is_empty() => Ok(key),
            _ => Err(SplunkError::Api {
                operation: OPERATION,
                status: status.as_u16(),
                messages: parsed.messages,
            }),
        }
    }

    async fn create_user(&self, opts: &CreateUserOptions) -> Result<UserEntry> {
        let url = self.endpoint(&["services", "authentication", "users"])?;
        let envelope: Envelope<UserEntry> = self
            .call("create_user", Method::POST, url, Some(&opts.form_fields()))
            .await?;
        Ok(envelope.entry.into_iter().next().unwrap_or_else(|| UserEntry {
            name: opts.name.clone(),
            ..UserEntry::default()
        }))
    }

    async fn update_user(&self, name: &str, opts: &UpdateUserOptions) -> Result<()> {
        let url = self.endpoint(&["services", "authentication", "users", name])?;
        self.call::<UserEntry>("update_user", Method::POST, url, Some(&opts.form_fields()))
            .await?;
        Ok(())
    }

    async fn delete_user(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&["services", "authentication", "users", name])?;
        self.call::<UserEntry>("delete_user", Method::DELETE, url, None)
            .await?;
        Ok(())
    }

    async fn list_peers(&self, filter: &PeerFilter) -> Result<Vec<ServerInfoEntry>> {
        let mut url = self.endpoint(&["services", "search", "distributed", "peers"])?;
        {
            let mut query = url.query_pairs_mut();
            for field in &filter.fields {
                query.append_pair("f", field);
            }
        }
        let envelope: Envelope<ServerInfoEntry> =
            self.call("list_peers", Method::GET, url, None).await?;
        Ok(envelope.entry)
    }

    async fn server_info(&self) -> Result<ServerInfoEntry> {
        let url = self.endpoint(&["services", "server", "info"])?;
        let envelope: Envelope<ServerInfoEntry> =
            self.call("server_info", Method::GET, url, None).await?;
        Ok(envelope.entry.into_iter().next().unwrap_or_default())
    }
}

fn build_http_client(params: &ClientParams) -> Result<reqwest::Client> {
    let tls_error = |reason: String| SplunkError::Tls { reason };

    let mut builder = reqwest::Client::builder()
        .user_agent(params.user_agent.clone())
        .timeout(params.timeout)
        .connect_timeout(params.timeout)
        .danger_accept_invalid_certs(params.tls.insecure);

    if let Some(version) = params.tls.min_version {
        builder = builder.min_tls_version(version.to_reqwest());
    }

    // issuing CAs shipped with the client bundle are trusted for the server too
    for pem in params.tls.root_ca.iter().chain(&params.tls.ca_chain) {
        let cert = reqwest::Certificate::from_pem(pem.as_bytes())
            .map_err(|e| tls_error(format!("invalid CA certificate: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }

    match (&params.tls.certificate, &params.tls.private_key) {
        (Some(certificate), Some(key)) => {
            let bundle = format!("{}\n{}", key.expose_secret(), certificate);
            let identity = reqwest::Identity::from_pem(bundle.as_bytes())
                .map_err(|e| tls_error(format!("invalid client certificate: {e}")))?;
            builder = builder.identity(identity);
        }
        (Some(_), None) => {
            return Err(tls_error(
                "found certificate for TLS authentication but no private key".to_string(),
            ));
        }
        _ => {}
    }

    builder
        .build()
        .map_err(|e| tls_error(format!("failed to build HTTP client: {e}")))
}

/// [`Connector`] producing HTTP [`Client`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn connect(&self, params: ClientParams) -> Result<Arc<dyn SplunkApi>> {
        Ok(Arc::new(Client::new(params)?))
    }
}
