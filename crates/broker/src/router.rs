//! Routing of requests to individual cluster nodes
//!
//! A clustered deployment exposes its search peers through the cluster
//! master. A request naming a node is served by a dedicated connection to
//! that peer, built from the master's configuration with only the host
//! swapped. Node connections are never cached.

use std::sync::Arc;

use ephemera_splunk::{Connector, PeerFilter, ServerInfoEntry, SplunkApi};
use tracing::debug;
use url::Url;

use crate::error::{BrokerError, Result};
use crate::model::{ConnectionConfig, ConnectionDefaults};

/// Peer whose short or fully qualified host name equals `host`, ignoring case
///
/// The peer must advertise at least one server role accepted by
/// `allowed_server_roles`.
pub fn find_node<'a>(
    host: &str,
    peers: &'a [ServerInfoEntry],
    allowed_server_roles: &[String],
) -> Result<&'a ServerInfoEntry> {
    let peer = locate(host, peers)?;
    let allowed = peer
        .content
        .server_roles
        .iter()
        .any(|role| crate::glob::any_matches(allowed_server_roles, role));
    if !allowed {
        return Err(BrokerError::NodeRoleNotAllowed {
            host: host.to_string(),
            server_roles: peer.content.server_roles.clone(),
        });
    }
    Ok(peer)
}

fn locate<'a>(host: &str, peers: &'a [ServerInfoEntry]) -> Result<&'a ServerInfoEntry> {
    peers
        .iter()
        .find(|peer| {
            peer.content.host.eq_ignore_ascii_case(host)
                || peer.content.host_fqdn.eq_ignore_ascii_case(host)
        })
        .ok_or_else(|| BrokerError::NodeNotFound {
            host: host.to_string(),
        })
}

/// `base` with its host replaced by the peer's; scheme, port and path stay
pub fn node_url(base: &Url, peer: &ServerInfoEntry) -> Result<Url> {
    let host = if peer.content.host_fqdn.is_empty() {
        &peer.content.host
    } else {
        &peer.content.host_fqdn
    };
    if host.is_empty() {
        return Err(BrokerError::invalid_config(format!(
            "peer '{}' reports no host name",
            peer.name
        )));
    }
    let mut url = base.clone();
    url.set_host(Some(host))
        .map_err(|e| BrokerError::invalid_config(format!("invalid peer host {host:?}: {e}")))?;
    Ok(url)
}

/// Resolves node names and opens node-scoped connections
pub struct NodeRouter {
    connector: Arc<dyn Connector>,
    defaults: ConnectionDefaults,
}

impl std::fmt::Debug for NodeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRouter")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl NodeRouter {
    /// Router opening connections through `connector`
    pub fn new(connector: Arc<dyn Connector>, defaults: ConnectionDefaults) -> Self {
        Self {
            connector,
            defaults,
        }
    }

    /// Look `host` up among the peers of `master`
    ///
    /// With `allowed_server_roles` unset the server role check is skipped.
    pub async fn resolve(
        &self,
        master: &dyn SplunkApi,
        host: &str,
        allowed_server_roles: Option<&[String]>,
    ) -> Result<ServerInfoEntry> {
        let peers = master.list_peers(&PeerFilter::routing()).await?;
        debug!(node = %host, peers = peers.len(), "resolving node");
        let peer = match allowed_server_roles {
            Some(allowed) => find_node(host, &peers, allowed)?,
            None => locate(host, &peers)?,
        };
        Ok(peer.clone())
    }

    /// Uncached connection to `peer` with the credentials of `config`
    pub fn connect(
        &self,
        config: &ConnectionConfig,
        peer: &ServerInfoEntry,
    ) -> Result<Arc<dyn SplunkApi>> {
        let params = config.client_params(&self.defaults)?;
        let url = node_url(&params.base_url, peer)?;
        debug!(node_url = %url, "opening node connection");
        Ok(self.connector.connect(params.with_base_url(url))?)
    }
}
