// crates/thunder-rpc/src/identity.rs
//
// ClientIdentityResolver: derives the rate-limiting key for a call from the
// transport peer address and, for trusted proxies only, forwarding headers.

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use thunder_core::{CallMetadata, RpcError};

/// Forwarding-chain header; leftmost entry is the original client.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Single-address forwarding header.
pub const REAL_IP: &str = "x-real-ip";

/// Rate-limited principal for one call: always a textual IP address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ClientKey {
    fn from(ip: IpAddr) -> Self {
        ClientKey(ip.to_string())
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse proxy addresses, dropping entries that are not valid IPs.
pub fn parse_trusted_proxies<S: AsRef<str>>(proxies: &[S]) -> HashSet<IpAddr> {
    proxies
        .iter()
        .filter_map(|proxy| {
            let proxy = proxy.as_ref().trim();
            match proxy.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    tracing::warn!(proxy = %proxy, "ignoring trusted proxy that is not a valid IP");
                    None
                }
            }
        })
        .collect()
}

/// Addresses trusted when no proxy list is configured.
pub fn default_trusted_proxies() -> Vec<String> {
    vec!["127.0.0.1".to_string(), "::1".to_string()]
}

/// Resolves the [`ClientKey`] of a call. Pure function of its inputs.
#[derive(Debug, Clone, Default)]
pub struct ClientIdentityResolver {
    trusted_proxies: HashSet<IpAddr>,
}

impl ClientIdentityResolver {
    pub fn new(trusted_proxies: HashSet<IpAddr>) -> Self {
        Self { trusted_proxies }
    }

    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.trusted_proxies.contains(ip)
    }

    /// Resolve the key for a call from `peer_addr` (`host:port`).
    ///
    /// Forwarding headers are honored only when the peer itself is a trusted
    /// proxy; a header that names no valid IP falls back to the peer host.
    pub fn resolve(
        &self,
        peer_addr: Option<&str>,
        metadata: &CallMetadata,
    ) -> Result<ClientKey, RpcError> {
        let peer_addr =
            peer_addr.ok_or_else(|| RpcError::InvalidPeer("could not determine peer".to_string()))?;
        let peer_ip = parse_peer_host(peer_addr)?;

        if !self.is_trusted(&peer_ip) {
            return Ok(ClientKey::from(peer_ip));
        }

        let forwarded = first_valid_forwarded(metadata).or_else(|| {
            metadata
                .get(REAL_IP)
                .and_then(|value| value.trim().parse::<IpAddr>().ok())
        });

        Ok(ClientKey::from(forwarded.unwrap_or(peer_ip)))
    }
}

fn parse_peer_host(peer_addr: &str) -> Result<IpAddr, RpcError> {
    peer_addr
        .parse::<SocketAddr>()
        .map(|addr| addr.ip())
        .map_err(|e| RpcError::InvalidPeer(format!("invalid peer address: {}", e)))
}

/// Leftmost syntactically valid IP in the forwarding chain.
fn first_valid_forwarded(metadata: &CallMetadata) -> Option<IpAddr> {
    metadata
        .get(FORWARDED_FOR)?
        .split(',')
        .find_map(|token| token.trim().parse::<IpAddr>().ok())
}
