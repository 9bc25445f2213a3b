//! Blocklist lookups.
//!
//! [`BlocklistProber`] is the seam between the worker and the network. The
//! production [`DnsProber`] asks a resolver for the A records of
//! `<reversed-ip>.<zone>.`; any answer means "listed" and the answer address
//! (`127.0.0.x`) is the list-specific response code.

use async_trait::async_trait;
use hickory_resolver::{ResolveError, TokioResolver};
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tracing::debug;

/// One answer from a blocklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHit {
    pub code: String,
}

impl ProbeHit {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// Lookup failures. The worker records all of them as "no match".
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid ip address: {0}")]
    InvalidAddress(String),
    #[error("lookup of {query} failed: {reason}")]
    Resolve { query: String, reason: String },
    #[error("lookup timed out")]
    Timeout,
    #[error("lookup cancelled")]
    Cancelled,
}

/// External blocklist lookup capability.
#[async_trait]
pub trait BlocklistProber: Send + Sync {
    /// Look `ip` up in the blocklist `domain`.
    ///
    /// An empty vector means the IP is not listed.
    async fn probe(&self, domain: &str, ip: &str) -> Result<Vec<ProbeHit>, ProbeError>;
}

/// Reverse an IPv4 address into DNSBL label order (`1.2.3.4` -> `4.3.2.1`).
fn reverse_ipv4(ip: &Ipv4Addr) -> String {
    let octets = ip.octets();
    format!("{}.{}.{}.{}", octets[3], octets[2], octets[1], octets[0])
}

/// Reverse an IPv6 address into nibble order, as used by `ip6.arpa` and
/// IPv6-capable blocklists.
fn reverse_ipv6(ip: &Ipv6Addr) -> String {
    let mut labels = Vec::with_capacity(32);
    for byte in ip.octets().iter().rev() {
        labels.push(format!("{:x}", byte & 0x0f));
        labels.push(format!("{:x}", byte >> 4));
    }
    labels.join(".")
}

/// Build the fully qualified query name for `ip` under `domain`.
pub fn query_name(domain: &str, ip: &str) -> Result<String, ProbeError> {
    let addr: IpAddr = ip
        .trim()
        .parse()
        .map_err(|_| ProbeError::InvalidAddress(ip.to_string()))?;

    let reversed = match addr {
        IpAddr::V4(v4) => reverse_ipv4(&v4),
        IpAddr::V6(v6) => reverse_ipv6(&v6),
    };

    Ok(format!("{}.{}.", reversed, domain.trim_end_matches('.')))
}

/// Prober backed by the system resolver.
#[derive(Clone)]
pub struct DnsProber {
    resolver: TokioResolver,
}

impl DnsProber {
    /// Create a prober from the system resolver configuration, falling back
    /// to hickory's defaults when it can't be read.
    pub fn new() -> Self {
        let resolver = TokioResolver::builder_tokio()
            .map(|b| b.build())
            .unwrap_or_else(|_| {
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            });

        Self { resolver }
    }
}

impl Default for DnsProber {
    fn default() -> Self {
        Self::new()
    }
}

/// NXDOMAIN or an empty answer is how a blocklist says "not listed".
fn is_not_listed(err: &ResolveError) -> bool {
    err.is_nx_domain() || err.is_no_records_found()
}

#[async_trait]
impl BlocklistProber for DnsProber {
    async fn probe(&self, domain: &str, ip: &str) -> Result<Vec<ProbeHit>, ProbeError> {
        let query = query_name(domain, ip)?;
        debug!(query = %query, "Checking DNSBL");

        match self.resolver.lookup_ip(query.as_str()).await {
            Ok(response) => Ok(response
                .iter()
                .map(|addr| ProbeHit::new(addr.to_string()))
                .collect()),
            Err(e) if is_not_listed(&e) => Ok(Vec::new()),
            Err(e) => Err(ProbeError::Resolve {
                query,
                reason: e.to_string(),
            }),
        }
    }
}
