// crates/flagline-datasource/src/http.rs
// ============================================================================
// Module: HTTP Host Policy
// Description: Allowlist/denylist and private-network enforcement applied to
//              every outbound control-plane request.
// Purpose: Keep the polling and streaming data sources from being pointed at
//          internal infrastructure by a misconfigured or compromised base
//          URL.
// Dependencies: reqwest, url
// ============================================================================

//! ## Overview
//! [`HttpHostPolicy`] is consulted before every request a data source makes.
//! By default it resolves the target host to its IP addresses and rejects
//! private, loopback, link-local, and multicast ranges; callers serving a
//! control plane that legitimately lives on such a range (a local relay
//! proxy, for instance) opt back in with
//! [`HttpHostPolicy::allow_private_networks`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::net::ToSocketAddrs;

use url::Host;
use url::Url;

use crate::error::DataSourceError;

// ============================================================================
// SECTION: Host Policy
// ============================================================================

/// Host allowlist + denylist policy applied to outbound data source
/// requests.
#[derive(Debug, Clone, Default)]
pub struct HttpHostPolicy {
    allowlist: Option<Vec<HostPattern>>,
    denylist: Vec<HostPattern>,
    allow_private_networks: bool,
}

impl HttpHostPolicy {
    /// Creates a default policy: no allowlist, no denylist, private and
    /// link-local ranges denied.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the allowlist with the provided hosts. When set, only a
    /// matching host is allowed through.
    #[must_use]
    pub fn allow_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowlist = Some(parse_host_patterns(hosts));
        self
    }

    /// Replaces the denylist with the provided hosts, checked before the
    /// allowlist.
    #[must_use]
    pub fn deny_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.denylist = parse_host_patterns(hosts);
        self
    }

    /// Allows requests to resolve to private, loopback, or link-local IP
    /// ranges.
    #[must_use]
    pub const fn allow_private_networks(mut self) -> Self {
        self.allow_private_networks = true;
        self
    }

    /// Validates a candidate URL against this policy.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::Policy`] when the host is denied, absent
    /// from a configured allowlist, or resolves to a disallowed IP range.
    pub fn enforce(&self, url: &Url) -> Result<(), DataSourceError> {
        let host =
            url.host().ok_or_else(|| DataSourceError::InvalidUri("missing host".to_owned()))?;
        let label = normalize_host_label(&host);
        if self.denylist.iter().any(|pattern| pattern.matches(&label)) {
            return Err(DataSourceError::Policy(format!("host denied: {label}")));
        }
        if let Some(allowlist) = &self.allowlist
            && !allowlist.iter().any(|pattern| pattern.matches(&label))
        {
            return Err(DataSourceError::Policy(format!("host not in allowlist: {label}")));
        }
        if !self.allow_private_networks {
            let ips = resolve_host_ips(&host, url)?;
            if ips.iter().any(is_private_or_link_local) {
                return Err(DataSourceError::Policy(format!(
                    "host resolves to private or link-local address: {label}"
                )));
            }
        }
        Ok(())
    }
}

/// A single allow/deny host pattern.
#[derive(Debug, Clone)]
enum HostPattern {
    /// Exact host match.
    Exact(String),
    /// Wildcard suffix match (`*.example.com`).
    WildcardSuffix(String),
}

impl HostPattern {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let normalized = normalize_host_string(trimmed);
        if let Some(suffix) = normalized.strip_prefix("*.") {
            if suffix.is_empty() {
                return None;
            }
            return Some(Self::WildcardSuffix(suffix.to_owned()));
        }
        Some(Self::Exact(normalized))
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(value) => host == value,
            Self::WildcardSuffix(suffix) => {
                if host.len() <= suffix.len() || !host.ends_with(suffix.as_str()) {
                    return false;
                }
                let boundary = host.len() - suffix.len() - 1;
                host.as_bytes().get(boundary) == Some(&b'.')
            }
        }
    }
}

fn parse_host_patterns<I, S>(hosts: I) -> Vec<HostPattern>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    hosts.into_iter().filter_map(|host| HostPattern::parse(host.as_ref())).collect()
}

fn normalize_host_label(host: &Host<&str>) -> String {
    match host {
        Host::Domain(domain) => normalize_host_string(domain),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    }
}

fn normalize_host_string(host: &str) -> String {
    let trimmed = host.trim_end_matches('.');
    let trimmed =
        trimmed.strip_prefix('[').and_then(|inner| inner.strip_suffix(']')).unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

fn resolve_host_ips(host: &Host<&str>, url: &Url) -> Result<Vec<IpAddr>, DataSourceError> {
    match host {
        Host::Ipv4(ip) => Ok(vec![IpAddr::V4(*ip)]),
        Host::Ipv6(ip) => Ok(vec![IpAddr::V6(*ip)]),
        Host::Domain(domain) => {
            let port = url.port_or_known_default().ok_or_else(|| {
                DataSourceError::InvalidUri("missing port for host resolution".to_owned())
            })?;
            (*domain, port)
                .to_socket_addrs()
                .map(|iter| iter.map(|addr| addr.ip()).collect::<Vec<IpAddr>>())
                .map_err(|err| DataSourceError::Policy(format!("dns lookup failed: {err}")))
        }
    }
}

const fn is_private_or_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            addr.is_private()
                || addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
                || addr.is_broadcast()
        }
        IpAddr::V6(addr) => {
            addr.is_loopback()
                || addr.is_unique_local()
                || addr.is_unicast_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
        }
    }
}

/// Reads a response body up to `max_bytes`, returning
/// [`DataSourceError::TooLarge`] if the cap is exceeded.
///
/// # Errors
///
/// Returns [`DataSourceError::Transport`] on an I/O failure, or
/// [`DataSourceError::TooLarge`] when the body is larger than `max_bytes`.
pub fn read_capped(
    mut reader: impl std::io::Read,
    max_bytes: usize,
) -> Result<Vec<u8>, DataSourceError> {
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let mut limited = reader.by_ref().take(limit);
    let mut bytes = Vec::new();
    std::io::Read::read_to_end(&mut limited, &mut bytes)
        .map_err(|err| DataSourceError::Transport(err.to_string()))?;
    if bytes.len() > max_bytes {
        return Err(DataSourceError::TooLarge { max_bytes });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "test assertions favor panics over error propagation"
    )]

    use super::*;

    #[test]
    fn denies_loopback_by_default() {
        let policy = HttpHostPolicy::new();
        let url = Url::parse("http://127.0.0.1:8080/flags").expect("valid url");
        assert!(policy.enforce(&url).is_err());
    }

    #[test]
    fn allow_private_networks_opts_back_in() {
        let policy = HttpHostPolicy::new().allow_private_networks();
        let url = Url::parse("http://127.0.0.1:8080/flags").expect("valid url");
        assert!(policy.enforce(&url).is_ok());
    }

    #[test]
    fn denylist_rejects_matching_host() {
        let policy = HttpHostPolicy::new().allow_private_networks().deny_hosts(["sdk.example.com"]);
        let url = Url::parse("http://sdk.example.com/flags").expect("valid url");
        assert!(policy.enforce(&url).is_err());
    }

    #[test]
    fn allowlist_wildcard_suffix_matches_subdomain() {
        let policy =
            HttpHostPolicy::new().allow_private_networks().allow_hosts(["*.example.com"]);
        let url = Url::parse("http://sdk.example.com/flags").expect("valid url");
        assert!(policy.enforce(&url).is_ok());
        let other = Url::parse("http://sdk.other.com/flags").expect("valid url");
        assert!(policy.enforce(&other).is_err());
    }

    #[test]
    fn read_capped_rejects_oversized_body() {
        let body = vec![0_u8; 16];
        let result = read_capped(body.as_slice(), 8);
        assert!(matches!(result, Err(DataSourceError::TooLarge { max_bytes: 8 })));
    }

    #[test]
    fn read_capped_accepts_body_at_limit() {
        let body = vec![1_u8; 8];
        let result = read_capped(body.as_slice(), 8).expect("within cap");
        assert_eq!(result.len(), 8);
    }
}
