//! Outbound target validation.
//!
//! # Responsibilities
//! - Accept only `https` URLs without userinfo
//! - Reject loopback, private, link-local, CGNAT and other reserved targets
//! - Enforce per-platform domain allow-lists
//! - Re-validate every redirect hop and cap the chain length
//! - Re-check resolved addresses at connect time (DNS rebinding)
//!
//! # Design Decisions
//! - Fail closed: any parse or resolution problem rejects the target
//! - Plain allow-list entries match the host and its subdomains on a dot
//!   boundary; `*.` entries match subdomains only
//! - A name that resolves to any forbidden address is rejected outright

use std::error::Error as StdError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect::Policy;
use url::{Host, Url};

use crate::error::{GatewayError, GatewayResult};

/// Default cap on followed redirects.
pub const DEFAULT_MAX_REDIRECTS: usize = 3;

type BoxError = Box<dyn StdError + Send + Sync>;

/// One allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    /// Host itself or any dot-boundary subdomain.
    Domain(String),
    /// Subdomains only (`*.example.com`).
    Subdomains(String),
}

impl HostPattern {
    fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize_host(raw.trim());
        if normalized.is_empty() {
            return None;
        }
        if let Some(suffix) = normalized.strip_prefix("*.") {
            if suffix.is_empty() {
                return None;
            }
            return Some(Self::Subdomains(suffix.to_string()));
        }
        Some(Self::Domain(normalized))
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            Self::Domain(domain) => host == domain || is_subdomain_of(host, domain),
            Self::Subdomains(suffix) => is_subdomain_of(host, suffix),
        }
    }
}

fn is_subdomain_of(host: &str, suffix: &str) -> bool {
    if host.len() <= suffix.len() || !host.ends_with(suffix) {
        return false;
    }
    let boundary = host.len() - suffix.len() - 1;
    host.as_bytes().get(boundary) == Some(&b'.')
}

fn normalize_host(host: &str) -> String {
    let trimmed = host.trim_end_matches('.');
    let trimmed = trimmed
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

/// Normalized set of allowed outbound hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAllowList {
    patterns: Vec<HostPattern>,
}

impl DomainAllowList {
    pub fn new<S: AsRef<str>>(domains: &[S]) -> Self {
        Self {
            patterns: domains
                .iter()
                .filter_map(|d| HostPattern::parse(d.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether the host is covered by any entry.
    pub fn matches(&self, host: &str) -> bool {
        let host = normalize_host(host);
        self.patterns.iter().any(|p| p.matches(&host))
    }
}

/// Whether an address is loopback, private, link-local or otherwise not a
/// public unicast destination.
pub fn is_forbidden_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => is_forbidden_v4(addr),
        IpAddr::V6(addr) => match addr.to_ipv4_mapped() {
            Some(mapped) => is_forbidden_v4(&mapped),
            None => is_forbidden_v6(addr),
        },
    }
}

fn is_forbidden_v4(addr: &Ipv4Addr) -> bool {
    let [a, b, ..] = addr.octets();
    addr.is_private()
        || addr.is_loopback()
        || addr.is_link_local()
        || addr.is_unspecified()
        || addr.is_broadcast()
        || addr.is_multicast()
        || a == 0
        // carrier-grade NAT 100.64.0.0/10
        || (a == 100 && (b & 0xc0) == 64)
}

fn is_forbidden_v6(addr: &Ipv6Addr) -> bool {
    if let Some(embedded) = embedded_v4(addr) {
        return is_forbidden_v4(&embedded);
    }
    let first = addr.segments()[0];
    addr.is_loopback()
        || addr.is_unspecified()
        || addr.is_multicast()
        // unique local fc00::/7
        || (first & 0xfe00) == 0xfc00
        // link-local fe80::/10
        || (first & 0xffc0) == 0xfe80
}

/// IPv4 address carried inside an IPv4-compatible (`::a.b.c.d`), NAT64
/// (`64:ff9b::/96`) or 6to4 (`2002::/16`) address.
fn embedded_v4(addr: &Ipv6Addr) -> Option<Ipv4Addr> {
    let octets = addr.octets();
    let tail = || Ipv4Addr::new(octets[12], octets[13], octets[14], octets[15]);
    match addr.segments() {
        // :: and ::1 keep their own v6 meaning.
        [0, 0, 0, 0, 0, 0, 0, 0 | 1] => None,
        [0, 0, 0, 0, 0, 0, _, _] => Some(tail()),
        [0x64, 0xff9b, 0, 0, 0, 0, _, _] => Some(tail()),
        [0x2002, ..] => Some(Ipv4Addr::new(octets[2], octets[3], octets[4], octets[5])),
        _ => None,
    }
}

fn is_local_name(host: &str) -> bool {
    host == "localhost" || host.ends_with(".localhost")
}

/// Validates outbound URLs before they are dereferenced.
#[derive(Debug, Clone)]
pub struct SsrfGuard {
    max_redirects: usize,
}

impl Default for SsrfGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REDIRECTS)
    }
}

impl SsrfGuard {
    pub fn new(max_redirects: usize) -> Self {
        Self { max_redirects }
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Parse and validate a target. The first failing rule aborts.
    pub fn validate_url(&self, raw: &str, allowed: Option<&DomainAllowList>) -> GatewayResult<Url> {
        let url = Url::parse(raw.trim())
            .map_err(|e| GatewayError::InvalidTarget(format!("unparseable URL: {e}")))?;
        check_url(&url, allowed)?;
        Ok(url)
    }

    /// Decide one redirect hop. `previous_hops` counts the requests already
    /// made in the chain, so the first redirect arrives with 1.
    pub fn check_redirect(
        &self,
        previous_hops: usize,
        next: &Url,
        allowed: Option<&DomainAllowList>,
    ) -> GatewayResult<()> {
        if previous_hops > self.max_redirects {
            return Err(GatewayError::InvalidTarget(format!(
                "redirect chain exceeds {} hops",
                self.max_redirects
            )));
        }
        check_url(next, allowed).inspect_err(|_| {
            tracing::warn!(target_host = ?next.host_str(), hop = previous_hops, "Blocked redirect");
        })
    }

    /// Redirect policy that re-validates each hop and caps the chain.
    pub fn redirect_policy(&self, allowed: Option<DomainAllowList>) -> Policy {
        let guard = self.clone();
        Policy::custom(move |attempt| {
            match guard.check_redirect(attempt.previous().len(), attempt.url(), allowed.as_ref()) {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        })
    }
}

/// Validate a raw URL against an optional allow-list.
pub fn validate_url(raw: &str, allowed_domains: Option<&[String]>) -> GatewayResult<Url> {
    let allow_list = allowed_domains.map(DomainAllowList::new);
    SsrfGuard::default().validate_url(raw, allow_list.as_ref())
}

/// Boolean form of [`validate_url`].
pub fn is_allowed(raw: &str, allowed_domains: Option<&[String]>) -> bool {
    validate_url(raw, allowed_domains).is_ok()
}

fn check_url(url: &Url, allowed: Option<&DomainAllowList>) -> GatewayResult<()> {
    if url.scheme() != "https" {
        return Err(GatewayError::InvalidTarget(format!(
            "scheme {} is not allowed",
            url.scheme()
        )));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(GatewayError::InvalidTarget(
            "credentials in URL are not allowed".to_string(),
        ));
    }

    let host = match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = normalize_host(domain);
            if is_local_name(&domain) {
                return Err(GatewayError::InvalidTarget(format!("host {domain} is local")));
            }
            domain
        }
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip))?,
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip))?,
        None => return Err(GatewayError::InvalidTarget("URL has no host".to_string())),
    };

    if let Some(allow_list) = allowed {
        if !allow_list.matches(&host) {
            return Err(GatewayError::InvalidTarget(format!(
                "host {host} is not in the allowed domains"
            )));
        }
    }
    Ok(())
}

fn check_ip(ip: IpAddr) -> GatewayResult<String> {
    if is_forbidden_ip(&ip) {
        return Err(GatewayError::InvalidTarget(format!("address {ip} is not public")));
    }
    Ok(ip.to_string())
}

/// Reject the whole answer if any resolved address is forbidden.
pub fn filter_resolved(host: &str, addrs: Vec<SocketAddr>) -> GatewayResult<Vec<SocketAddr>> {
    if addrs.is_empty() {
        return Err(GatewayError::InvalidTarget(format!("{host} did not resolve")));
    }
    if let Some(bad) = addrs.iter().find(|addr| is_forbidden_ip(&addr.ip())) {
        tracing::warn!(host = %host, address = %bad.ip(), "Resolved address rejected");
        return Err(GatewayError::InvalidTarget(format!(
            "{host} resolves to non-public address {}",
            bad.ip()
        )));
    }
    Ok(addrs)
}

/// DNS resolver for the outbound client that applies the address rules to
/// every answer before a connection is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardedResolver;

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_public(name.as_str().to_string()))
    }
}

async fn resolve_public(host: String) -> Result<Addrs, BoxError> {
    if is_local_name(&normalize_host(&host)) {
        return Err(Box::new(GatewayError::InvalidTarget(format!("host {host} is local"))));
    }
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0)).await?.collect();
    let allowed = filter_resolved(&host, addrs)?;
    Ok(Box::new(allowed.into_iter()))
}
