//! Bypass predicate
//!
//! Decides which requests the controller must leave untouched. Everything
//! here is a pure function of its inputs: the controller and the lifecycle
//! client each call it on their own, with no shared state.

use crate::config::schema::BypassConfig;
use crate::net::Request;
use std::fmt;
use std::net::Ipv4Addr;

/// Why a request is passed straight to the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    /// Origin or request host is a hosted-preview domain
    PreviewHost,
    /// Method is not a pure retrieval
    NonRetrievalMethod,
    /// Path is under a remote API namespace
    ApiNamespace,
    /// Path is under an administrative or code-push namespace
    ControlNamespace,
    /// Scheme is not http(s)
    NonNetworkScheme,
}

impl fmt::Display for BypassReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PreviewHost => "preview host",
            Self::NonRetrievalMethod => "non-retrieval method",
            Self::ApiNamespace => "api namespace",
            Self::ControlNamespace => "control namespace",
            Self::NonNetworkScheme => "non-network scheme",
        };
        write!(f, "{}", s)
    }
}

/// Classification of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Intercept,
    Bypass(BypassReason),
}

impl RequestClass {
    /// Classify `request` issued from a page on `origin_host`.
    ///
    /// Checks run in a fixed order so the reported reason is stable.
    pub fn classify(rules: &BypassConfig, origin_host: &str, request: &Request) -> Self {
        let request_host = request.url.host_str().unwrap_or_default();
        if is_preview_host(origin_host, &rules.hostname_suffixes)
            || is_preview_host(request_host, &rules.hostname_suffixes)
        {
            return Self::Bypass(BypassReason::PreviewHost);
        }

        if !request.method.is_retrieval() {
            return Self::Bypass(BypassReason::NonRetrievalMethod);
        }

        let path = request.url.path();
        if in_namespace(path, &rules.api_prefixes) {
            return Self::Bypass(BypassReason::ApiNamespace);
        }
        if in_namespace(path, &rules.control_prefixes) {
            return Self::Bypass(BypassReason::ControlNamespace);
        }

        if !matches!(request.url.scheme(), "http" | "https") {
            return Self::Bypass(BypassReason::NonNetworkScheme);
        }

        Self::Intercept
    }

    pub fn is_intercepted(&self) -> bool {
        matches!(self, Self::Intercept)
    }
}

/// Whether `host` is one of `suffixes` or a subdomain of one.
///
/// `preview.emergent.sh` matches `emergent.sh`; `notemergent.sh` does not.
pub fn is_preview_host(host: &str, suffixes: &[String]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }
    suffixes.iter().any(|suffix| {
        let suffix = suffix.trim_start_matches('.').to_ascii_lowercase();
        !suffix.is_empty()
            && (host == suffix
                || host
                    .strip_suffix(suffix.as_str())
                    .is_some_and(|rest| rest.ends_with('.')))
    })
}

/// Whether `host` is a loopback/development host
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    if host == "localhost" || host == "[::1]" || host == "::1" {
        return true;
    }
    host.parse::<Ipv4Addr>()
        .map(|ip| ip.octets()[0] == 127)
        .unwrap_or(false)
}

/// Segment-aware prefix match: `/admin` covers `/admin` and `/admin/x`,
/// but not `/administer`.
pub fn in_namespace(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return false;
        }
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}
