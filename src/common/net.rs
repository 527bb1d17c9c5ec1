//! Target address utilities

use std::net::SocketAddr;

/// Path probed when the caller does not supply one
pub const DEFAULT_TEST_PATH: &str = "/api/v1/guest/comm/config";

/// How a target address identifies its server
///
/// `IpLiteral` targets (`1.2.3.4:8443`, `[::1]:8443`) cannot be verified by
/// hostname, so they get their own trust and header profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    IpLiteral,
    Hostname,
}

impl TargetKind {
    /// Classify a target address (scheme and path are ignored)
    pub fn classify(target: &str) -> Self {
        if authority(target).parse::<SocketAddr>().is_ok() {
            TargetKind::IpLiteral
        } else {
            TargetKind::Hostname
        }
    }

    pub fn is_ip_literal(&self) -> bool {
        matches!(self, TargetKind::IpLiteral)
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::IpLiteral => write!(f, "ip-literal"),
            TargetKind::Hostname => write!(f, "hostname"),
        }
    }
}

/// Strip a leading `http://` or `https://` (any case)
pub fn strip_scheme(target: &str) -> &str {
    for scheme in ["https://", "http://"] {
        if target
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        {
            return &target[scheme.len()..];
        }
    }
    target
}

/// `host[:port]` part of a target address
pub fn authority(target: &str) -> &str {
    let rest = strip_scheme(target);
    match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    }
}

/// Build the probe URL for a target: always `https`, trailing slashes
/// removed, `test_path` appended with a leading slash
pub fn build_probe_url(target: &str, test_path: &str) -> String {
    let base = strip_scheme(target).trim_end_matches('/');

    let path = if test_path.is_empty() {
        DEFAULT_TEST_PATH.to_string()
    } else if test_path.starts_with('/') {
        test_path.to_string()
    } else {
        format!("/{}", test_path)
    };

    format!("https://{}{}", base, path)
}

/// Force the `https` form of an address
pub fn normalize_https(target: &str) -> String {
    format!("https://{}", strip_scheme(target).trim_end_matches('/'))
}
