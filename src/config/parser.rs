//! Proxy connection string parser
//!
//! Grammar: `[scheme://][user:pass@]host:port` where scheme is one of
//! `socks5`, `http`, `https`. A string without a scheme is read as a bare
//! `host:port` socks5 relay.

use crate::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Tunnel protocol spoken by a proxy relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    Socks5,
    Http,
    Https,
}

impl ProxyScheme {
    const PREFIXES: [(&'static str, ProxyScheme); 3] = [
        ("socks5://", ProxyScheme::Socks5),
        ("https://", ProxyScheme::Https),
        ("http://", ProxyScheme::Http),
    ];

    /// Scheme used when building the tunnel URL
    ///
    /// socks5 relays resolve target names themselves.
    fn tunnel_scheme(&self) -> &'static str {
        match self {
            ProxyScheme::Socks5 => "socks5h",
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyScheme::Socks5 => write!(f, "socks5"),
            ProxyScheme::Http => write!(f, "http"),
            ProxyScheme::Https => write!(f, "https"),
        }
    }
}

/// Parsed proxy relay
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProxyDescriptor {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl ProxyDescriptor {
    pub fn has_credentials(&self) -> bool {
        self.username.is_some()
    }

    /// URL handed to the HTTP client for tunneling, credentials included
    pub fn to_proxy_url(&self) -> String {
        let mut url = format!("{}://", self.scheme.tunnel_scheme());
        if let Some(user) = &self.username {
            url.push_str(&urlencoding::encode(user));
            if let Some(pass) = &self.password {
                url.push(':');
                url.push_str(&urlencoding::encode(pass));
            }
            url.push('@');
        }
        url.push_str(&format!("{}:{}", self.host, self.port));
        url
    }
}

/// Displays without the password
impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.username {
            Some(user) => write!(f, "{}://{}@{}:{}", self.scheme, user, self.host, self.port),
            None => write!(f, "{}://{}:{}", self.scheme, self.host, self.port),
        }
    }
}

/// Parse a proxy connection string
pub fn parse_proxy(url: &str) -> Result<ProxyDescriptor> {
    let url = url.trim();

    let (scheme, rest) = ProxyScheme::PREFIXES
        .iter()
        .find_map(|(prefix, scheme)| {
            url.get(..prefix.len())
                .filter(|p| p.eq_ignore_ascii_case(prefix))
                .map(|_| (*scheme, &url[prefix.len()..]))
        })
        .unwrap_or((ProxyScheme::Socks5, url));

    let rest = rest.trim_end_matches('/');

    // user:pass@host:port, the last '@' separates credentials
    let (username, password, host_port) = match rest.rfind('@') {
        Some(at_idx) => {
            let auth = &rest[..at_idx];
            let (user, pass) = match auth.find(':') {
                Some(colon_idx) => (&auth[..colon_idx], Some(&auth[colon_idx + 1..])),
                None => (auth, None),
            };
            let username = if user.is_empty() {
                None
            } else {
                Some(decode_credential(url, user)?)
            };
            let password = match (username.as_ref(), pass) {
                (Some(_), Some(pass)) => Some(decode_credential(url, pass)?),
                _ => None,
            };
            (username, password, &rest[at_idx + 1..])
        }
        None => (None, None, rest),
    };

    let colon_idx = host_port
        .rfind(':')
        .ok_or_else(|| Error::malformed_proxy(format!("missing port in {}", url)))?;
    let host = &host_port[..colon_idx];
    let port_str = &host_port[colon_idx + 1..];

    if host.is_empty() {
        return Err(Error::malformed_proxy(format!("empty host in {}", url)));
    }
    if port_str.is_empty() {
        return Err(Error::malformed_proxy(format!("empty port in {}", url)));
    }

    let port: u16 = port_str
        .parse()
        .map_err(|_| Error::malformed_proxy(format!("invalid port '{}' in {}", port_str, url)))?;
    if port == 0 {
        return Err(Error::malformed_proxy(format!("port 0 in {}", url)));
    }

    Ok(ProxyDescriptor {
        scheme,
        host: host.to_string(),
        port,
        username,
        password,
    })
}

fn decode_credential(url: &str, raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| Error::malformed_proxy(format!("invalid credentials in {}: {}", url, e)))
}
