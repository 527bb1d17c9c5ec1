//! Endpoint enumeration

use crate::common::TargetKind;
use crate::config::{parse_proxy, ProxyDescriptor};
use crate::Result;
use serde::Serialize;
use std::fmt;

/// One probe target: an address reached directly or through a relay
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    /// Position in the enumeration, for logs only
    pub index: usize,
    pub target: String,
    pub proxy: Option<ProxyDescriptor>,
}

impl Endpoint {
    pub fn direct<S: Into<String>>(index: usize, target: S) -> Self {
        Endpoint {
            index,
            target: target.into(),
            proxy: None,
        }
    }

    pub fn via_proxy<S: Into<String>>(index: usize, target: S, proxy: ProxyDescriptor) -> Self {
        Endpoint {
            index,
            target: target.into(),
            proxy: Some(proxy),
        }
    }

    pub fn uses_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    pub fn kind(&self) -> TargetKind {
        TargetKind::classify(&self.target)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.proxy {
            Some(proxy) => write!(f, "{} (via {})", self.target, proxy),
            None => write!(f, "{} (direct)", self.target),
        }
    }
}

/// Expand domains x {direct, proxy_1..proxy_n} into probe endpoints
///
/// Fails as a whole if any proxy string is malformed.
pub fn enumerate<D, P>(domains: &[D], proxies: &[P]) -> Result<Vec<Endpoint>>
where
    D: AsRef<str>,
    P: AsRef<str>,
{
    let proxies = proxies
        .iter()
        .map(|p| parse_proxy(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let mut endpoints = Vec::with_capacity(domains.len() * (1 + proxies.len()));
    for domain in domains {
        let domain = domain.as_ref();
        endpoints.push(Endpoint::direct(endpoints.len(), domain));
        for proxy in &proxies {
            endpoints.push(Endpoint::via_proxy(endpoints.len(), domain, proxy.clone()));
        }
    }

    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_enumerate_counts() {
        let domains = ["a.example.com", "b.example.com", "1.2.3.4:8443"];
        let proxies = ["socks5://10.0.0.1:1080", "http://10.0.0.2:3128"];
        let endpoints = enumerate(&domains, &proxies).unwrap();

        assert_eq!(endpoints.len(), 3 * (1 + 2));
        assert_eq!(endpoints.iter().filter(|e| !e.uses_proxy()).count(), 3);
    }

    #[test]
    fn test_enumerate_order() {
        let endpoints = enumerate(&["a.example.com", "b.example.com"], &["10.0.0.1:1080"]).unwrap();

        let layout: Vec<_> = endpoints
            .iter()
            .map(|e| (e.index, e.target.as_str(), e.uses_proxy()))
            .collect();
        assert_eq!(
            layout,
            vec![
                (0, "a.example.com", false),
                (1, "a.example.com", true),
                (2, "b.example.com", false),
                (3, "b.example.com", true),
            ]
        );
    }

    #[test]
    fn test_enumerate_without_proxies() {
        let endpoints = enumerate::<_, &str>(&["a.example.com"], &[]).unwrap();
        assert_eq!(endpoints, vec![Endpoint::direct(0, "a.example.com")]);
    }

    #[test]
    fn test_enumerate_empty_domains() {
        let endpoints = enumerate::<&str, _>(&[], &["10.0.0.1:1080"]).unwrap();
        assert!(endpoints.is_empty());
    }

    #[test]
    fn test_malformed_proxy_fails_whole_enumeration() {
        let err = enumerate(&["a.example.com"], &["10.0.0.1:1080", "socks5://10.0.0.1"]).unwrap_err();
        assert!(matches!(err, Error::MalformedProxyConfig(_)));
    }
}
