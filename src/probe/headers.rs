//! Outbound header profiles

use crate::common::TargetKind;
use crate::config::HeaderConfig;
use crate::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::collections::HashMap;

/// Supplies request headers for a target kind
pub trait HeaderProvider: Send + Sync {
    fn headers(&self, kind: TargetKind) -> HeaderMap;
}

/// Fixed header profiles built from configuration
#[derive(Debug, Clone)]
pub struct StaticHeaders {
    hostname: HeaderMap,
    ip_literal: HeaderMap,
}

impl StaticHeaders {
    pub fn from_config(config: &HeaderConfig) -> Result<Self> {
        Ok(StaticHeaders {
            hostname: to_header_map(&config.hostname)?,
            ip_literal: to_header_map(&config.ip_literal)?,
        })
    }
}

impl Default for StaticHeaders {
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        StaticHeaders {
            hostname: headers.clone(),
            ip_literal: headers,
        }
    }
}

impl HeaderProvider for StaticHeaders {
    fn headers(&self, kind: TargetKind) -> HeaderMap {
        match kind {
            TargetKind::Hostname => self.hostname.clone(),
            TargetKind::IpLiteral => self.ip_literal.clone(),
        }
    }
}

const DEFAULT_USER_AGENT: &str = concat!("edge-racer/", env!("CARGO_PKG_VERSION"));

fn to_header_map(entries: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(entries.len() + 1);
    for (name, value) in entries {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::config(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::config(format!("Invalid value for header '{}': {}", name, e)))?;
        headers.insert(name, value);
    }
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_by_kind() {
        let mut config = HeaderConfig::default();
        config
            .ip_literal
            .insert("Host".to_string(), "panel.example.com".to_string());
        config
            .hostname
            .insert("User-Agent".to_string(), "custom/1.0".to_string());

        let headers = StaticHeaders::from_config(&config).unwrap();

        let ip = headers.headers(TargetKind::IpLiteral);
        assert_eq!(ip.get("host").unwrap(), "panel.example.com");
        assert_eq!(ip.get(USER_AGENT).unwrap(), DEFAULT_USER_AGENT);

        let host = headers.headers(TargetKind::Hostname);
        assert!(host.get("host").is_none());
        assert_eq!(host.get(USER_AGENT).unwrap(), "custom/1.0");
    }

    #[test]
    fn test_invalid_header_name() {
        let mut config = HeaderConfig::default();
        config
            .hostname
            .insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            StaticHeaders::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
