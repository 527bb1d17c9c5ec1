//! Subscription download
//!
//! A subscription URL is fetched either directly or raced over every
//! configured proxy. Only two response headers are interpreted: the
//! suggested file name and the usage summary.

mod fetcher;

pub use fetcher::{FetchOutcome, Fetcher};

use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Response header carrying the usage summary
pub const USAGE_HEADER: &str = "subscription-userinfo";

/// Subscription information parsed from headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Upload bytes used
    pub upload: u64,
    /// Download bytes used
    pub download: u64,
    /// Total bytes available
    pub total: u64,
    /// Expiration timestamp (Unix epoch)
    pub expire: u64,
}

impl SubscriptionInfo {
    /// Parse from Subscription-Userinfo header
    ///
    /// Format: "upload=xxx; download=xxx; total=xxx; expire=xxx"
    pub fn parse(header: &str) -> Option<Self> {
        let mut info = SubscriptionInfo::default();
        let mut seen = false;

        for part in header.split(';') {
            if let Some((key, value)) = part.trim().split_once('=') {
                let value: u64 = value.trim().parse().unwrap_or(0);
                match key.trim().to_lowercase().as_str() {
                    "upload" => info.upload = value,
                    "download" => info.download = value,
                    "total" => info.total = value,
                    "expire" => info.expire = value,
                    _ => continue,
                }
                seen = true;
            }
        }

        seen.then_some(info)
    }

    /// Bytes left before the quota is exhausted
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.upload.saturating_add(self.download))
    }
}

/// A downloaded resource
#[derive(Debug, Clone)]
pub struct Download {
    pub body: Bytes,
    /// File name suggested by `Content-Disposition`
    pub label: Option<String>,
    /// Raw usage summary header
    pub usage: Option<String>,
    /// Connection path that delivered the body
    pub via: String,
    pub elapsed: Duration,
}

impl Download {
    pub fn from_response(body: Bytes, headers: &HeaderMap, via: String, elapsed: Duration) -> Self {
        let label = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(content_disposition_label);
        let usage = headers
            .get(USAGE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Download {
            body,
            label,
            usage,
            via,
            elapsed,
        }
    }

    pub fn subscription_info(&self) -> Option<SubscriptionInfo> {
        self.usage.as_deref().and_then(SubscriptionInfo::parse)
    }

    /// Body as text, if it is valid UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Extract the file name from a `Content-Disposition` value
///
/// `filename*=UTF-8''...` (percent-encoded) takes precedence over `filename=`.
pub fn content_disposition_label(value: &str) -> Option<String> {
    let mut plain = None;

    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = match raw.trim().split_once("''") {
                    Some((_charset, rest)) => rest,
                    None => raw.trim(),
                };
                if let Ok(decoded) = urlencoding::decode(encoded) {
                    if !decoded.is_empty() {
                        return Some(decoded.into_owned());
                    }
                }
            }
            "filename" => {
                let name = raw.trim().trim_matches('"');
                if !name.is_empty() {
                    plain = Some(name.to_string());
                }
            }
            _ => {}
        }
    }

    plain
}
