//! Configuration module

mod parser;

pub use parser::*;

use crate::common::DEFAULT_TEST_PATH;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    #[serde(rename = "log-level")]
    pub log_level: String,

    /// Candidate domains (`host`, `host:port` or a full base URL)
    pub domains: Vec<String>,

    /// Proxy connection strings, `[scheme://][user:pass@]host:port`
    pub proxies: Vec<String>,

    /// Path requested on each candidate
    #[serde(rename = "test-path")]
    pub test_path: String,

    /// Connection establishment deadline per probe
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Overall response deadline per probe
    #[serde(rename = "response-timeout-ms")]
    pub response_timeout_ms: u64,

    /// Cancel in-flight probes once a winner is known
    #[serde(rename = "cancel-losers")]
    pub cancel_losers: bool,

    /// Return the winner in `https://` form
    #[serde(rename = "force-https")]
    pub force_https: bool,

    /// CA bundle pinned for ip-literal targets
    #[serde(rename = "certificate-path")]
    pub certificate_path: Option<PathBuf>,

    /// Subscription download
    pub download: DownloadConfig,

    /// Outbound header profiles
    pub headers: HeaderConfig,
}

impl Config {
    /// Load configuration from file (synchronous)
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from file (async)
    pub async fn load_async<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_str(&content)
    }

    /// Load from string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(Error::config("connect-timeout-ms cannot be 0"));
        }
        if self.response_timeout_ms == 0 {
            return Err(Error::config("response-timeout-ms cannot be 0"));
        }
        if self.download.timeout_ms == 0 {
            return Err(Error::config("download.timeout-ms cannot be 0"));
        }
        if self.domains.iter().any(|d| d.trim().is_empty()) {
            return Err(Error::config("domains cannot contain empty entries"));
        }

        // Malformed relays are a setup error, surface them before any race
        for proxy in &self.proxies {
            parse_proxy(proxy)?;
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Save configuration to file
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).await?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            domains: Vec::new(),
            proxies: Vec::new(),
            test_path: DEFAULT_TEST_PATH.to_string(),
            connect_timeout_ms: 3000,
            response_timeout_ms: 5000,
            cancel_losers: false,
            force_https: true,
            certificate_path: None,
            download: DownloadConfig::default(),
            headers: HeaderConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_download_timeout() -> u64 {
    30_000
}

/// Subscription download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Subscription URL
    pub url: Option<String>,

    /// Race the direct path against every configured proxy
    #[serde(default = "default_true")]
    pub race: bool,

    /// Deadline for the whole download
    #[serde(default = "default_download_timeout", rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            url: None,
            race: true,
            timeout_ms: default_download_timeout(),
        }
    }
}

/// Header profiles keyed by how the target is addressed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderConfig {
    /// Headers sent to hostname targets
    #[serde(default)]
    pub hostname: HashMap<String, String>,

    /// Headers sent to `ip:port` targets
    #[serde(default, rename = "ip-literal")]
    pub ip_literal: HashMap<String, String>,
}
