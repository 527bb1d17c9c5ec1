//! Edge Racer - concurrent endpoint selection
//!
//! Given candidate server addresses and optional relays, every
//! (address, connection path) pair is probed at once and the first
//! successful answer decides which endpoint the caller should use. The same
//! racing core downloads subscription resources over the fastest path.
//!
//! # Architecture
//!
//! ```text
//!                     +----------------+
//!                     |   Resolver     |
//!                     +-------+--------+
//!                             |
//!        +--------------------+--------------------+
//!        |                    |                    |
//! +------v------+     +-------v-------+    +------v------+
//! |   config/   |     |    race/      |    |  provider/  |
//! | (proxies)   |     | (coordinator) |    | (download)  |
//! +-------------+     +-------+-------+    +------+------+
//!                             |                   |
//!                     +-------v-------+           |
//!                     |    probe/     |<----------+
//!                     +-------+-------+
//!                             |
//!                     +-------v-------+
//!                     |    trust/     |
//!                     +---------------+
//! ```

pub mod common;
pub mod config;
pub mod probe;
pub mod provider;
pub mod race;
pub mod trust;

pub use common::error::{Error, Result};
pub use config::{Config, ProxyDescriptor};

use probe::{enumerate, Endpoint, HttpProber, ProbeOutcome, ProbeSettings, Prober, StaticHeaders};
use provider::{Download, FetchOutcome, Fetcher};
use race::{race, race_with};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trust::TrustStoreManager;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Input of an endpoint selection
#[derive(Debug, Clone, Default)]
pub struct SelectRequest {
    pub domains: Vec<String>,
    /// Falls back to the default health-check path when `None` or empty
    pub test_path: Option<String>,
    pub proxies: Vec<String>,
    pub force_https: bool,
}

impl SelectRequest {
    pub fn from_config(config: &Config) -> Self {
        SelectRequest {
            domains: config.domains.clone(),
            test_path: Some(config.test_path.clone()),
            proxies: config.proxies.clone(),
            force_https: config.force_https,
        }
    }
}

/// Winning endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub address: String,
    pub uses_proxy: bool,
    pub proxy: Option<ProxyDescriptor>,
    pub elapsed_ms: u64,
}

/// Entry point for endpoint selection and downloads
pub struct Resolver {
    trust: Arc<TrustStoreManager>,
    prober: Arc<dyn Prober>,
    fetcher: Arc<Fetcher>,
    proxies: Vec<String>,
    cancel_losers: bool,
}

impl Resolver {
    /// Create a resolver from configuration
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let trust = Arc::new(TrustStoreManager::new());
        if let Some(path) = &config.certificate_path {
            trust.set_certificate_path(path.clone());
        }

        let headers = Arc::new(StaticHeaders::from_config(&config.headers)?);
        let settings = ProbeSettings {
            connect_timeout: config.connect_timeout(),
            response_timeout: config.response_timeout(),
        };
        let prober = Arc::new(HttpProber::new(settings, trust.clone(), headers.clone()));
        let fetcher = Arc::new(Fetcher::new(
            trust.clone(),
            headers,
            config.connect_timeout(),
            config.download.timeout(),
        ));

        Ok(Resolver {
            trust,
            prober,
            fetcher,
            proxies: config.proxies.clone(),
            cancel_losers: config.cancel_losers,
        })
    }

    /// Replace the prober used for selection and batch tests
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    /// Pin the CA bundle used for direct ip-literal targets
    pub fn set_certificate_path<P: Into<PathBuf>>(&self, path: P) {
        self.trust.set_certificate_path(path);
    }

    pub fn trust(&self) -> &Arc<TrustStoreManager> {
        &self.trust
    }

    /// Race every (domain, path) pair and return the first to answer
    ///
    /// `Ok(None)` when nothing answered; `Err` only for a malformed proxy.
    pub async fn select_endpoint(&self, request: &SelectRequest) -> Result<Option<Selection>> {
        let endpoints = enumerate(&request.domains, &request.proxies)?;
        let test_path = request.test_path.as_deref().unwrap_or_default();

        let report = race(self.prober.clone(), endpoints, test_path, self.cancel_losers).await;

        let Some(result) = report.result() else {
            if report.diagnostics.total() > 0 {
                warn!(
                    "No reachable endpoint among {} candidates",
                    report.diagnostics.total()
                );
                for failure in report.diagnostics.failures() {
                    debug!("  {}", failure);
                }
            }
            return Ok(None);
        };

        let address = if request.force_https {
            result.normalized_https()
        } else {
            result.winner.target.clone()
        };

        Ok(Some(Selection {
            address,
            uses_proxy: result.winner.uses_proxy(),
            proxy: result.winner.proxy.clone(),
            elapsed_ms: result.elapsed.as_millis() as u64,
        }))
    }

    /// Probe each domain directly and report every outcome
    pub async fn test_all<D: AsRef<str>>(&self, domains: &[D], test_path: &str) -> Vec<ProbeOutcome> {
        race::test_all(self.prober.clone(), domains, test_path).await
    }

    /// Download `url`, either directly or raced over every configured proxy
    pub async fn download(&self, url: &str, race: bool) -> Result<Download> {
        url::Url::parse(url).map_err(|e| Error::parse(format!("Invalid download URL '{}': {}", url, e)))?;

        if !race {
            let endpoint = Endpoint::direct(0, url);
            let fetched = self.fetcher.fetch(&endpoint, &CancellationToken::new()).await;
            return into_download(fetched);
        }

        let endpoints = enumerate(&[url], &self.proxies)?;
        let total = endpoints.len();
        let fetcher = self.fetcher.clone();

        let report = race_with(endpoints, self.cancel_losers, move |endpoint, token| {
            let fetcher = fetcher.clone();
            async move { fetcher.fetch(&endpoint, &token).await }
        })
        .await;

        match report.winner {
            Some(fetched) => into_download(fetched),
            None => {
                warn!("Download of {} failed over all {} paths", url, total);
                for failure in report.diagnostics.failures() {
                    debug!("  {}", failure);
                }
                Err(Error::NoReachableEndpoint { attempts: total })
            }
        }
    }
}

fn into_download(fetched: FetchOutcome) -> Result<Download> {
    let FetchOutcome { outcome, payload } = fetched;
    match (payload, outcome.error) {
        (Some((body, headers)), _) => {
            let via = match &outcome.endpoint.proxy {
                Some(proxy) => proxy.to_string(),
                None => "direct".to_string(),
            };
            info!("Downloaded {} bytes via {} in {}ms", body.len(), via, outcome.elapsed.as_millis());
            Ok(Download::from_response(body, &headers, via, outcome.elapsed))
        }
        (None, Some(kind)) => Err(Error::Attempt(kind)),
        (None, None) => Err(Error::network("download finished without a body")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_select_request_from_config() {
        let config = Config::from_str(
            "domains: [a.example.com]\nproxies: [\"10.0.0.1:1080\"]\nforce-https: false\n",
        )
        .unwrap();
        let request = SelectRequest::from_config(&config);
        assert_eq!(request.domains, vec!["a.example.com"]);
        assert_eq!(request.proxies.len(), 1);
        assert!(!request.force_https);
    }

    #[tokio::test]
    async fn test_download_rejects_bad_url() {
        let resolver = Resolver::new(&Config::default()).unwrap();
        assert!(matches!(
            resolver.download("not a url", false).await,
            Err(Error::Parse(_))
        ));
    }
}
