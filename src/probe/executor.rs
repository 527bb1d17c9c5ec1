//! HTTP probe executor

use super::client::{build_client, classify_error, tls_for, Redirects};
use super::{Endpoint, HeaderProvider, ProbeErrorKind, ProbeOutcome, Prober};
use crate::common::{build_probe_url, TargetKind};
use crate::trust::TrustStoreManager;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Deadlines applied to every probe
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    /// Connection establishment deadline (TCP, relay handshake, TLS)
    pub connect_timeout: Duration,
    /// Deadline for the whole request, body included
    pub response_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            connect_timeout: Duration::from_secs(3),
            response_timeout: Duration::from_secs(5),
        }
    }
}

/// Probes endpoints with an HTTPS GET
pub struct HttpProber {
    settings: ProbeSettings,
    trust: Arc<TrustStoreManager>,
    headers: Arc<dyn HeaderProvider>,
}

impl HttpProber {
    pub fn new(
        settings: ProbeSettings,
        trust: Arc<TrustStoreManager>,
        headers: Arc<dyn HeaderProvider>,
    ) -> Self {
        HttpProber {
            settings,
            trust,
            headers,
        }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    async fn execute(
        &self,
        endpoint: &Endpoint,
        kind: TargetKind,
        url: &str,
        token: &CancellationToken,
        start: Instant,
    ) -> Result<(), ProbeErrorKind> {
        checkpoint(token)?;

        let tls = tls_for(&self.trust, kind, endpoint.uses_proxy())
            .await
            .map_err(|e| ProbeErrorKind::NetworkError(e.to_string()))?;
        let client = build_client(endpoint, tls, self.settings.connect_timeout, Redirects::None)
            .map_err(|e| ProbeErrorKind::NetworkError(e.to_string()))?;

        let request = client
            .get(url)
            .headers(self.headers.headers(kind))
            .timeout(self.settings.response_timeout);

        checkpoint(token)?;
        trace!("[{}] GET {}", endpoint.index, url);

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ProbeErrorKind::Cancelled),
            res = request.send() => res.map_err(|e| {
                classify_error(&e, start.elapsed(), self.settings.response_timeout)
            })?,
        };

        check_status(response.status().as_u16())?;

        checkpoint(token)?;

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ProbeErrorKind::Cancelled),
            body = response.bytes() => body.map(|_| ()).map_err(|e| {
                classify_error(&e, start.elapsed(), self.settings.response_timeout)
            }),
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(
        &self,
        endpoint: &Endpoint,
        test_path: &str,
        token: &CancellationToken,
    ) -> ProbeOutcome {
        let kind = TargetKind::classify(&endpoint.target);

        let start = Instant::now();
        let url = build_probe_url(&endpoint.target, test_path);
        let result = self.execute(endpoint, kind, &url, token, start).await;
        let elapsed = start.elapsed();

        match result {
            Ok(()) => {
                debug!("[{}] {} reachable in {}ms", endpoint.index, endpoint, elapsed.as_millis());
                ProbeOutcome::success(endpoint.clone(), elapsed)
            }
            Err(ProbeErrorKind::Cancelled) => {
                debug!("[{}] {} cancelled", endpoint.index, endpoint);
                ProbeOutcome::failure(endpoint.clone(), elapsed, ProbeErrorKind::Cancelled)
            }
            Err(e) => {
                debug!("[{}] {} failed: {}", endpoint.index, endpoint, e);
                ProbeOutcome::failure(endpoint.clone(), elapsed, e)
            }
        }
    }
}

/// Probes accept `[200, 400)`; redirects are not followed, so 3xx counts
fn check_status(status: u16) -> Result<(), ProbeErrorKind> {
    if (200..400).contains(&status) {
        Ok(())
    } else {
        Err(ProbeErrorKind::HttpStatus(status))
    }
}

fn checkpoint(token: &CancellationToken) -> Result<(), ProbeErrorKind> {
    if token.is_cancelled() {
        Err(ProbeErrorKind::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::StaticHeaders;
    use tokio::net::TcpListener;

    fn prober(connect_ms: u64, response_ms: u64) -> HttpProber {
        HttpProber::new(
            ProbeSettings {
                connect_timeout: Duration::from_millis(connect_ms),
                response_timeout: Duration::from_millis(response_ms),
            },
            Arc::new(TrustStoreManager::new()),
            Arc::new(StaticHeaders::default()),
        )
    }

    #[test]
    fn test_status_window() {
        for ok in [200, 204, 301, 302, 399] {
            assert_eq!(check_status(ok), Ok(()), "{}", ok);
        }
        for bad in [100, 199, 400, 404, 500, 503] {
            assert_eq!(check_status(bad), Err(ProbeErrorKind::HttpStatus(bad)));
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let token = CancellationToken::new();
        token.cancel();

        let endpoint = Endpoint::direct(0, "panel.example.com");
        let outcome = prober(1000, 2000).probe(&endpoint, "", &token).await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.error, Some(ProbeErrorKind::Cancelled));
        assert_eq!(outcome.endpoint, endpoint);
    }

    #[tokio::test]
    async fn test_silent_server_is_connection_timeout() {
        // accepts TCP but never completes the TLS handshake
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let endpoint = Endpoint::direct(0, addr.to_string());
        let outcome = prober(200, 5000)
            .probe(&endpoint, "/ping", &CancellationToken::new())
            .await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.error, Some(ProbeErrorKind::ConnectionTimeout));
        assert!(outcome.elapsed < Duration::from_secs(5));
        server.abort();
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::direct(0, addr.to_string());
        let outcome = prober(1000, 2000)
            .probe(&endpoint, "/ping", &CancellationToken::new())
            .await;

        assert!(!outcome.succeeded);
        assert!(matches!(outcome.error, Some(ProbeErrorKind::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_cancel_during_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let endpoint = Endpoint::direct(0, addr.to_string());
        let outcome = prober(5000, 10000).probe(&endpoint, "", &token).await;

        assert!(outcome.is_cancelled());
        assert!(outcome.elapsed < Duration::from_secs(5));
        server.abort();
    }
}
