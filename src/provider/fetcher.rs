//! Resource fetcher used by the download race

use crate::common::TargetKind;
use crate::probe::{build_client, classify_error, tls_for, Endpoint, HeaderProvider, ProbeErrorKind, ProbeOutcome, Redirects};
use crate::race::RaceOutcome;
use crate::trust::TrustStoreManager;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One fetch attempt: the probe-level outcome plus the payload on success
pub struct FetchOutcome {
    pub outcome: ProbeOutcome,
    pub payload: Option<(Bytes, HeaderMap)>,
}

impl RaceOutcome for FetchOutcome {
    fn succeeded(&self) -> bool {
        self.outcome.succeeded
    }

    fn summary(&self) -> ProbeOutcome {
        self.outcome.clone()
    }
}

/// Downloads a resource over one connection path
pub struct Fetcher {
    trust: Arc<TrustStoreManager>,
    headers: Arc<dyn HeaderProvider>,
    connect_timeout: Duration,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(
        trust: Arc<TrustStoreManager>,
        headers: Arc<dyn HeaderProvider>,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Self {
        Fetcher {
            trust,
            headers,
            connect_timeout,
            timeout,
        }
    }

    /// Total deadline for one download
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch `endpoint.target` (a full URL), following redirects
    pub async fn fetch(&self, endpoint: &Endpoint, token: &CancellationToken) -> FetchOutcome {
        let start = Instant::now();
        let result = self.fetch_inner(endpoint, token, start).await;
        let elapsed = start.elapsed();

        match result {
            Ok(payload) => {
                debug!("Fetched {} ({} bytes) in {}ms", endpoint, payload.0.len(), elapsed.as_millis());
                FetchOutcome {
                    outcome: ProbeOutcome::success(endpoint.clone(), elapsed),
                    payload: Some(payload),
                }
            }
            Err(e) => {
                debug!("Fetch {} failed: {}", endpoint, e);
                FetchOutcome {
                    outcome: ProbeOutcome::failure(endpoint.clone(), elapsed, e),
                    payload: None,
                }
            }
        }
    }

    async fn fetch_inner(
        &self,
        endpoint: &Endpoint,
        token: &CancellationToken,
        start: Instant,
    ) -> Result<(Bytes, HeaderMap), ProbeErrorKind> {
        if token.is_cancelled() {
            return Err(ProbeErrorKind::Cancelled);
        }

        let kind = TargetKind::classify(&endpoint.target);
        let tls = tls_for(&self.trust, kind, endpoint.uses_proxy())
            .await
            .map_err(|e| ProbeErrorKind::NetworkError(e.to_string()))?;
        let client = build_client(endpoint, tls, self.connect_timeout, Redirects::Follow)
            .map_err(|e| ProbeErrorKind::NetworkError(e.to_string()))?;

        let request = client
            .get(&endpoint.target)
            .headers(self.headers.headers(kind))
            .timeout(self.timeout);

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ProbeErrorKind::Cancelled),
            res = request.send() => res.map_err(|e| classify_error(&e, start.elapsed(), self.timeout))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeErrorKind::HttpStatus(status.as_u16()));
        }

        let headers = response.headers().clone();
        let body = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ProbeErrorKind::Cancelled),
            body = response.bytes() => body.map_err(|e| classify_error(&e, start.elapsed(), self.timeout))?,
        };

        Ok((body, headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::StaticHeaders;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fetcher() -> Fetcher {
        Fetcher::new(
            Arc::new(TrustStoreManager::new()),
            Arc::new(StaticHeaders::default()),
            Duration::from_secs(2),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_fetch_plain_http() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let body = "proxies: []\n";
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nsubscription-userinfo: upload=1; download=2; total=3; expire=4\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });

        let endpoint = Endpoint::direct(0, format!("http://{}/sub", addr));
        let fetched = fetcher().fetch(&endpoint, &CancellationToken::new()).await;

        assert!(fetched.succeeded());
        let (body, headers) = fetched.payload.unwrap();
        assert_eq!(&body[..], b"proxies: []\n");
        assert_eq!(
            headers.get("subscription-userinfo").unwrap(),
            "upload=1; download=2; total=3; expire=4"
        );
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            stream
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let endpoint = Endpoint::direct(0, format!("http://{}/sub", addr));
        let fetched = fetcher().fetch(&endpoint, &CancellationToken::new()).await;

        assert!(!fetched.succeeded());
        assert!(fetched.payload.is_none());
        assert_eq!(fetched.outcome.error, Some(ProbeErrorKind::HttpStatus(404)));
    }

    #[tokio::test]
    async fn test_fetch_cancelled_up_front() {
        let token = CancellationToken::new();
        token.cancel();
        let endpoint = Endpoint::direct(0, "https://panel.example.com/sub");
        let fetched = fetcher().fetch(&endpoint, &token).await;
        assert!(fetched.outcome.is_cancelled());
    }
}
