use crate::probe::{Endpoint, ProbeErrorKind, ProbeOutcome, Prober};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Probe every domain directly and report all outcomes
///
/// No proxies, no early exit. Successes come first by ascending latency,
/// failures follow in input order.
pub async fn test_all<D: AsRef<str>>(
    prober: Arc<dyn Prober>,
    domains: &[D],
    test_path: &str,
) -> Vec<ProbeOutcome> {
    let endpoints: Vec<Endpoint> = domains
        .iter()
        .enumerate()
        .map(|(i, d)| Endpoint::direct(i, d.as_ref()))
        .collect();

    info!("Testing {} domains", endpoints.len());

    let tasks = endpoints.iter().cloned().map(|endpoint| {
        let prober = prober.clone();
        let test_path = test_path.to_string();
        tokio::spawn(async move {
            // never cancelled; each probe runs to its own deadline
            let token = CancellationToken::new();
            prober.probe(&endpoint, &test_path, &token).await
        })
    });

    let mut outcomes: Vec<ProbeOutcome> = join_all(tasks)
        .await
        .into_iter()
        .zip(endpoints)
        .map(|(joined, endpoint)| match joined {
            Ok(outcome) => outcome,
            Err(e) => ProbeOutcome::failure(
                endpoint,
                Duration::ZERO,
                ProbeErrorKind::NetworkError(format!("probe task failed: {}", e)),
            ),
        })
        .collect();

    // stable: failures keep input order
    outcomes.sort_by_key(|o| (!o.succeeded, if o.succeeded { o.elapsed } else { Duration::ZERO }));

    for outcome in &outcomes {
        debug!("{}", outcome);
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct LatencyProber;

    #[async_trait]
    impl Prober for LatencyProber {
        async fn probe(
            &self,
            endpoint: &Endpoint,
            _test_path: &str,
            _token: &CancellationToken,
        ) -> ProbeOutcome {
            assert!(!endpoint.uses_proxy());
            let (ms, ok) = match endpoint.target.as_str() {
                "slow.example.com" => (80, true),
                "fast.example.com" => (10, true),
                "late-broken.example.com" => (40, false),
                _ => (1, false),
            };
            let elapsed = Duration::from_millis(ms);
            tokio::time::sleep(elapsed).await;
            if ok {
                ProbeOutcome::success(endpoint.clone(), elapsed)
            } else {
                ProbeOutcome::failure(endpoint.clone(), elapsed, ProbeErrorKind::ConnectionTimeout)
            }
        }
    }

    #[tokio::test]
    async fn test_successes_first_by_latency() {
        let outcomes = test_all(
            Arc::new(LatencyProber),
            &["slow.example.com", "fast.example.com", "broken.example.com"],
            "",
        )
        .await;

        let order: Vec<_> = outcomes
            .iter()
            .map(|o| (o.endpoint.target.as_str(), o.succeeded))
            .collect();
        assert_eq!(
            order,
            vec![
                ("fast.example.com", true),
                ("slow.example.com", true),
                ("broken.example.com", false),
            ]
        );
    }

    #[tokio::test]
    async fn test_failures_keep_input_order() {
        let outcomes = test_all(
            Arc::new(LatencyProber),
            &["late-broken.example.com", "broken.example.com", "fast.example.com"],
            "",
        )
        .await;

        let targets: Vec<_> = outcomes.iter().map(|o| o.endpoint.target.as_str()).collect();
        assert_eq!(
            targets,
            vec!["fast.example.com", "late-broken.example.com", "broken.example.com"]
        );
    }

    #[tokio::test]
    async fn test_empty_domains() {
        let outcomes = test_all::<&str>(Arc::new(LatencyProber), &[], "").await;
        assert!(outcomes.is_empty());
    }
}
