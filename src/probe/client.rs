//! Per-attempt HTTP client construction

use super::{Endpoint, ProbeErrorKind};
use crate::common::TargetKind;
use crate::trust::{accept_any_config, platform_config, TrustStoreManager};
use crate::Result;
use rustls::ClientConfig;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

/// Redirect handling for an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirects {
    /// 3xx answers are final (probes)
    None,
    /// Follow up to reqwest's default limit (downloads)
    Follow,
}

/// Pick the TLS configuration for a target
///
/// Only direct connections to `ip:port` targets use the pinned store; the
/// same targets reached through a relay accept any certificate.
pub async fn tls_for(
    trust: &TrustStoreManager,
    kind: TargetKind,
    uses_proxy: bool,
) -> Result<Arc<ClientConfig>> {
    match (kind, uses_proxy) {
        (TargetKind::IpLiteral, false) => trust.get_trust_store().await.client_config(),
        (TargetKind::IpLiteral, true) => Ok(Arc::new(accept_any_config()?)),
        (TargetKind::Hostname, _) => Ok(Arc::new(platform_config()?)),
    }
}

/// Build a single-use client for one endpoint
pub fn build_client(
    endpoint: &Endpoint,
    tls: Arc<ClientConfig>,
    connect_timeout: Duration,
    redirects: Redirects,
) -> Result<reqwest::Client> {
    let policy = match redirects {
        Redirects::None => reqwest::redirect::Policy::none(),
        Redirects::Follow => reqwest::redirect::Policy::default(),
    };

    let builder = reqwest::Client::builder()
        .use_preconfigured_tls((*tls).clone())
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(0)
        .redirect(policy);

    let builder = match &endpoint.proxy {
        Some(proxy) => builder.proxy(reqwest::Proxy::all(proxy.to_proxy_url())?),
        None => builder.no_proxy(),
    };

    Ok(builder.build()?)
}

/// Map a client error to a probe failure
///
/// A timeout that fires before the response deadline can only come from the
/// connect deadline.
pub fn classify_error(
    err: &reqwest::Error,
    elapsed: Duration,
    response_timeout: Duration,
) -> ProbeErrorKind {
    if err.is_timeout() {
        if err.is_connect() || elapsed < response_timeout {
            ProbeErrorKind::ConnectionTimeout
        } else {
            ProbeErrorKind::ResponseTimeout
        }
    } else {
        ProbeErrorKind::NetworkError(report(err))
    }
}

fn report(mut err: &(dyn StdError + 'static)) -> String {
    let mut s = err.to_string();
    while let Some(src) = err.source() {
        s.push_str(": ");
        s.push_str(&src.to_string());
        err = src;
    }
    s
}
