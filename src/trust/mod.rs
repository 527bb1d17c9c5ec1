//! Trust store management
//!
//! Endpoints addressed as `ip:port` cannot be verified by hostname, so when
//! a CA bundle is configured they are validated against it instead of the
//! web PKI. The bundle is loaded lazily, once per configured path, and a
//! failed load degrades to platform trust instead of blocking connectivity.

mod tls;

pub use tls::{accept_any_config, config_with_roots, platform_config, platform_roots};

use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rustls::{ClientConfig, RootCertStore};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Trust configuration handed to probes
#[derive(Debug, Clone)]
pub enum TrustStore {
    /// Bundled web PKI roots, no pinning
    Platform,
    /// Only the configured CA bundle is trusted
    Pinned(Arc<ClientConfig>),
}

impl TrustStore {
    pub fn is_pinned(&self) -> bool {
        matches!(self, TrustStore::Pinned(_))
    }

    /// rustls config for this store
    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        match self {
            TrustStore::Platform => Ok(Arc::new(platform_config()?)),
            TrustStore::Pinned(config) => Ok(config.clone()),
        }
    }
}

/// Supplies certificate bundle bytes
#[async_trait]
pub trait CertificateSource: Send + Sync {
    async fn load(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// Reads certificate bundles from the file system
pub struct FileCertificateSource;

#[async_trait]
impl CertificateSource for FileCertificateSource {
    async fn load(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

struct Slot {
    path: Option<PathBuf>,
    cell: Arc<OnceCell<TrustStore>>,
}

impl Slot {
    fn new(path: Option<PathBuf>) -> Self {
        Slot {
            path,
            cell: Arc::new(OnceCell::new()),
        }
    }
}

/// Lazily loads and caches the pinned trust store
pub struct TrustStoreManager {
    source: Arc<dyn CertificateSource>,
    slot: Mutex<Slot>,
    loads: AtomicUsize,
}

impl TrustStoreManager {
    pub fn new() -> Self {
        Self::with_source(Arc::new(FileCertificateSource))
    }

    pub fn with_source(source: Arc<dyn CertificateSource>) -> Self {
        TrustStoreManager {
            source,
            slot: Mutex::new(Slot::new(None)),
            loads: AtomicUsize::new(0),
        }
    }

    /// Configure the CA bundle path; drops any cached store
    pub fn set_certificate_path<P: Into<PathBuf>>(&self, path: P) {
        let path = path.into();
        debug!("Certificate path set to {}", path.display());
        *self.slot.lock() = Slot::new(Some(path));
    }

    /// Remove the CA bundle path; probes fall back to platform trust
    pub fn clear_certificate_path(&self) {
        *self.slot.lock() = Slot::new(None);
    }

    pub fn certificate_path(&self) -> Option<PathBuf> {
        self.slot.lock().path.clone()
    }

    /// Number of bundle loads performed so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Get the trust store, loading the bundle on first use
    pub async fn get_trust_store(&self) -> TrustStore {
        let (path, cell) = {
            let slot = self.slot.lock();
            (slot.path.clone(), slot.cell.clone())
        };

        let Some(path) = path else {
            return TrustStore::Platform;
        };

        cell.get_or_init(|| self.load(path)).await.clone()
    }

    async fn load(&self, path: PathBuf) -> TrustStore {
        self.loads.fetch_add(1, Ordering::SeqCst);

        match self.try_load(&path).await {
            Ok((config, count)) => {
                info!("Loaded {} pinned certificate(s) from {}", count, path.display());
                TrustStore::Pinned(Arc::new(config))
            }
            Err(e) => {
                warn!(
                    "Failed to load certificates from {}: {}, using platform trust",
                    path.display(),
                    e
                );
                TrustStore::Platform
            }
        }
    }

    async fn try_load(&self, path: &Path) -> Result<(ClientConfig, usize)> {
        let pem = self.source.load(path).await?;
        let roots = parse_roots(&pem)?;
        let count = roots.len();
        Ok((config_with_roots(roots)?, count))
    }
}

impl Default for TrustStoreManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a PEM bundle into a root store
pub fn parse_roots(pem: &[u8]) -> Result<RootCertStore> {
    let mut reader = pem;
    let mut roots = RootCertStore::empty();

    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| Error::tls(format!("Invalid PEM: {}", e)))?;
        roots.add(cert)?;
    }

    if roots.is_empty() {
        return Err(Error::tls("No certificates found in bundle"));
    }

    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Serves fixed bytes after a delay, counting reads
    struct SlowSource {
        bytes: Vec<u8>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl CertificateSource for SlowSource {
        async fn load(&self, _path: &Path) -> std::io::Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self.bytes.clone())
        }
    }

    fn slow_source(bytes: &[u8]) -> Arc<SlowSource> {
        Arc::new(SlowSource {
            bytes: bytes.to_vec(),
            reads: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_no_path_is_platform() {
        let manager = TrustStoreManager::new();
        assert!(!manager.get_trust_store().await.is_pinned());
        assert_eq!(manager.load_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back() {
        let manager = TrustStoreManager::new();
        manager.set_certificate_path("/nonexistent/edge-racer/ca.pem");

        assert!(!manager.get_trust_store().await.is_pinned());
        assert!(!manager.get_trust_store().await.is_pinned());
        // the failed load is cached until the path changes
        assert_eq!(manager.load_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_loads_once() {
        let source = slow_source(b"not a certificate");
        let manager = Arc::new(TrustStoreManager::with_source(source.clone()));
        manager.set_certificate_path("/etc/edge-racer/ca.pem");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_trust_store().await })
            })
            .collect();

        for store in futures::future::join_all(handles).await {
            assert!(!store.unwrap().is_pinned());
        }

        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        assert_eq!(manager.load_count(), 1);
    }

    #[tokio::test]
    async fn test_reconfigure_invalidates_cache() {
        let source = slow_source(b"");
        let manager = TrustStoreManager::with_source(source.clone());

        manager.set_certificate_path("/etc/edge-racer/a.pem");
        manager.get_trust_store().await;
        manager.get_trust_store().await;
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);

        manager.set_certificate_path("/etc/edge-racer/b.pem");
        manager.get_trust_store().await;
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
        assert_eq!(
            manager.certificate_path(),
            Some(PathBuf::from("/etc/edge-racer/b.pem"))
        );

        manager.clear_certificate_path();
        manager.get_trust_store().await;
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parse_roots_rejects_empty_bundle() {
        assert!(matches!(parse_roots(b""), Err(Error::Tls(_))));
        assert!(matches!(
            parse_roots(b"-----BEGIN CERTIFICATE-----\n!!!\n-----END CERTIFICATE-----\n"),
            Err(Error::Tls(_))
        ));
    }
}
