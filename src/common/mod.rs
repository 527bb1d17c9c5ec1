//! Common utilities and types

pub mod error;
pub mod net;

pub use error::{Error, Result};
pub use net::{build_probe_url, normalize_https, TargetKind, DEFAULT_TEST_PATH};
