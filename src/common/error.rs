//! Error types for the resolver

use crate::probe::ProbeErrorKind;
use std::io;
use thiserror::Error;

/// Resolver error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed proxy config: {0}")]
    MalformedProxyConfig(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("No reachable endpoint ({attempts} attempts)")]
    NoReachableEndpoint { attempts: usize },

    #[error("Request failed: {0}")]
    Attempt(ProbeErrorKind),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn malformed_proxy<S: Into<String>>(msg: S) -> Self {
        Error::MalformedProxyConfig(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Error::Parse(msg.into())
    }

    pub fn tls<S: Into<String>>(msg: S) -> Self {
        Error::Tls(msg.into())
    }

    pub fn network<S: Into<String>>(msg: S) -> Self {
        Error::Network(msg.into())
    }

    /// True for errors caused by configuration rather than the network
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::MalformedProxyConfig(_) | Error::Parse(_)
        )
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Error::Tls(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;
