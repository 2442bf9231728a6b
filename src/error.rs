//! Error types for the polling pipeline
//!
//! Every error here is recoverable: the worst outcome of any of them is a
//! poll cycle that produces no visible update.

use thiserror::Error;

/// Failure of a single fetch (network call + parse).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Timeout, refused connection, DNS failure or a broken body stream
    #[error("network error: {0}")]
    Network(String),

    /// Remote answered with a non-2xx status
    #[error("remote returned HTTP {status}")]
    Remote { status: u16 },

    /// Payload did not have the expected shape
    #[error("unexpected payload ({bytes} bytes): {reason}")]
    Parse { bytes: usize, reason: String },
}

impl FetchError {
    pub fn parse(raw: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            bytes: raw.len(),
            reason: reason.into(),
        }
    }

    /// Short label used for metrics and status output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Remote { .. } => "remote",
            Self::Parse { .. } => "parse",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Remote {
                status: status.as_u16(),
            },
            None => Self::Network(err.to_string()),
        }
    }
}

/// The cache/log backing store could not be reached.
///
/// Callers treat this as a miss; it is never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("store unavailable: {0}")]
pub struct StoreUnavailable(pub String);

/// One notification could not be delivered by one sink.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("sink `{sink}` failed: {reason}")]
pub struct SinkDeliveryError {
    pub sink: String,
    pub reason: String,
}

impl SinkDeliveryError {
    pub fn new(sink: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            sink: sink.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure of a whole poll cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("fetch from `{feed}` failed: {err}")]
    Fetch { feed: String, err: FetchError },

    /// The host has not marked itself ready yet; no cycle ran.
    #[error("`{feed}` is not polling yet: host not ready")]
    NotReady { feed: String },
}

impl PollError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { err, .. } => err.kind(),
            Self::NotReady { .. } => "not_ready",
        }
    }
}

/// Invalid watch configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("source `{name}`: {reason}")]
    InvalidSource { name: String, reason: String },

    #[error("duplicate source name `{0}`")]
    DuplicateSource(String),

    #[error("unsupported config format")]
    UnsupportedFormat,
}
