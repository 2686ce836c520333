//! Error taxonomy for the collect/digest pipeline.
//!
//! Each stage reports its own classified error so the scheduler can log what
//! went wrong and keep running:
//!
//! - [`FetchError`]: the source page could not be loaded or understood.
//!   Scoped to one category; the rest of the pass carries on.
//! - [`StorageError`]: the accumulation file could not be read or written.
//!   The in-memory store is kept for the next cycle.
//! - [`MailError`]: the weekly digest was not delivered. The store is left
//!   untouched so nothing is lost.
//! - [`ConfigError`]: startup settings are unusable.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to load or read a listing page.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network-level failure (DNS, TLS, connection reset, timeout).
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    /// The render service could not produce a page.
    #[error("render service failed for {url}: {reason}")]
    Render { url: String, reason: String },

    /// The page loaded but its listing could not be interpreted.
    #[error("could not parse listing at {url}: {reason}")]
    Parse { url: String, reason: String },
}

/// Failure to persist or read back the accumulation store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Classified failure of a single digest delivery attempt.
#[derive(Error, Debug)]
pub enum MailError {
    /// The SMTP server rejected the sender credentials.
    #[error("SMTP authentication failed: {0}")]
    Auth(String),

    /// The SMTP server could not be reached or dropped the session.
    #[error("SMTP connection failed: {0}")]
    Connection(String),

    /// The server refused the recipient or the message for it.
    #[error("recipient {recipient} rejected: {reason}")]
    RecipientRejected { recipient: String, reason: String },

    /// A sender or recipient address did not parse.
    #[error("invalid mail address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The message itself could not be assembled.
    #[error("could not build message: {0}")]
    Build(String),
}

/// Unusable startup configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid time of day {0:?} (expected HH:MM)")]
    InvalidTime(String),

    #[error("invalid weekday {0:?}")]
    InvalidWeekday(String),

    #[error("invalid source URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("missing setting: {0}")]
    MissingSetting(&'static str),

    #[error("config file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
