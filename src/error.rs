//! Error types for deviant-sync
//!
//! This module provides the error taxonomy for the library:
//! - Transport failures (network/5xx) that are retried automatically
//! - Per-item failures (resolution, rejected assets) that never abort a batch
//! - Per-source failures (unknown source, malformed listing page)
//! - Fatal persistence failures (cursor store unreadable/unwritable)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for deviant-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for deviant-sync
///
/// Each variant carries the context needed to decide its blast radius:
/// item-level errors are recorded in the batch report, source-level errors
/// abort one source, and persistence errors abort the whole run.
///
/// `Display`, `std::error::Error`, and the `From` conversions are written by
/// hand rather than derived with `thiserror`: the `SourceNotFound` variant has
/// a data field named `source` (the source key), which `thiserror` would
/// unconditionally treat as the error's `source()` and require to implement
/// `std::error::Error`. The impls below reproduce exactly what the derive would
/// generate for the other variants.
#[derive(Debug)]
pub enum Error {
    /// Network-level failure (connect, timeout, 5xx after the retry budget)
    Transport(reqwest::Error),

    /// I/O error while writing downloaded content or state
    Io(std::io::Error),

    /// JSON (de)serialization error
    Serialization(serde_json::Error),

    /// No URL-shape strategy matched for an item
    Resolution(ResolutionError),

    /// The server refused a resolved asset URL (4xx on the asset itself)
    ///
    /// Triggers exactly one re-resolution in degraded mode; surfaces in the
    /// item's download record if the degraded URL is rejected as well.
    AssetRejected {
        /// The resolved URL the server refused
        url: String,
        /// HTTP status code of the refusal
        status: u16,
    },

    /// The source's listing page returned a client error (unknown source)
    SourceNotFound {
        /// The source key that could not be listed
        source: String,
        /// HTTP status code returned for the landing page
        status: u16,
    },

    /// The landing page did not match the expected listing contract
    /// (missing anti-forgery token, request id, or title)
    Listing(String),

    /// Cursor store could not be read or written (fatal to the run)
    Persistence(PersistenceError),

    /// Invalid configuration value
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Serialization(e) => write!(f, "serialization error: {e}"),
            Error::Resolution(e) => write!(f, "resolution error: {e}"),
            Error::AssetRejected { url, status } => {
                write!(f, "asset rejected ({status}): {url}")
            }
            Error::SourceNotFound { source, status } => {
                write!(f, "source not found ({status}): {source}")
            }
            Error::Listing(msg) => write!(f, "listing page error: {msg}"),
            Error::Persistence(e) => write!(f, "persistence error: {e}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Serialization(e) => Some(e),
            Error::Resolution(e) => Some(e),
            Error::Persistence(e) => Some(e),
            Error::AssetRejected { .. }
            | Error::SourceNotFound { .. }
            | Error::Listing(_)
            | Error::Config(_) => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}

impl From<ResolutionError> for Error {
    fn from(err: ResolutionError) -> Self {
        Error::Resolution(err)
    }
}

impl From<PersistenceError> for Error {
    fn from(err: PersistenceError) -> Self {
        Error::Persistence(err)
    }
}

/// Per-item resolution failures
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The item page matched none of the known URL shapes
    #[error("no download URL shape matched for {item}")]
    NoStrategyMatched {
        /// Canonical page URL of the item that failed to resolve
        item: String,
    },

    /// The item page had no usable title element
    #[error("item page has no title: {item}")]
    MissingTitle {
        /// Canonical page URL of the item
        item: String,
    },

    /// The item's page itself could not be fetched (client-error status)
    #[error("item page unavailable ({status}): {item}")]
    PageUnavailable {
        /// Canonical page URL of the item
        item: String,
        /// HTTP status returned for the page
        status: u16,
    },
}

/// Cursor-store persistence failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// State file exists but could not be read
    #[error("failed to read state file {path}: {reason}")]
    ReadFailed {
        /// Path of the state file
        path: PathBuf,
        /// Underlying I/O failure
        reason: String,
    },

    /// State file contents are not a valid source-to-cursor mapping
    #[error("state file {path} is corrupt: {reason}")]
    Corrupt {
        /// Path of the state file
        path: PathBuf,
        /// Parse failure detail
        reason: String,
    },

    /// State file could not be written
    #[error("failed to write state file {path}: {reason}")]
    WriteFailed {
        /// Path of the state file
        path: PathBuf,
        /// Underlying I/O failure
        reason: String,
    },
}

impl Error {
    /// True for failures that are scoped to a single item and must be
    /// recorded in its download record rather than aborting the batch.
    pub fn is_item_scoped(&self) -> bool {
        matches!(self, Error::Resolution(_) | Error::AssetRejected { .. })
    }
}
