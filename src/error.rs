//! Error types for resale_sync

use crate::models::{Channel, ItemStatus};
use thiserror::Error;

/// Per-record errors raised by the import normalizer.
///
/// These are always counted against `records_failed` by the batch
/// coordinator; they never abort a batch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NormalizationError {
    /// A mandatory field is absent or empty
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),
    /// Amount field present but not parseable as a non-negative money value
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),
    /// Date field present but not parseable
    #[error("invalid date: {0:?}")]
    InvalidDate(String),
    /// Row references a product the catalog cannot resolve
    #[error("unresolvable product reference: {0:?}")]
    UnresolvableProduct(String),
}

/// Unified error type for resale_sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// HTTP request failed (network error, timeout, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Channel API returned an error status code
    #[error("{channel} returned HTTP {status}")]
    HttpStatus {
        channel: Channel,
        status: reqwest::StatusCode,
    },
    /// Failed to parse a channel payload
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Import record could not be normalized
    #[error("normalization failed: {0}")]
    Normalization(#[from] NormalizationError),
    /// Requested transition is not legal from the item's current status
    #[error("invalid transition '{trigger}' for item {item_id} in status {status}")]
    InvalidTransition {
        item_id: String,
        status: ItemStatus,
        trigger: String,
    },
    /// Inventory item does not exist
    #[error("inventory item not found: {0}")]
    ItemNotFound(String),
    /// Import batch does not exist
    #[error("import batch not found: {0}")]
    BatchNotFound(String),
    /// Channel could not be reached after exhausting retries
    #[error("{channel} unavailable after {attempts} attempts: {reason}")]
    ChannelUnavailable {
        channel: Channel,
        attempts: u32,
        reason: String,
    },
    /// Channel adapter is not configured for this channel
    #[error("no adapter configured for {0}")]
    ChannelNotConfigured(Channel),
    /// Channel reports a listing local state knows nothing about
    #[error("unmatched listing {listing_id} on {channel}")]
    ListingConflict { channel: Channel, listing_id: String },
    /// File I/O error
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether the error is worth retrying with backoff.
    ///
    /// Network failures and server-side / rate-limit statuses are transient;
    /// everything else (auth, client errors, local failures) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SyncError::HttpStatus { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Result alias for resale_sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
