//! Failure taxonomy for venue feeds.
//!
//! Every external-data fault maps onto one of three feed error kinds.
//! They are always caught at the feed-manager boundary and converted into
//! a connection-state transition plus a quality penalty; subscribers never
//! see them. Sparse-data conditions in analytics (insufficient history,
//! partial fills) are *not* errors; those surface as explicitly flagged
//! degraded results on the query types.

use thiserror::Error;

/// A failure produced by one venue fetch+parse+validate cycle.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport-level failure: DNS, connect, timeout, non-2xx status.
    #[error("network error: {0}")]
    Network(String),

    /// The venue responded, but the payload did not match its schema.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Schema-valid payload with zero usable price levels after filtering.
    #[error("empty book: no valid price levels after filtering")]
    EmptyBook,
}

impl FeedError {
    /// Short stable label for logs and quality bookkeeping.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::MalformedResponse(_) => "malformed_response",
            Self::EmptyBook => "empty_book",
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Configuration error raised while assembling the engine from the
/// environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// The venue list parsed to zero venues.
    #[error("no venues configured")]
    NoVenues,
}
