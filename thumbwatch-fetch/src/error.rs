//! Error types for the thumbwatch-fetch crate.
//!
//! Messages never include response bodies, only the status line and the
//! requested URL.

/// Errors that can occur while fetching remote resources.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a non-success status code.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Numeric HTTP status code.
        status: u16,
        /// The URL that was requested.
        url: String,
    },

    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be read to completion.
    #[error("body error: {0}")]
    Body(String),

    /// Invalid fetcher configuration or an unusable URL.
    #[error("config error: {0}")]
    Config(String),

    /// The metadata endpoint answered but the payload was unusable.
    #[error("metadata error: {0}")]
    Metadata(String),
}

impl FetchError {
    /// Returns `true` when a later attempt could plausibly succeed.
    ///
    /// Network failures, rate limits (429) and server errors (5xx) are
    /// transient; client errors and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Network(_) | Self::Body(_) => true,
            Self::Config(_) | Self::Metadata(_) => false,
        }
    }
}

/// Convenience type alias for thumbwatch-fetch results.
pub type Result<T> = std::result::Result<T, FetchError>;
