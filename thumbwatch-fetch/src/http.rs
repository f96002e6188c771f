//! Shared HTTP client and the raw byte fetcher.
//!
//! Provides a configured [`reqwest::Client`] and [`HttpFetcher`], which
//! downloads a resource and maps every failure to a typed [`FetchError`].

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

/// User-Agent sent when the config does not override it.
pub const DEFAULT_USER_AGENT: &str = concat!("thumbwatch/", env!("CARGO_PKG_VERSION"));

/// Build a [`reqwest::Client`] from the fetcher configuration.
///
/// The client has:
/// - Timeout from config
/// - Custom User-Agent (or [`DEFAULT_USER_AGENT`])
/// - A bounded redirect policy
/// - gzip decompression
///
/// # Errors
///
/// Returns [`FetchError::Config`] if the client cannot be constructed.
pub fn build_client(config: &FetchConfig) -> Result<reqwest::Client> {
    let ua = config
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned());

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()
        .map_err(|e| FetchError::Config(format!("failed to build HTTP client: {e}")))
}

/// Downloads raw resource bytes over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a client built from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Config`] if the configuration is invalid.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: build_client(config)?,
        })
    }

    /// Wrap an existing client (shares its connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` and return the full response body.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] when no response was received
    /// - [`FetchError::Status`] for any non-2xx status
    /// - [`FetchError::Body`] when the body cannot be read
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;
        debug!(url, bytes = body.len(), "fetched resource");
        Ok(body)
    }
}
