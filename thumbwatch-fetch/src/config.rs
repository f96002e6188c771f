//! Fetcher configuration with sensible defaults.
//!
//! [`FetchConfig`] controls request timeouts, redirects, the User-Agent
//! header and the oEmbed endpoint used for title lookups.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};

/// Default oEmbed endpoint for video metadata.
pub const DEFAULT_OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";

/// Configuration for outbound HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Maximum number of redirects followed before giving up.
    pub max_redirects: usize,
    /// Custom User-Agent. If `None`, `thumbwatch/<version>` is sent.
    pub user_agent: Option<String>,
    /// Base URL of the oEmbed metadata endpoint.
    pub oembed_endpoint: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 15,
            max_redirects: 10,
            user_agent: None,
            oembed_endpoint: DEFAULT_OEMBED_ENDPOINT.to_owned(),
        }
    }
}

impl FetchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.timeout_seconds == 0 {
            return Err(FetchError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if url::Url::parse(&self.oembed_endpoint).is_err() {
            return Err(FetchError::Config(format!(
                "oembed_endpoint is not a valid URL: {}",
                self.oembed_endpoint
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_values() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout_seconds, 15);
        assert_eq!(config.max_redirects, 10);
        assert!(config.user_agent.is_none());
        assert_eq!(config.oembed_endpoint, DEFAULT_OEMBED_ENDPOINT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = FetchConfig {
            timeout_seconds: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_seconds"));
    }

    #[test]
    fn bad_oembed_endpoint_rejected() {
        let config = FetchConfig {
            oembed_endpoint: "not a url".into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("oembed_endpoint"));
    }
}
