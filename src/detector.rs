//! Change detection for hosted resources.
//!
//! [`ChangeDetector::check`] fetches a resource, fingerprints it and
//! compares against the stored fingerprint. Every failure is folded into
//! [`CheckOutcome::Error`]; the method never returns `Err`.

use crate::hasher::content_hash;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of raw resource bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url`, returning the full body.
    async fn fetch(&self, url: &str) -> crate::Result<Bytes>;
}

#[async_trait]
impl Fetcher for thumbwatch_fetch::HttpFetcher {
    async fn fetch(&self, url: &str) -> crate::Result<Bytes> {
        Ok(thumbwatch_fetch::HttpFetcher::fetch(self, url).await?)
    }
}

/// Result of one change check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Fingerprint differs from the stored one, or none was stored.
    Changed {
        /// Fingerprint of the fetched bytes.
        hash: String,
        /// The fetched bytes.
        bytes: Bytes,
    },
    /// Fingerprint matches the stored one.
    Unchanged {
        /// Fingerprint of the fetched bytes.
        hash: String,
        /// The fetched bytes.
        bytes: Bytes,
    },
    /// The resource could not be fetched.
    Error(String),
}

impl CheckOutcome {
    /// Fingerprint of the fetched bytes, or `""` on error.
    pub fn new_hash(&self) -> &str {
        match self {
            Self::Changed { hash, .. } | Self::Unchanged { hash, .. } => hash,
            Self::Error(_) => "",
        }
    }

    /// The fetched bytes, if the fetch succeeded.
    pub fn raw_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Changed { bytes, .. } | Self::Unchanged { bytes, .. } => Some(bytes),
            Self::Error(_) => None,
        }
    }

    /// Returns `true` for [`CheckOutcome::Changed`].
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    /// Returns `true` for [`CheckOutcome::Error`].
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Fetch-hash-compare against a stored fingerprint.
#[derive(Clone)]
pub struct ChangeDetector {
    fetcher: Arc<dyn Fetcher>,
}

impl ChangeDetector {
    /// Create a detector over the given fetcher.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Check `resource_url` against `previous_hash`.
    ///
    /// An empty `previous_hash` always yields [`CheckOutcome::Changed`].
    pub async fn check(&self, resource_url: &str, previous_hash: &str) -> CheckOutcome {
        let bytes = match self.fetcher.fetch(resource_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = resource_url, error = %e, "change check fetch failed");
                return CheckOutcome::Error(format!("error checking resource: {e}"));
            }
        };

        let hash = content_hash(&bytes);
        if previous_hash.is_empty() || previous_hash != hash {
            debug!(url = resource_url, hash = %hash, "resource changed");
            CheckOutcome::Changed { hash, bytes }
        } else {
            debug!(url = resource_url, hash = %hash, "resource unchanged");
            CheckOutcome::Unchanged { hash, bytes }
        }
    }
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetector").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::MonitorError;
    use crate::hasher::EMPTY_DIGEST;

    struct StaticFetcher(Option<&'static [u8]>);

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> crate::Result<Bytes> {
            self.0
                .map(Bytes::from_static)
                .ok_or_else(|| MonitorError::Fetch("HTTP 500 from test".to_owned()))
        }
    }

    fn detector(body: Option<&'static [u8]>) -> ChangeDetector {
        ChangeDetector::new(Arc::new(StaticFetcher(body)))
    }

    #[tokio::test]
    async fn empty_previous_hash_is_changed() {
        let outcome = detector(Some(b"pixels")).check("u", "").await;
        assert!(outcome.is_changed());
        assert_eq!(outcome.new_hash(), content_hash(b"pixels"));
        assert_eq!(outcome.raw_bytes().unwrap().as_ref(), b"pixels");
    }

    #[tokio::test]
    async fn empty_previous_hash_with_empty_body_is_still_changed() {
        let outcome = detector(Some(b"")).check("u", "").await;
        assert!(outcome.is_changed());
        assert_eq!(outcome.new_hash(), EMPTY_DIGEST);
    }

    #[tokio::test]
    async fn matching_hash_is_unchanged() {
        let previous = content_hash(b"pixels");
        let outcome = detector(Some(b"pixels")).check("u", &previous).await;
        assert!(matches!(outcome, CheckOutcome::Unchanged { .. }));
        assert_eq!(outcome.new_hash(), previous);
    }

    #[tokio::test]
    async fn different_hash_is_changed() {
        let previous = content_hash(b"old pixels");
        let outcome = detector(Some(b"new pixels")).check("u", &previous).await;
        assert!(outcome.is_changed());
    }

    #[tokio::test]
    async fn fetch_failure_is_error_without_hash_or_bytes() {
        let outcome = detector(None).check("u", "abc").await;
        assert!(outcome.is_error());
        assert_eq!(outcome.new_hash(), "");
        assert!(outcome.raw_bytes().is_none());
        match outcome {
            CheckOutcome::Error(reason) => assert!(reason.contains("HTTP 500")),
            other => panic!("expected error, got {other:?}"),
        }
    }
}
