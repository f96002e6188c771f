//! # thumbwatch-fetch
//!
//! Outbound HTTP for thumbwatch: raw thumbnail downloads and oEmbed title
//! lookups.
//!
//! ## Design
//!
//! - One [`reqwest::Client`] per fetcher, built from [`FetchConfig`]
//! - Every failure is a typed [`FetchError`]; nothing here retries, the
//!   caller decides what a failed fetch means
//! - Response bodies are never logged

pub mod config;
pub mod error;
pub mod http;
pub mod oembed;

pub use config::FetchConfig;
pub use error::{FetchError, Result};
pub use http::HttpFetcher;
pub use oembed::{OembedClient, VideoMetadata};
