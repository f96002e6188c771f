//! Video source URLs and metadata.
//!
//! Parses the accepted video URL forms, derives the canonical page and
//! thumbnail URLs for a video id, and defines the title lookup boundary.

use crate::entity::MonitoredEntity;
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Default base for canonical short page links.
pub const DEFAULT_PAGE_BASE: &str = "https://youtu.be";

/// Default base for thumbnail downloads.
pub const DEFAULT_THUMBNAIL_BASE: &str = "https://img.youtube.com/vi";

/// Thumbnail variant polled for changes.
pub const THUMBNAIL_FILE: &str = "maxresdefault.jpg";

/// Where source URLs point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base for canonical page URLs (`{base}/{id}`).
    pub page_base: String,
    /// Base for thumbnail URLs (`{base}/{id}/maxresdefault.jpg`).
    pub thumbnail_base: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            page_base: DEFAULT_PAGE_BASE.to_owned(),
            thumbnail_base: DEFAULT_THUMBNAIL_BASE.to_owned(),
        }
    }
}

impl SourceConfig {
    /// Canonical page URL of a video.
    pub fn page_url(&self, video_id: &str) -> String {
        format!("{}/{video_id}", self.page_base.trim_end_matches('/'))
    }

    /// Thumbnail URL of a video.
    pub fn thumbnail_url(&self, video_id: &str) -> String {
        format!(
            "{}/{video_id}/{THUMBNAIL_FILE}",
            self.thumbnail_base.trim_end_matches('/')
        )
    }

    /// Validates this configuration, returning an error if any field is invalid.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("source.page_base", &self.page_base),
            ("source.thumbnail_base", &self.thumbnail_base),
        ] {
            Url::parse(value)
                .map_err(|e| MonitorError::Config(format!("{name} is not a URL ({value}): {e}")))?;
        }
        Ok(())
    }
}

/// Canonical page URL under the default base.
pub fn page_url(video_id: &str) -> String {
    SourceConfig::default().page_url(video_id)
}

/// Thumbnail URL under the default base.
pub fn thumbnail_url(video_id: &str) -> String {
    SourceConfig::default().thumbnail_url(video_id)
}

fn is_video_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extract the video id from a watch, short-link or embed URL.
///
/// The scheme is optional and extra query parameters are ignored.
pub fn extract_video_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let url = Url::parse(trimmed)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("https://{trimmed}")).ok())?;

    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    let mut segments = url.path_segments()?;

    let id = match (host, segments.next()) {
        ("youtube.com", Some("watch")) => url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned()),
        ("youtube.com", Some("embed")) => segments.next().map(str::to_owned),
        ("youtu.be", Some(first)) => Some(first.to_owned()),
        _ => None,
    }?;

    is_video_id(&id).then_some(id)
}

/// Markdown image link: the decorated thumbnail linking to the page.
pub fn markdown_snippet(entity: &MonitoredEntity, decorated_url: &str) -> String {
    format!(
        "[![{}]({decorated_url})]({})",
        escape_brackets(&entity.title),
        entity.page_url
    )
}

fn escape_brackets(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

/// Title lookup for a video id.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Human-readable title of `video_id`.
    async fn title(&self, video_id: &str) -> Result<String>;
}

#[async_trait]
impl MetadataLookup for thumbwatch_fetch::OembedClient {
    async fn title(&self, video_id: &str) -> Result<String> {
        Ok(self.lookup(video_id).await?.title)
    }
}
