//! oEmbed metadata lookup for hosted videos.

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::http::build_client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Subset of an oEmbed response that thumbwatch cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Video title.
    pub title: String,
    /// Channel or author display name.
    #[serde(default)]
    pub author_name: Option<String>,
    /// Thumbnail URL advertised by the platform.
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// Client for the platform oEmbed endpoint.
#[derive(Debug, Clone)]
pub struct OembedClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OembedClient {
    /// Create a client for the endpoint named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Config`] if the configuration is invalid.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: build_client(config)?,
            endpoint: config.oembed_endpoint.clone(),
        })
    }

    /// Build the oEmbed request URL for a video ID.
    pub fn request_url(&self, video_id: &str) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| FetchError::Config(format!("invalid oembed endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("url", &format!("https://www.youtube.com/watch?v={video_id}"))
            .append_pair("format", "json");
        Ok(url)
    }

    /// Fetch metadata for `video_id`.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] / [`FetchError::Status`] for transport failures
    /// - [`FetchError::Metadata`] when the payload has no usable title
    pub async fn lookup(&self, video_id: &str) -> Result<VideoMetadata> {
        let url = self.request_url(video_id)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let metadata: VideoMetadata = response
            .json()
            .await
            .map_err(|e| FetchError::Metadata(format!("invalid oEmbed payload for {video_id}: {e}")))?;

        if metadata.title.trim().is_empty() {
            return Err(FetchError::Metadata(format!(
                "oEmbed payload for {video_id} has an empty title"
            )));
        }

        debug!(video_id, title = %metadata.title, "resolved video metadata");
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OembedClient {
        OembedClient::new(&FetchConfig {
            oembed_endpoint: format!("{}/oembed", server.uri()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn request_url_encodes_watch_url() {
        let client = OembedClient::new(&FetchConfig::default()).unwrap();
        let url = client.request_url("dQw4w9WgXcQ").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&(
            "url".to_owned(),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_owned()
        )));
        assert!(pairs.contains(&("format".to_owned(), "json".to_owned())));
    }

    #[tokio::test]
    async fn lookup_parses_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oembed"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Test Video",
                "author_name": "Test Author",
                "thumbnail_url": "https://example.com/thumb.jpg"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let metadata = client_for(&server).lookup("abc123").await.unwrap();
        assert_eq!(metadata.title, "Test Video");
        assert_eq!(metadata.author_name.as_deref(), Some("Test Author"));
    }

    #[tokio::test]
    async fn lookup_rejects_missing_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oembed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "author_name": "Someone"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).lookup("abc123").await.unwrap_err();
        assert!(matches!(err, FetchError::Metadata(_)));
    }

    #[tokio::test]
    async fn lookup_maps_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oembed"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server).lookup("gone").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }
}
