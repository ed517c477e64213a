use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client as HttpClient;
use tracing::{debug, instrument};
use tryon_contracts::artifacts::{is_remote_url, ArtifactEncoding, GenerationArtifact, MediaType};

use crate::error::{StudioError, StudioResult};
use crate::transport::{truncate_text, ERROR_BODY_MAX_CHARS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Plain byte fetch of a provider output URL.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> StudioResult<FetchedMedia>;
}

#[derive(Debug, Clone)]
pub struct HttpMediaFetcher {
    http: HttpClient,
}

impl HttpMediaFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> StudioResult<FetchedMedia> {
        let fetch_error = |reason: String| StudioError::OutputFetch {
            url: url.to_string(),
            reason,
        };
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| fetch_error(err.to_string()))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(fetch_error(format!(
                "status {code}: {}",
                truncate_text(&body, ERROR_BODY_MAX_CHARS)
            )));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|err| fetch_error(format!("failed reading body: {err}")))?
            .to_vec();
        Ok(FetchedMedia {
            bytes,
            content_type,
        })
    }
}

/// How a remote output should reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Fetch the bytes and hand back a data URL.
    Inline,
    /// Hand back the provider URL untouched.
    Url,
}

pub struct ArtifactNormalizer<'a> {
    fetcher: &'a dyn MediaFetcher,
}

impl<'a> ArtifactNormalizer<'a> {
    pub fn new(fetcher: &'a dyn MediaFetcher) -> Self {
        Self { fetcher }
    }

    /// `assumed` is the media type of the operation; it labels fetched bytes
    /// and URL artifacts. Inline values keep their declared or sniffed type.
    #[instrument(skip_all, fields(assumed = %assumed, delivery = ?delivery))]
    pub async fn normalize(
        &self,
        raw: &str,
        assumed: MediaType,
        delivery: Delivery,
    ) -> StudioResult<GenerationArtifact> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(StudioError::NoOutput("provider output was empty".to_string()));
        }
        if raw.starts_with("data:") {
            return GenerationArtifact::from_data_url(raw).ok_or_else(|| {
                StudioError::decode("output", "data URL is not base64 encoded")
            });
        }
        if !is_remote_url(raw) {
            return Ok(GenerationArtifact::inline(raw, None));
        }
        if delivery == Delivery::Url {
            return Ok(GenerationArtifact::url(raw, assumed));
        }

        let media = self.fetcher.fetch(raw).await?;
        if media.bytes.is_empty() {
            return Err(StudioError::OutputFetch {
                url: raw.to_string(),
                reason: "empty body".to_string(),
            });
        }
        debug!(
            bytes = media.bytes.len(),
            content_type = media.content_type.as_deref().unwrap_or("unknown"),
            "output fetched"
        );
        Ok(GenerationArtifact {
            encoding: ArtifactEncoding::InlineBase64,
            media_type: assumed,
            payload: BASE64.encode(&media.bytes),
        })
    }
}
