use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use tryon_contracts::artifacts::{
    is_remote_url, parse_data_url, sniff_base64_media_type, GenerationArtifact,
};
use tryon_contracts::redact::redact_payload;

use crate::config::StudioConfig;
use crate::error::{StudioError, StudioResult};
use crate::transport::{response_json_or_error, transport_error};

const PROVIDER: &str = "Gemini";

/// One piece of a multimodal prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    InlineImage { mime_type: String, data: String },
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Accepts a data URL or bare base64. Remote URLs are refused; the model
    /// only takes inline bytes.
    pub fn image(value: &str) -> StudioResult<Self> {
        let value = value.trim();
        if let Some((media_type, payload)) = parse_data_url(value) {
            return Ok(Self::InlineImage {
                mime_type: media_type.as_mime().to_string(),
                data: payload.to_string(),
            });
        }
        if value.starts_with("data:") || is_remote_url(value) {
            return Err(StudioError::validation(
                "images must be sent as base64 data, not links",
            ));
        }
        Ok(Self::InlineImage {
            mime_type: sniff_base64_media_type(value).as_mime().to_string(),
            data: value.to_string(),
        })
    }

    pub fn from_artifact(artifact: &GenerationArtifact) -> StudioResult<Self> {
        match artifact.to_data_url() {
            Some(data_url) => Self::image(&data_url),
            None => Self::image(&artifact.payload),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => json!({ "text": text }),
            Self::InlineImage { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": data,
                }
            }),
        }
    }
}

/// Fixed sampling parameters. Low temperature keeps identity and garment
/// detail stable across calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl SamplingConfig {
    pub const DETERMINISTIC: Self = Self {
        temperature: 0.2,
        top_p: 0.8,
        top_k: 40,
        max_output_tokens: 8192,
    };
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::DETERMINISTIC
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentRequest {
    pub model: String,
    pub parts: Vec<ContentPart>,
    pub sampling: SamplingConfig,
}

impl ContentRequest {
    pub fn new(model: impl Into<String>, parts: Vec<ContentPart>) -> Self {
        Self {
            model: model.into(),
            parts,
            sampling: SamplingConfig::default(),
        }
    }

    pub fn to_payload(&self) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": self.parts.iter().map(ContentPart::to_json).collect::<Vec<_>>(),
            }],
            "generationConfig": {
                "temperature": self.sampling.temperature,
                "topP": self.sampling.top_p,
                "topK": self.sampling.top_k,
                "maxOutputTokens": self.sampling.max_output_tokens,
                "responseModalities": ["IMAGE", "TEXT"],
            },
        })
    }
}

/// Decoded first candidate of a `generateContent` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentResponse {
    pub images: Vec<GenerationArtifact>,
    pub text: Option<String>,
}

impl ContentResponse {
    pub fn from_value(payload: &Value) -> Self {
        let parts = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut images = Vec::new();
        let mut texts = Vec::new();
        for part in &parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    texts.push(trimmed.to_string());
                }
            }
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str);
            images.push(GenerationArtifact::inline(data, mime_type));
        }

        let text = if texts.is_empty() {
            payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str)
                .map(|reason| format!("request blocked ({reason})"))
        } else {
            Some(texts.join("\n"))
        };
        Self { images, text }
    }

    /// Last image part wins when the model returns several.
    pub fn canonical_image(&self) -> Option<&GenerationArtifact> {
        self.images.last()
    }
}

/// Synchronous multimodal generation endpoint.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_content(
        &self,
        api_key: &str,
        request: &ContentRequest,
    ) -> StudioResult<ContentResponse>;
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_base: String,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(api_base: impl Into<String>, http: HttpClient) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn from_config(config: &StudioConfig, http: HttpClient) -> Self {
        Self::new(config.gemini_api_base.clone(), http)
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip_all, fields(model = %request.model, parts = request.parts.len()))]
    async fn generate_content(
        &self,
        api_key: &str,
        request: &ContentRequest,
    ) -> StudioResult<ContentResponse> {
        let payload = request.to_payload();
        debug!(payload = %redact_payload(&payload), "generateContent");
        let response = self
            .http
            .post(self.endpoint_for_model(&request.model))
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        let body = response_json_or_error(PROVIDER, response).await?;
        Ok(ContentResponse::from_value(&body))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub artifact: GenerationArtifact,
    pub text: Option<String>,
}

/// One generation call that must yield an image. A reply without one is
/// `NoOutput`, carrying whatever the model said instead.
pub async fn generate_image(
    model: &dyn GenerativeModel,
    api_key: &str,
    request: &ContentRequest,
) -> StudioResult<GeneratedImage> {
    let response = model.generate_content(api_key, request).await?;
    let Some(artifact) = response.canonical_image().cloned() else {
        let message = match response.text.as_deref() {
            Some(text) => format!("{} returned no image: {text}", model.name()),
            None => format!("{} returned no image", model.name()),
        };
        return Err(StudioError::NoOutput(message));
    };
    info!(
        model = %request.model,
        media_type = %artifact.media_type,
        images = response.images.len(),
        "image generated"
    );
    Ok(GeneratedImage {
        artifact,
        text: response.text,
    })
}
