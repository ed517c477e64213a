use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tryon_contracts::models::{ModelSelector, ModelVersionId, Operation, MODEL_VERSION_FORMAT};

use crate::error::{StudioError, StudioResult};

pub const DEFAULT_REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Process-wide settings, read once and passed by reference.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub replicate_api_token: Option<String>,
    pub gemini_api_key: Option<String>,
    pub replicate_api_base: String,
    pub gemini_api_base: String,
    pub image_model: String,
    pub face_swap_model_version: Option<String>,
    pub video_model_version: Option<String>,
    pub poll: PollSettings,
    pub video_poll: PollSettings,
    pub video_inline: bool,
    pub production: bool,
    pub events_path: Option<PathBuf>,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2500),
            timeout: Duration::from_secs(120),
        }
    }
}

impl Default for StudioConfig {
    fn default() -> Self {
        let selector = ModelSelector::default();
        Self {
            replicate_api_token: None,
            gemini_api_key: None,
            replicate_api_base: DEFAULT_REPLICATE_API_BASE.to_string(),
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            image_model: selector
                .select(Operation::Image, None)
                .unwrap_or_else(|_| "gemini-2.5-flash-image".to_string()),
            face_swap_model_version: selector
                .select(Operation::FaceSwap, None)
                .ok(),
            video_model_version: None,
            poll: PollSettings::default(),
            video_poll: PollSettings {
                timeout: Duration::from_secs(300),
                ..PollSettings::default()
            },
            video_inline: false,
            production: false,
            events_path: None,
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();
        let selector = ModelSelector::default();

        let image_model = selector
            .select(Operation::Image, get("TRYON_IMAGE_MODEL").as_deref())
            .unwrap_or(defaults.image_model);
        let face_swap_model_version = selector
            .select(Operation::FaceSwap, get("FACE_SWAP_MODEL_VERSION").as_deref())
            .ok();
        let video_model_version = selector
            .select(Operation::Video, get("VIDEO_MODEL_VERSION").as_deref())
            .ok();

        let environment = get("TRYON_ENV")
            .or_else(|| get("APP_ENV"))
            .unwrap_or_default()
            .to_ascii_lowercase();

        Self {
            replicate_api_token: get("REPLICATE_API_TOKEN").or_else(|| get("REPLICATE_API_KEY")),
            gemini_api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            replicate_api_base: get("REPLICATE_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.replicate_api_base),
            gemini_api_base: get("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_api_base),
            image_model,
            face_swap_model_version,
            video_model_version,
            poll: PollSettings {
                interval: seconds(get("TRYON_POLL_INTERVAL_SECS"), 2.5, 0.2, 10.0),
                timeout: seconds(get("TRYON_POLL_TIMEOUT_SECS"), 120.0, 10.0, 900.0),
            },
            video_poll: PollSettings {
                interval: seconds(get("TRYON_POLL_INTERVAL_SECS"), 2.5, 0.2, 10.0),
                timeout: seconds(get("TRYON_VIDEO_POLL_TIMEOUT_SECS"), 300.0, 10.0, 900.0),
            },
            video_inline: get("TRYON_VIDEO_INLINE")
                .as_deref()
                .and_then(parse_flag)
                .unwrap_or(false),
            production: matches!(environment.as_str(), "production" | "prod"),
            events_path: get("TRYON_EVENTS_PATH").map(PathBuf::from),
            max_body_bytes: get("TRYON_MAX_BODY_MB")
                .and_then(|value| value.parse::<usize>().ok())
                .filter(|value| *value > 0)
                .map(|value| value * 1024 * 1024)
                .unwrap_or(defaults.max_body_bytes),
        }
    }

    pub fn require_replicate_token(&self) -> StudioResult<&str> {
        self.replicate_api_token.as_deref().ok_or_else(|| {
            StudioError::configuration(
                "REPLICATE_API_TOKEN is not set; add it to the server environment.",
            )
        })
    }

    pub fn require_gemini_key(&self) -> StudioResult<&str> {
        self.gemini_api_key.as_deref().ok_or_else(|| {
            StudioError::configuration(
                "GEMINI_API_KEY is not set; add it (or GOOGLE_API_KEY) to the server environment.",
            )
        })
    }

    pub fn require_face_swap_model(&self) -> StudioResult<ModelVersionId> {
        required_model("FACE_SWAP_MODEL_VERSION", self.face_swap_model_version.as_deref())
    }

    pub fn require_video_model(&self) -> StudioResult<ModelVersionId> {
        required_model("VIDEO_MODEL_VERSION", self.video_model_version.as_deref())
    }
}

/// Unset and malformed identifiers are both configuration errors, raised
/// before any provider is contacted.
fn required_model(key: &str, raw: Option<&str>) -> StudioResult<ModelVersionId> {
    let raw = raw.ok_or_else(|| {
        StudioError::configuration(format!(
            "{key} is not set; expected {MODEL_VERSION_FORMAT}."
        ))
    })?;
    ModelVersionId::parse(raw)
        .map_err(|reason| StudioError::configuration(format!("{key}: {reason}")))
}

fn seconds(raw: Option<String>, default: f64, min: f64, max: f64) -> Duration {
    let parsed = raw
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite());
    Duration::from_secs_f64(parsed.unwrap_or(default).clamp(min, max))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
