use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::history::EditHistoryEntry;

pub const MAX_REFINEMENT_PASSES: u32 = 3;
pub const DEFAULT_REFINEMENT_PASSES: u32 = 1;
pub const DEFAULT_EDIT_STRENGTH: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GarmentRegion {
    #[default]
    Upper,
    Lower,
    Dress,
}

impl GarmentRegion {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Upper => "upper-body garment (top, shirt, jacket)",
            Self::Lower => "lower-body garment (trousers, skirt, shorts)",
            Self::Dress => "full-length dress or one-piece outfit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GarmentFit {
    #[default]
    Normal,
    Slim,
    Oversize,
}

impl GarmentFit {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Normal => "a regular fit",
            Self::Slim => "a slim, close-to-body fit",
            Self::Oversize => "a loose, oversized fit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TryOnOptions {
    pub region: GarmentRegion,
    pub fit: GarmentFit,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnRequest {
    pub model_image: Option<String>,
    pub clothing_image: Option<String>,
    pub instructions: Option<String>,
    #[serde(default)]
    pub options: TryOnOptions,
    pub refine: Option<bool>,
    pub refinement_passes: Option<u32>,
}

impl TryOnRequest {
    pub fn refine_enabled(&self) -> bool {
        self.refine.unwrap_or(true)
    }

    pub fn clamped_passes(&self) -> u32 {
        self.refinement_passes
            .unwrap_or(DEFAULT_REFINEMENT_PASSES)
            .min(MAX_REFINEMENT_PASSES)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceSwapRequest {
    #[serde(alias = "userImage")]
    pub source_image: Option<String>,
    pub target_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub base_image: Option<String>,
    pub prompt: Option<String>,
    pub strength: Option<f32>,
}

impl EditRequest {
    pub fn clamped_strength(&self) -> f32 {
        self.strength
            .filter(|value| value.is_finite())
            .unwrap_or(DEFAULT_EDIT_STRENGTH)
            .clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    #[serde(alias = "userImage")]
    pub image: Option<String>,
    pub prompt: Option<String>,
}

/// How a multi-pass generation went. `completed_passes` may be lower than
/// `requested_passes` when a pass failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementSummary {
    pub requested: bool,
    pub requested_passes: u32,
    pub completed_passes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentityStrategy {
    /// Face swap job on the job queue.
    FaceSwapJob,
    /// Identity transfer through the synchronous image model.
    GenerativeTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOutcome {
    pub strategy: IdentityStrategy,
    pub fallback_used: bool,
}

/// `data` of a successful operation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub entry: EditHistoryEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinement: Option<RefinementSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_text: Option<String>,
}

impl OperationResult {
    pub fn new(entry: EditHistoryEntry) -> Self {
        Self {
            entry,
            refinement: None,
            strategy: None,
            model_text: None,
        }
    }
}

/// Uniform response body of every HTTP entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: String,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            details: None,
            timestamp: now_utc_iso(),
        }
    }

    pub fn failure(
        message: impl Into<String>,
        code: impl Into<String>,
        details: Option<String>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code.into()),
            details,
            timestamp: now_utc_iso(),
        }
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
