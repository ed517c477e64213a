use std::time::Duration;

use thiserror::Error;
use tryon_contracts::jobs::JobStatus;

pub type StudioResult<T> = Result<T, StudioError>;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{provider} request failed ({status}): {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} request could not be sent: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned an unreadable payload: {reason}")]
    Decode { provider: String, reason: String },
    #[error("{provider} job {job_id} did not finish within {:.1}s", .elapsed.as_secs_f64())]
    Timeout {
        provider: String,
        job_id: String,
        elapsed: Duration,
    },
    #[error("{provider} job {job_id} {status}: {detail}")]
    JobFailed {
        provider: String,
        job_id: String,
        status: JobStatus,
        detail: String,
    },
    #[error("no output produced: {0}")]
    NoOutput(String),
    #[error("failed to fetch output ({url}): {reason}")]
    OutputFetch { url: String, reason: String },
}

/// Coarse taxonomy callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    UpstreamRejection,
    Timeout,
    NoOutput,
}

/// What an end user is told; `code` is stable so a UI can localize it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMessage {
    FixConfiguration,
    FixInput,
    QuotaExceeded,
    InvalidArgument,
    Unauthorized,
    TimedOut,
    NoResult,
    Generic,
}

impl UserMessage {
    pub fn code(&self) -> &'static str {
        match self {
            Self::FixConfiguration => "configuration_error",
            Self::FixInput => "invalid_input",
            Self::QuotaExceeded => "quota_exceeded",
            Self::InvalidArgument => "invalid_argument",
            Self::Unauthorized => "unauthorized",
            Self::TimedOut => "timeout",
            Self::NoResult => "no_output",
            Self::Generic => "operation_failed",
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Self::FixConfiguration => {
                "The service is not configured for this operation. Please contact the operator."
            }
            Self::FixInput => "Some required input is missing or invalid. Please check and retry.",
            Self::QuotaExceeded => {
                "The AI provider's usage limit was reached. Please try again later."
            }
            Self::InvalidArgument => {
                "The AI provider rejected the request. Try a different image or instruction."
            }
            Self::Unauthorized => "The AI provider rejected the service credentials.",
            Self::TimedOut => "Generation took too long and was abandoned. Please try again.",
            Self::NoResult => "The AI provider did not return a result. Try a different image.",
            Self::Generic => "The operation failed. Please try again later.",
        }
    }
}

impl StudioError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(provider: &str, status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.to_string(),
            status,
            body: body.into(),
        }
    }

    pub fn decode(provider: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NoOutput(_) => ErrorKind::NoOutput,
            Self::Upstream { .. }
            | Self::Transport { .. }
            | Self::Decode { .. }
            | Self::JobFailed { .. }
            | Self::OutputFetch { .. } => ErrorKind::UpstreamRejection,
        }
    }

    /// Configuration and validation failures happen before any provider is
    /// contacted; no other strategy can fix them.
    pub fn is_local(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Validation)
    }

    pub fn user_message(&self) -> UserMessage {
        match self {
            Self::Configuration(_) => UserMessage::FixConfiguration,
            Self::Validation(_) => UserMessage::FixInput,
            Self::Timeout { .. } => UserMessage::TimedOut,
            Self::NoOutput(_) => UserMessage::NoResult,
            Self::Upstream { status, body, .. } => classify_rejection(Some(*status), body),
            Self::JobFailed { detail, .. } => classify_rejection(None, detail),
            Self::Transport { .. } | Self::Decode { .. } | Self::OutputFetch { .. } => {
                UserMessage::Generic
            }
        }
    }
}

fn classify_rejection(status: Option<u16>, text: &str) -> UserMessage {
    let lowered = text.to_ascii_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|needle| lowered.contains(needle));
    if status == Some(429) || mentions(&["quota", "rate limit", "rate_limit", "resource_exhausted"])
    {
        return UserMessage::QuotaExceeded;
    }
    if matches!(status, Some(401 | 403))
        || mentions(&["api key", "api_key", "unauthorized", "unauthenticated", "permission"])
    {
        return UserMessage::Unauthorized;
    }
    if mentions(&["invalid_argument", "invalid argument"]) {
        return UserMessage::InvalidArgument;
    }
    UserMessage::Generic
}
