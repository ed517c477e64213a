use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status vocabulary shared by every job-queue provider.
///
/// `Queued`, `Starting`, `Processing` and `Running` are pending states;
/// `Succeeded`, `Failed` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Starting,
    Processing,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Unrecognized statuses are read as `Processing` so the poll deadline
    /// decides what happens to them.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => Self::Queued,
            "starting" => Self::Starting,
            "processing" => Self::Processing,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output field of a provider job, decoded once right after the call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RawOutput {
    Scalar(String),
    Sequence(Vec<String>),
    #[default]
    Absent,
}

impl RawOutput {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Self::Absent
                } else {
                    Self::Scalar(trimmed.to_string())
                }
            }
            Some(Value::Array(rows)) => Self::Sequence(
                rows.iter()
                    .filter_map(|row| match row {
                        Value::String(text) => Some(text.trim().to_string()),
                        Value::Object(obj) => obj
                            .get("url")
                            .and_then(Value::as_str)
                            .map(|url| url.trim().to_string()),
                        _ => None,
                    })
                    .filter(|text| !text.is_empty())
                    .collect(),
            ),
            Some(Value::Object(obj)) => obj
                .get("url")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(|url| Self::Scalar(url.to_string()))
                .unwrap_or(Self::Absent),
            _ => Self::Absent,
        }
    }

    /// The single value treated as the job's result: the last element of a
    /// sequence (providers append the final frame last) or the scalar itself.
    pub fn canonical(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value.as_str()),
            Self::Sequence(values) => values.last().map(String::as_str),
            Self::Absent => None,
        }
    }
}

/// One decoded reply from a job-queue provider (create or status fetch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub id: String,
    pub status: JobStatus,
    pub output: RawOutput,
    pub error: Option<String>,
}

impl JobSnapshot {
    /// Returns `None` when the document carries no usable job id.
    pub fn from_value(payload: &Value) -> Option<Self> {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())?
            .to_string();
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .map(JobStatus::parse)
            .unwrap_or(JobStatus::Queued);
        let error = match payload.get("error") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) if text.trim().is_empty() => None,
            Some(Value::String(text)) => Some(text.trim().to_string()),
            Some(other) => Some(other.to_string()),
        };
        Some(Self {
            id,
            status,
            output: RawOutput::from_value(payload.get("output")),
            error,
        })
    }
}
