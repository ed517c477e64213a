use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::{RefinementSummary, StrategyOutcome};
use crate::artifacts::MediaType;
use crate::history::ActionKind;
use crate::redact::redact_payload;

/// How one studio operation ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationEvent {
    OperationSucceeded {
        action: ActionKind,
        entry_id: String,
        model: String,
        media_type: MediaType,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        refinement: Option<RefinementSummary>,
        #[serde(skip_serializing_if = "Option::is_none")]
        strategy: Option<StrategyOutcome>,
    },
    OperationFailed {
        action: ActionKind,
        error: String,
        code: String,
        duration_ms: u64,
    },
}

#[derive(Serialize)]
struct LogLine<'a> {
    session_id: &'a str,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a OperationEvent,
}

/// Append-only JSONL log of operation outcomes, one object per line.
/// The file is opened on first write and kept open.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    session_id: String,
    file: Mutex<Option<File>>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_session(path, Uuid::new_v4().to_string())
    }

    pub fn with_session(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Error strings can quote provider replies, so the whole line goes
    /// through redaction before it is written.
    pub fn record(&self, event: &OperationEvent) -> anyhow::Result<()> {
        let line = LogLine {
            session_id: &self.session_id,
            ts: Utc::now(),
            event,
        };
        let mut text = serde_json::to_string(&redact_payload(&serde_json::to_value(&line)?))?;
        text.push('\n');

        let mut slot = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        if let Some(file) = slot.as_mut() {
            file.write_all(text.as_bytes())?;
        }
        Ok(())
    }

    fn open(&self) -> anyhow::Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::{json, Value};

    use super::{EventLog, OperationEvent};
    use crate::api::{IdentityStrategy, StrategyOutcome};
    use crate::artifacts::MediaType;
    use crate::history::ActionKind;

    fn read_lines(path: &std::path::Path) -> anyhow::Result<Vec<Value>> {
        Ok(fs::read_to_string(path)?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?)
    }

    #[test]
    fn success_line_carries_session_timestamp_and_outcome() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let log = EventLog::with_session(&path, "session-1");
        log.record(&OperationEvent::OperationSucceeded {
            action: ActionKind::FaceSwap,
            entry_id: "e-1".to_string(),
            model: "acme/face-swap:v1".to_string(),
            media_type: MediaType::Png,
            duration_ms: 840,
            refinement: None,
            strategy: Some(StrategyOutcome {
                strategy: IdentityStrategy::GenerativeTransfer,
                fallback_used: true,
            }),
        })?;

        let lines = read_lines(&path)?;
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["type"], json!("operation_succeeded"));
        assert_eq!(line["session_id"], json!("session-1"));
        assert_eq!(line["action"], json!("faceSwap"));
        assert_eq!(line["strategy"]["fallbackUsed"], json!(true));
        assert!(line.get("refinement").is_none());
        chrono::DateTime::parse_from_rfc3339(line["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn failures_append_and_quoted_data_urls_are_omitted() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let log = EventLog::new(&path);
        for error in ["timed out", "data:image/png;base64,iVBOR"] {
            log.record(&OperationEvent::OperationFailed {
                action: ActionKind::Edit,
                error: error.to_string(),
                code: "operation_failed".to_string(),
                duration_ms: 5,
            })?;
        }

        let lines = read_lines(&path)?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], json!("operation_failed"));
        assert_eq!(lines[0]["error"], json!("timed out"));
        assert_eq!(lines[1]["error"], json!("<omitted>"));
        assert_eq!(lines[0]["session_id"], lines[1]["session_id"]);
        Ok(())
    }
}
