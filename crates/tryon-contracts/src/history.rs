use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifacts::GenerationArtifact;

/// Selection index reserved for the original, pre-edit source image.
pub const ORIGINAL_INDEX: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    TryOn,
    FaceSwap,
    Edit,
    Video,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditHistoryEntry {
    pub id: String,
    pub prompt: String,
    pub strength: Option<f32>,
    pub duration_ms: u64,
    pub model_name: String,
    pub action_kind: ActionKind,
    pub created_at: DateTime<Utc>,
    pub artifact: GenerationArtifact,
}

impl EditHistoryEntry {
    pub fn new(
        action_kind: ActionKind,
        prompt: impl Into<String>,
        model_name: impl Into<String>,
        artifact: GenerationArtifact,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            strength: None,
            duration_ms: 0,
            model_name: model_name.into(),
            action_kind,
            created_at: Utc::now(),
            artifact,
        }
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = Some(strength);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistorySelection {
    #[default]
    Original,
    Entry(usize),
}

impl HistorySelection {
    pub fn to_index(self) -> i64 {
        match self {
            Self::Original => ORIGINAL_INDEX,
            Self::Entry(index) => index as i64,
        }
    }
}

/// Ordered list of produced artifacts next to the original source image.
///
/// Entries are only ever appended here; removal and renumbering belong to
/// whatever presents the history.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditHistory {
    entries: Vec<EditHistoryEntry>,
    selection: HistorySelection,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryFile {
    #[serde(default)]
    entries: Vec<EditHistoryEntry>,
    #[serde(default = "original_index")]
    selected_index: i64,
}

fn original_index() -> i64 {
    ORIGINAL_INDEX
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[EditHistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends the entry and moves the selection onto it.
    pub fn push(&mut self, entry: EditHistoryEntry) -> usize {
        self.entries.push(entry);
        let index = self.entries.len() - 1;
        self.selection = HistorySelection::Entry(index);
        index
    }

    pub fn select(&mut self, index: i64) -> Result<HistorySelection, String> {
        let selection = if index == ORIGINAL_INDEX {
            HistorySelection::Original
        } else if index >= 0 && (index as usize) < self.entries.len() {
            HistorySelection::Entry(index as usize)
        } else {
            return Err(format!(
                "History index {index} out of range (0..{} or {ORIGINAL_INDEX} for the original).",
                self.entries.len()
            ));
        };
        self.selection = selection;
        Ok(selection)
    }

    pub fn selection(&self) -> HistorySelection {
        self.selection
    }

    /// `None` while the original is selected.
    pub fn selected(&self) -> Option<&EditHistoryEntry> {
        match self.selection {
            HistorySelection::Original => None,
            HistorySelection::Entry(index) => self.entries.get(index),
        }
    }

    /// Missing or unreadable files yield an empty history.
    pub fn load(path: &Path) -> Self {
        let Some(file) = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<HistoryFile>(&raw).ok())
        else {
            return Self::new();
        };
        let mut history = Self {
            entries: file.entries,
            selection: HistorySelection::Original,
        };
        if history.select(file.selected_index).is_err() {
            history.selection = HistorySelection::Original;
        }
        history
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = HistoryFile {
            entries: self.entries.clone(),
            selected_index: self.selection.to_index(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

pub fn history_path(out_dir: &Path) -> PathBuf {
    out_dir.join("history.json")
}
