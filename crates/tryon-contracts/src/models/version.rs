use std::fmt;
use std::str::FromStr;

pub const MODEL_VERSION_FORMAT: &str = "owner/model-name:version";

/// Namespaced job-queue model identifier, `owner/name:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelVersionId {
    raw: String,
    owner_end: usize,
    name_end: usize,
}

impl ModelVersionId {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let malformed = || {
            format!(
                "Model version '{trimmed}' is malformed; expected the format {MODEL_VERSION_FORMAT}."
            )
        };
        if trimmed.is_empty() {
            return Err(format!(
                "Model version is empty; expected the format {MODEL_VERSION_FORMAT}."
            ));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(malformed());
        }
        let (slug, version) = trimmed.split_once(':').ok_or_else(malformed)?;
        let (owner, name) = slug.split_once('/').ok_or_else(malformed)?;
        if owner.is_empty()
            || name.is_empty()
            || version.is_empty()
            || name.contains('/')
            || version.contains(':')
        {
            return Err(malformed());
        }
        Ok(Self {
            raw: trimmed.to_string(),
            owner_end: owner.len(),
            name_end: slug.len(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.raw[..self.owner_end]
    }

    pub fn name(&self) -> &str {
        &self.raw[self.owner_end + 1..self.name_end]
    }

    pub fn version(&self) -> &str {
        &self.raw[self.name_end + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ModelVersionId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl fmt::Display for ModelVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
