use super::registry::{ModelCatalog, Operation};

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub catalog: ModelCatalog,
}

impl ModelSelector {
    /// An explicit override always wins, even when the catalog does not
    /// know it; the catalog only supplies defaults.
    pub fn select(&self, operation: Operation, requested: Option<&str>) -> Result<String, String> {
        if let Some(requested) = requested.map(str::trim).filter(|value| !value.is_empty()) {
            return Ok(requested.to_string());
        }
        self.catalog
            .default_for(operation)
            .map(|model| model.name.clone())
            .ok_or_else(|| {
                format!("No default model for operation '{operation}'; an explicit model is required.")
            })
    }
}
