mod registry;
mod selectors;
mod version;

pub use registry::{ModelCatalog, ModelSpec, Operation};
pub use selectors::ModelSelector;
pub use version::{ModelVersionId, MODEL_VERSION_FORMAT};
