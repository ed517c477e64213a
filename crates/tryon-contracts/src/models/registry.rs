use std::fmt;

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Try-on, edit and generative identity transfer share one image model.
    Image,
    FaceSwap,
    Video,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::FaceSwap => "face_swap",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub operations: Vec<Operation>,
}

impl ModelSpec {
    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }
}

/// Known models in registration order.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            models: default_models(),
        }
    }
}

impl ModelCatalog {
    /// First registered model for the operation is its default.
    pub fn default_for(&self, operation: Operation) -> Option<&ModelSpec> {
        self.models.values().find(|model| model.supports(operation))
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, operations: &[Operation]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                operations: operations.to_vec(),
            },
        );
    };

    insert("gemini-2.5-flash-image", &[Operation::Image]);
    insert("gemini-3-pro-image-preview", &[Operation::Image]);
    insert(
        "cdingram/face-swap:d1d6ea8c8be89d664a07a457526f7128109dee7030fdac424788d762c71ed111",
        &[Operation::FaceSwap],
    );

    map
}
