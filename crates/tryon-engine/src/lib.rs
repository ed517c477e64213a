pub mod config;
pub mod error;
pub mod fallback;
pub mod gemini;
pub mod jobs;
pub mod normalize;
pub mod prompts;
pub mod refine;
pub mod replicate;
pub mod studio;
pub mod validate;

mod transport;

#[cfg(test)]
mod testing;

pub use config::{PollSettings, StudioConfig};
pub use error::{ErrorKind, StudioError, StudioResult, UserMessage};
pub use studio::Studio;
