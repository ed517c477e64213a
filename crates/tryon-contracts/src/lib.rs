pub mod api;
pub mod artifacts;
pub mod events;
pub mod history;
pub mod jobs;
pub mod models;
pub mod redact;
