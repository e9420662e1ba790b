// Core modules
pub mod bridge;
pub mod broker;
pub mod engine;
pub mod feed;
pub mod models;
pub mod state;

// Re-export commonly used types
pub use engine::{Engine, EngineHandle, EngineSettings};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
