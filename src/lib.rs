pub mod audit;
pub mod bridge;
pub mod config;
pub mod error;
pub mod error_translation;
pub mod exec;
pub mod git;
pub mod llm;
pub mod patch;
pub mod security;
pub mod verify;

// Re-export commonly used types for convenience
pub use bridge::OperatorBridge;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use patch::{PatchLifecycle, PatchSession};
