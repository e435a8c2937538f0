pub mod commands;
pub mod handler;

pub use commands::OperatorCommand;
pub use handler::{MAX_REPLY_CHARS, OperatorBridge, clamp, fit_reply};
