pub mod executor;
pub mod supervisor;

// Re-export commonly used types
pub use executor::{
    DEFAULT_OUTPUT_CAP, DEFAULT_TIMEOUT, ExecError, ExecutionRequest, ExecutionResult,
    ProcessExecutor,
};
pub use supervisor::Supervisor;
