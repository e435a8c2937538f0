pub mod settings;

pub use settings::{
    Config, ConfigError, ExecConfig, LLMConfig, OperatorConfig, PatchConfig, RepoConfig,
    SupervisorConfig, VerifyConfig,
};
