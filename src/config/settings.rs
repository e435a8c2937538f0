use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "OPSBRIDGE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    DirectoryNotFound,

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub repo: RepoConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub llm: LLMConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub patch: PatchConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RepoConfig {
    /// Repository the bridge manages
    pub root: PathBuf,
    /// Scratch directory for snapshots, relative to the root
    pub scratch_dir: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            scratch_dir: "workspace".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct OperatorConfig {
    /// The only sender allowed to issue commands
    pub id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: crate::llm::openai::DEFAULT_MODEL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExecConfig {
    pub timeout_seconds: u64,
    /// Characters kept from each of stdout and stderr
    pub output_cap: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 120,
            output_cap: crate::exec::DEFAULT_OUTPUT_CAP,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PatchConfig {
    pub allowed_files: Vec<String>,
    pub shrink_ratio: f64,
    pub max_file_bytes: u64,
}

impl Default for PatchConfig {
    fn default() -> Self {
        let policy = crate::patch::PatchPolicy::default();
        Self {
            allowed_files: policy.allowed_files,
            shrink_ratio: policy.shrink_ratio,
            max_file_bytes: policy.max_file_bytes,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct VerifyConfig {
    pub base_url: String,
    pub attempts: u32,
    pub spacing_ms: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            attempts: crate::verify::DEFAULT_ATTEMPTS,
            spacing_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    pub binary: String,
    pub app_name: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            binary: "pm2".to_string(),
            app_name: "orchestrator".to_string(),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::DirectoryNotFound)?;
        Ok(PathBuf::from(home).join(".config").join("opsbridge"))
    }

    /// Get the config file path, honoring `OPSBRIDGE_CONFIG`
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.is_empty()
        {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path()?)
    }

    /// Load configuration from a specific file
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::ReadError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Config file not found",
            )));
        }

        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        self.validate()?;

        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        // Set permissions to 600 (owner read/write only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Config {
            repo: RepoConfig::default(),
            operator: OperatorConfig::default(),
            llm: LLMConfig::default(),
            exec: ExecConfig::default(),
            patch: PatchConfig::default(),
            verify: VerifyConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.provider != "openai" {
            return Err(ConfigError::InvalidValue(format!(
                "Unsupported LLM provider: {}. Only 'openai' is supported",
                self.llm.provider
            )));
        }

        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue("llm.model must not be empty".to_string()));
        }

        if self.llm.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "llm.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.exec.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "exec.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.exec.output_cap == 0 {
            return Err(ConfigError::InvalidValue(
                "exec.output_cap must be greater than 0".to_string(),
            ));
        }

        if self.patch.allowed_files.is_empty() {
            return Err(ConfigError::InvalidValue(
                "patch.allowed_files must list at least one file".to_string(),
            ));
        }

        if !(self.patch.shrink_ratio > 0.0 && self.patch.shrink_ratio <= 1.0) {
            return Err(ConfigError::InvalidValue(format!(
                "patch.shrink_ratio must be in (0, 1], got {}",
                self.patch.shrink_ratio
            )));
        }

        if self.patch.max_file_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "patch.max_file_bytes must be greater than 0".to_string(),
            ));
        }

        if self.verify.attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "verify.attempts must be greater than 0".to_string(),
            ));
        }

        if self.repo.scratch_dir.contains("..") || Path::new(&self.repo.scratch_dir).is_absolute() {
            return Err(ConfigError::InvalidValue(format!(
                "repo.scratch_dir must be a relative directory name: {}",
                self.repo.scratch_dir
            )));
        }

        Ok(())
    }

    /// Get API key from environment variable or config
    pub fn get_api_key(&self) -> Option<String> {
        // First try environment variable
        if let Ok(key) = std::env::var(&self.llm.api_key_env)
            && !key.is_empty()
        {
            return Some(key);
        }

        // Fall back to config file if present
        self.llm.api_key.clone()
    }

    /// Check if API key is available
    pub fn has_api_key(&self) -> bool {
        self.get_api_key().is_some()
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec.timeout_seconds)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_seconds)
    }

    pub fn verify_spacing(&self) -> Duration {
        Duration::from_millis(self.verify.spacing_ms)
    }

    /// Absolute scratch directory under the repository root
    pub fn scratch_path(&self) -> PathBuf {
        self.repo.root.join(&self.repo.scratch_dir)
    }

    pub fn patch_policy(&self) -> crate::patch::PatchPolicy {
        crate::patch::PatchPolicy {
            allowed_files: self.patch.allowed_files.clone(),
            shrink_ratio: self.patch.shrink_ratio,
            max_file_bytes: self.patch.max_file_bytes,
        }
    }
}
