use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded, retry after {0}s")]
    RateLimitExceeded(u64),

    #[error("Request timeout")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("No API key configured (set {0})")]
    MissingApiKey(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A system + user prompt pair
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Trait for generative text services
///
/// Implementations return the raw text of the model's answer; callers own
/// parsing and validation.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LLMError>;
}

/// Client used when no API key is configured; every call fails fast
#[derive(Debug, Clone)]
pub struct OfflineClient {
    api_key_env: String,
}

impl OfflineClient {
    pub fn new(api_key_env: impl Into<String>) -> Self {
        Self {
            api_key_env: api_key_env.into(),
        }
    }
}

#[async_trait]
impl GenerativeClient for OfflineClient {
    async fn complete(&self, _prompt: &Prompt) -> Result<String, LLMError> {
        Err(LLMError::MissingApiKey(self.api_key_env.clone()))
    }
}
