use crate::llm::client::{GenerativeClient, LLMError, Prompt};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const OPENAI_RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

// Rate limiting: 10 requests per minute
const RATE_LIMIT_REQUESTS: usize = 10;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    text: TextOptions,
}

#[derive(Serialize)]
struct InputMessage<'a> {
    role: &'a str,
    content: Vec<InputContent<'a>>,
}

#[derive(Serialize)]
struct InputContent<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct TextOptions {
    format: TextFormat,
}

#[derive(Serialize)]
struct TextFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesResponse {
    /// Join every `output_text` block of every message item
    fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter())
            .filter(|c| c.kind == "output_text")
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

pub struct OpenAIClient {
    api_key: String,
    model: String,
    http_client: Client,
    // Rate limiting: track request timestamps
    request_times: Mutex<Vec<Instant>>,
}

impl OpenAIClient {
    pub fn new(api_key: String) -> Result<Self, LLMError> {
        Self::with_model(api_key, DEFAULT_MODEL.to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Result<Self, LLMError> {
        let http_client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            api_key,
            model,
            http_client,
            request_times: Mutex::new(Vec::new()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check and enforce rate limiting
    /// Returns Ok(()) if request is allowed, Err with wait time if rate limited
    fn check_rate_limit(&self) -> Result<(), LLMError> {
        let now = Instant::now();
        let mut times = self
            .request_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Remove requests older than the rate limit window
        times.retain(|&time| now.duration_since(time) < RATE_LIMIT_WINDOW);

        // Check if we've exceeded the rate limit
        if times.len() >= RATE_LIMIT_REQUESTS {
            let oldest = times[0];
            let wait_time = RATE_LIMIT_WINDOW.saturating_sub(now.duration_since(oldest));
            return Err(LLMError::RateLimitExceeded(wait_time.as_secs()));
        }

        // Record this request
        times.push(now);
        Ok(())
    }

    fn build_request<'a>(&'a self, prompt: &'a Prompt) -> ResponsesRequest<'a> {
        ResponsesRequest {
            model: &self.model,
            input: vec![
                InputMessage {
                    role: "system",
                    content: vec![InputContent {
                        kind: "input_text",
                        text: &prompt.system,
                    }],
                },
                InputMessage {
                    role: "user",
                    content: vec![InputContent {
                        kind: "input_text",
                        text: &prompt.user,
                    }],
                },
            ],
            text: TextOptions {
                format: TextFormat { kind: "text" },
            },
        }
    }

    async fn call_api(&self, prompt: &Prompt) -> Result<String, LLMError> {
        let request_body = self.build_request(prompt);

        let mut attempt = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            attempt += 1;

            let response = self
                .http_client
                .post(OPENAI_RESPONSES_URL)
                .bearer_auth(&self.api_key)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await?;

            let status = response.status();

            if status.is_success() {
                let api_response: ResponsesResponse = response.json().await?;
                let text = api_response.output_text();

                if text.is_empty() {
                    return Err(LLMError::InvalidResponse(
                        "No output text in response".to_string(),
                    ));
                }

                debug!(
                    model = %self.model,
                    preview = %text.chars().take(500).collect::<String>(),
                    "model response received"
                );
                return Ok(text);
            } else if status.as_u16() == 429 {
                // Rate limit - check retry-after header
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);

                if attempt >= MAX_RETRIES {
                    return Err(LLMError::RateLimitExceeded(retry_after));
                }

                // Exponential backoff with retry-after
                let wait_ms = retry_after.saturating_mul(1000).max(backoff_ms);
                warn!(wait_ms, attempt, max = MAX_RETRIES, "rate limited, retrying");

                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                backoff_ms *= 2;
                continue;
            } else {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(LLMError::ApiError(format!(
                    "API returned status {}: {}",
                    status, error_text
                )));
            }
        }
    }
}

#[async_trait]
impl GenerativeClient for OpenAIClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LLMError> {
        // Check rate limiting before making API call
        self.check_rate_limit()?;
        self.call_api(prompt).await
    }
}
