//! Language-model client.
//!
//! Defines the [`LanguageModel`] trait and its implementations:
//! - **[`DisabledModel`]**: fails every call; used when `llm.provider = "disabled"`.
//! - **[`OpenAiModel`]**: calls an OpenAI-compatible `/chat/completions`
//!   endpoint with timeout, retry, and backoff.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)
//!
//! Section generation calls [`complete_checked`] so it can categorize
//! failures for telemetry. [`invoke_model`] is the soft-failure entry point
//! for one-off callers that only want text: every error becomes an empty
//! string.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::telemetry::{CategorizedError, ErrorCategory};

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier for logs (e.g. `"gpt-4o-mini"`).
    fn name(&self) -> &str;

    /// Run `prompt` as the instruction over `context` as the data block and
    /// return the raw completion text.
    async fn complete(&self, prompt: &str, context: &str) -> Result<String>;
}

/// Instantiate the model named by `config.provider`.
pub fn create_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "openai" => Ok(Box::new(OpenAiModel::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: '{}'", other),
    }
}

/// Call the model, returning a trimmed non-empty completion.
///
/// An empty response is an error of category [`ErrorCategory::Response`].
pub async fn complete_checked(
    model: &dyn LanguageModel,
    prompt: &str,
    context: &str,
) -> Result<String> {
    let text = model.complete(prompt, context).await?;
    let text = text.trim();
    if text.is_empty() {
        return Err(CategorizedError::new(ErrorCategory::Response, "empty completion").into());
    }
    Ok(text.to_string())
}

/// Call the model, returning an empty string on any failure.
///
/// The pipeline does not use this; it goes through [`complete_checked`] to
/// keep the error category. The error is still logged here.
pub async fn invoke_model(model: &dyn LanguageModel, prompt: &str, context: &str) -> String {
    match complete_checked(model, prompt, context).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(model = model.name(), error = %format!("{:#}", e), "model call failed");
            String::new()
        }
    }
}

// ============ Disabled Model ============

pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str, _context: &str) -> Result<String> {
        Err(CategorizedError::new(ErrorCategory::Credential, "language model disabled").into())
    }
}

// ============ OpenAI-compatible Model ============

pub struct OpenAiModel {
    model: String,
    endpoint: String,
    api_key_env: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiModel {
    /// Build the client. A missing API key is not checked here; it surfaces
    /// as a credential failure on the first call.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key_env: config.api_key_env.clone(),
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, context: &str) -> Result<String> {
        let api_key = match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                return Err(CategorizedError::new(
                    ErrorCategory::Credential,
                    format!("{} not set", self.api_key_env),
                )
                .into())
            }
        };

        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                {"role": "system", "content": prompt},
                {"role": "user", "content": context},
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::Error::new(CategorizedError::new(
                            ErrorCategory::Network,
                            format!("API error {}: {}", status, body_text),
                        )));
                        continue;
                    }

                    let category = if status.as_u16() == 401 || status.as_u16() == 403 {
                        ErrorCategory::Credential
                    } else {
                        ErrorCategory::Response
                    };
                    return Err(CategorizedError::new(
                        category,
                        format!("API error {}: {}", status, body_text),
                    )
                    .into());
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
pub fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CategorizedError::new(
                ErrorCategory::Response,
                "Invalid completion response: missing choices[0].message.content",
            )
            .into()
        })
}
