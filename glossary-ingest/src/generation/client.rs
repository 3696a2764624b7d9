//! Chat completion client
//!
//! `CompletionClient` is the seam the runner talks to; `OpenAiClient` is the
//! production implementation against an OpenAI-compatible
//! `/chat/completions` endpoint.

use async_trait::async_trait;
use glossary_common::config::{
    is_valid_key, select_api_key, OpenAiConfig, TomlConfig, OPENAI_API_KEY_ENV,
};
use glossary_common::db::{get_setting, set_setting, OPENAI_API_KEY_SETTING};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Completion request failed: {0}")]
    Request(String),

    #[error("Completion API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),

    #[error("No API key configured (set {0} or openai.api_key)")]
    MissingApiKey(&'static str),
}

/// Generated text plus token usage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<Completion, GenerationError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub struct OpenAiClient {
    client: Client,
    api_base: String,
    api_key: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl OpenAiClient {
    /// `requests_per_second` of 0 is treated as 1
    pub fn new(
        api_base: &str,
        api_key: String,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerationError::Request(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter,
        })
    }

    pub fn from_config(
        config: &OpenAiConfig,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        Self::new(&config.api_base, api_key, timeout, config.requests_per_second)
    }
}

/// OpenAI API key from environment, database settings or TOML, in that order
pub async fn resolve_api_key(
    db: Option<&SqlitePool>,
    config: &TomlConfig,
) -> glossary_common::Result<Option<String>> {
    let env_key = std::env::var(OPENAI_API_KEY_ENV).ok();
    let db_key = match db {
        Some(pool) => get_setting::<String>(pool, OPENAI_API_KEY_SETTING).await?,
        None => None,
    };

    Ok(select_api_key(env_key, db_key, config.openai.api_key.clone()).map(|(key, source)| {
        tracing::info!(source, "Using OpenAI API key");
        key
    }))
}

/// Persist an OpenAI API key in the database settings
///
/// The environment still takes precedence at resolution time.
pub async fn store_api_key(db: &SqlitePool, key: &str) -> glossary_common::Result<()> {
    if !is_valid_key(key) {
        return Err(glossary_common::Error::InvalidInput(
            "API key must not be blank".to_string(),
        ));
    }
    set_setting(db, OPENAI_API_KEY_SETTING, key.trim()).await?;
    tracing::info!("Stored OpenAI API key in database settings");
    Ok(())
}

/// Production client built from `config`, if a key is available
pub async fn client_from_config(
    db: Option<&SqlitePool>,
    config: &TomlConfig,
) -> glossary_common::Result<Option<OpenAiClient>> {
    let Some(api_key) = resolve_api_key(db, config).await? else {
        return Ok(None);
    };
    let timeout = Duration::from_secs(config.generation.request_timeout_secs);
    OpenAiClient::from_config(&config.openai, api_key, timeout)
        .map(Some)
        .map_err(|e| glossary_common::Error::Config(e.to_string()))
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<Completion, GenerationError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        tracing::debug!(model, "Requesting chat completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse("no choices in response".to_string()))?;

        let (prompt_tokens, completion_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(Completion {
            content,
            prompt_tokens,
            completion_tokens,
        })
    }
}
