//! OpenAI-compatible chat completions client (Groq by default).

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{AgentError, AgentResult};
use crate::llm::{strip_thinking, ChatMessage, GenerationPort, GenerationRequest, GenerationResponse};

/// Upstream error bodies are cut to this many characters in errors.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client with exponential-backoff retries on rate limits,
/// server errors and connection failures.
#[derive(Debug, Clone)]
pub struct GroqClient {
    http: Client,
    provider: String,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: usize,
    retry_delay: Duration,
}

impl GroqClient {
    /// Create a client from the `[llm]` configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::MissingApiKey`] when no key is configured and
    /// [`AgentError::Request`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> AgentResult<Self> {
        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| AgentError::MissingApiKey {
                provider: config.provider.clone(),
            })?;

        let http = Client::builder()
            .user_agent(concat!(
                "verso/",
                env!("CARGO_PKG_VERSION"),
                " (https://github.com/oxur/verso)"
            ))
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            provider: config.provider.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model_name.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Override the initial backoff delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_once(&self, request: &GenerationRequest) -> AgentResult<GenerationResponse> {
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(AgentError::Upstream {
                provider: self.provider.clone(),
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        parse_completion(&self.provider, &text)
    }
}

#[async_trait]
impl GenerationPort for GroqClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn generate(&self, request: GenerationRequest) -> AgentResult<GenerationResponse> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry_delay)
            .with_max_times(self.max_retries);

        (|| async { self.complete_once(&request).await })
            .retry(backoff)
            .when(AgentError::is_transient)
            .notify(|err, delay| {
                log::warn!(
                    "{} request failed ({}), retrying in {:?}",
                    self.provider,
                    err,
                    delay
                );
            })
            .await
    }
}

/// Extract the first choice's text from a chat completions body.
fn parse_completion(provider: &str, body: &str) -> AgentResult<GenerationResponse> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| AgentError::Parse {
            provider: provider.to_string(),
            message: e.to_string(),
        })?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| AgentError::Parse {
            provider: provider.to_string(),
            message: "response contains no message content".to_string(),
        })?;

    Ok(GenerationResponse {
        text: strip_thinking(&content),
        model: parsed.model,
    })
}
