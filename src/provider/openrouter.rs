//! OpenRouter (OpenAI-compatible) chat-completions client

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::prompt::PromptTemplate;
use crate::config::CompletionConfig;
use crate::core::provider::{classify_status, transport_error};
use crate::core::{CompletionProvider, GenerationOptions};
use crate::error::{Error, ProviderFailure, Result};
use crate::retrieval::GroundingContext;

const PROVIDER: &str = "openrouter";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

/// Completion provider backed by an OpenAI-compatible API
pub struct OpenRouterCompletion {
    /// HTTP client
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    prompt: PromptTemplate,
}

impl OpenRouterCompletion {
    /// Create a new client. Requires `config.api_key`.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| Error::Config("completion.api_key is not set".to_string()))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );
        headers.insert("X-Title", header::HeaderValue::from_static("threadwise"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(OpenRouterCompletion {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            prompt: PromptTemplate::grounding()?,
        })
    }

    /// Get the default model
    pub fn default_model(&self) -> &str {
        &self.model
    }

    async fn send_request(&self, request: &ChatCompletionRequest<'_>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending request to OpenRouter: model={}", request.model);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                PROVIDER,
                classify_status(status, &error_text),
                format!("API error ({}): {}", status, error_text),
            ));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, ProviderFailure::Upstream, e.to_string()))?;

        if let Some(ref usage) = body.usage {
            info!(
                "OpenRouter response: model={}, tokens={}",
                body.model, usage.total_tokens
            );
        }

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            Error::provider(PROVIDER, ProviderFailure::Upstream, "response had no choices")
        })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(Error::provider(
                PROVIDER,
                ProviderFailure::ContentPolicy,
                "completion stopped by content filter",
            ));
        }

        choice
            .message
            .content
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                Error::provider(PROVIDER, ProviderFailure::Upstream, "response had no content")
            })
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterCompletion {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(
        &self,
        prompt: &str,
        grounding: &GroundingContext,
        options: &GenerationOptions,
    ) -> Result<String> {
        let system = self.prompt.render_grounding(grounding)?;
        let request = ChatCompletionRequest {
            model: options.model.as_deref().unwrap_or(&self.model),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: options.max_tokens.unwrap_or(self.max_tokens),
            temperature: options.temperature.unwrap_or(self.temperature),
            stream: false,
        };

        self.send_request(&request).await
    }
}
