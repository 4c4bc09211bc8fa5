//! OllamaProvider -- concrete [`LlmProvider`] for a local Ollama backend.
//!
//! Sends non-streaming requests to `/api/chat` with the JSON output format
//! enabled, which nudges the model toward parseable responses before the
//! generator's own repair loop even runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ideaforge_core::llm::LlmProvider;
use ideaforge_types::error::LlmError;
use ideaforge_types::llm::{CompletionRequest, CompletionResponse, ResponseContent};

use crate::config::ForgeConfig;

/// Ollama chat provider.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    keep_alive: Option<String>,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            // Local generation can be slow; the retry budget, not the
            // clock, bounds an attempt sequence.
            .timeout(Duration::from_secs(600))
            .build()
            .expect("failed to create reqwest client");
        Self {
            client,
            base_url: base_url.into(),
            keep_alive: None,
        }
    }

    pub fn from_config(config: &ForgeConfig) -> Self {
        Self::new(config.ollama_base_url.clone()).with_keep_alive(config.keep_alive.clone())
    }

    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    /// Whether the backend answers at all. Callers use this to decide
    /// between wiring a provider and running in deterministic-fallback
    /// mode.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::warn!(error = %err, "ollama backend is not reachable");
                false
            }
        }
    }

    fn chat_request<'a>(&'a self, request: &'a CompletionRequest) -> OllamaChatRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(OllamaMessage {
                role: "system",
                content: system.clone(),
            });
        }
        for message in &request.messages {
            messages.push(OllamaMessage {
                role: match message.role {
                    ideaforge_types::llm::MessageRole::System => "system",
                    ideaforge_types::llm::MessageRole::User => "user",
                    ideaforge_types::llm::MessageRole::Assistant => "assistant",
                },
                content: message.content.clone(),
            });
        }
        OllamaChatRequest {
            model: &request.model,
            messages,
            stream: false,
            format: Some("json"),
            keep_alive: self.keep_alive.as_deref(),
            options: request.temperature.map(|temperature| OllamaOptions {
                temperature: Some(temperature),
            }),
        }
    }
}

impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let body = self.chat_request(request);

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Provider(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider(format!(
                "ollama request failed ({status}): {text}"
            )));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Deserialization(err.to_string()))?;
        let message = parsed
            .message
            .ok_or_else(|| LlmError::Deserialization("response missing message".to_string()))?;

        Ok(CompletionResponse {
            model: if parsed.model.is_empty() {
                request.model.clone()
            } else {
                parsed.model
            },
            content: ResponseContent::Text(message.content),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    message: Option<OllamaResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}
