//! OpenAI-compatible chat completions backend.
//!
//! Works against Groq (the default) and any server implementing
//! `POST /v1/chat/completions`: OpenAI, Ollama, vLLM, llama.cpp server.

use crate::config::LlmConfig;
use crate::error::{Result, SpeechError};
use crate::history::Utterance;
use crate::http;
use crate::llm::{Generation, Generator, MAX_TOKENS, TEMPERATURE, strip_think_blocks};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Generator backed by a chat completions HTTP API.
pub struct ApiGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for ApiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiGenerator")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Utterance],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ApiGenerator {
    /// Create a generator for `config` authenticated with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the HTTP client cannot be built.
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(SpeechError::Config("Groq API key not configured".into()));
        }
        let url = http::endpoint(&config.api_url, "v1/chat/completions");
        info!(url = %url, model = %config.model, "API generator ready");
        Ok(Self {
            client: http::client(config.request_timeout_secs)?,
            url,
            model: config.model.clone(),
            api_key: api_key.trim().to_owned(),
        })
    }

    async fn request(&self, history: &[Utterance]) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: history,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Llm(format!("invalid response body: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SpeechError::Llm("response contained no message".into()))?;
        Ok(strip_think_blocks(&content))
    }
}

fn map_http_error(status: reqwest::StatusCode, body: &str) -> SpeechError {
    let message = http::extract_error_message(body);
    match status.as_u16() {
        401 => SpeechError::Llm(format!("HTTP 401: authentication failed: {message}")),
        429 => SpeechError::Llm(format!("HTTP 429: rate limited: {message}")),
        code => SpeechError::Llm(format!("HTTP {code}: {message}")),
    }
}

#[async_trait]
impl Generator for ApiGenerator {
    fn name(&self) -> &str {
        "groq"
    }

    async fn generate(&self, history: &[Utterance], cancel: &CancellationToken) -> Result<Generation> {
        let started = Instant::now();
        debug!(messages = history.len(), "sending chat completion");
        tokio::select! {
            () = cancel.cancelled() => {
                info!("generation cancelled");
                Ok(Generation::Cancelled)
            }
            result = self.request(history) => match result {
                Ok(text) if text.is_empty() => {
                    warn!("model returned an empty reply");
                    Err(SpeechError::Llm("empty reply".into()))
                }
                Ok(text) => {
                    info!(
                        chars = text.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "generation complete"
                    );
                    Ok(Generation::Reply(text))
                }
                Err(e) => Err(e),
            },
        }
    }
}
