//! The `OllamaClient` struct implements `ClientWrapper` for Ollama's chat endpoint,
//! returning the assistant reply and recording the prompt/completion token counts
//! Ollama reports with every non-streaming response.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpchat::clients::ollama::OllamaClient;
//! use mcpchat::client_wrapper::{ClientWrapper, Message};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new("http://localhost:11434", "llama3.2:3b")?;
//! let reply = client
//!     .send_message(&[Message::system("You are terse."), Message::user("Hello!")])
//!     .await?;
//! println!("Assistant: {}", reply.content);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::mcpchat::client_wrapper::{ClientWrapper, Message, ModelError, TokenUsage};
use crate::mcpchat::http_client_pool::get_or_create_client;

/// Default request timeout. Cold model loads on a local Ollama can be slow.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<Message>,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

/// Client wrapper for a local or remote Ollama server.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
    /// Storage for the token usage returned by the most recent request.
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OllamaClient {
    /// Construct a client for `base_url` (e.g. `http://localhost:11434`) and a model name.
    pub fn new(base_url: &str, model: &str) -> Result<Self, ModelError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = get_or_create_client(&base_url)
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            model: model.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            token_usage: Mutex::new(None),
        })
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[async_trait]
impl ClientWrapper for OllamaClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ModelError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        let response = self
            .client
            .post(self.chat_url())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                log::error!("mcpchat::clients::ollama: request failed: {}", e);
                ModelError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!(
                "mcpchat::clients::ollama: backend returned {}: {}",
                status.as_u16(),
                body
            );
            return Err(ModelError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        if let (Some(input), Some(output)) = (parsed.prompt_eval_count, parsed.eval_count) {
            *self.token_usage.lock().await = Some(TokenUsage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: input + output,
            });
        }

        parsed.message.ok_or_else(|| {
            ModelError::InvalidResponse("response did not contain a message".to_string())
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}
