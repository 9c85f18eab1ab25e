//! The `llm_session` module owns the conversation with the model backend.
//!
//! **Key features:**
//! - **Single source of truth**: the history sent to the model is exactly the history
//!   kept here, nothing is trimmed or summarized.
//! - **Capability-aware system prompt**: [`LLMSession::prime_system_prompt`] renders the
//!   catalog and the tool-call response contract into the first system message.
//! - **Observations**: tool results enter the history as system messages, so the model
//!   reads them as context rather than as user input.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcpchat::clients::ollama::OllamaClient;
//! use mcpchat::LLMSession;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new("http://localhost:11434", "llama3.2:3b")?;
//! let mut session = LLMSession::new(Arc::new(client));
//! session.prime_system_prompt(&[]);
//!
//! let reply = session.send_turn("Hello, how are you?").await?;
//! println!("Assistant: {}", reply.content);
//! # Ok(())
//! # }
//! ```

use crate::mcpchat::client_wrapper::{ClientWrapper, Message, ModelError, Role, TokenUsage};
use crate::mcpchat::tool_call::TOOL_CALLS_KEY;
use crate::mcpchat::tool_protocol::CapabilityDescriptor;
use std::sync::Arc;

/// A conversation with the model backend.
///
/// History only grows between calls to [`reset`](LLMSession::reset). When primed, the
/// first message is the system prompt describing the capability catalog.
pub struct LLMSession {
    client: Arc<dyn ClientWrapper>,
    history: Vec<Message>,
    /// Catalog the current system prompt was built from, kept for `reset()`.
    catalog: Vec<CapabilityDescriptor>,
    primed: bool,
}

impl LLMSession {
    /// Create an empty session. Call [`prime_system_prompt`](Self::prime_system_prompt)
    /// before the first turn.
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        LLMSession {
            client,
            history: Vec::new(),
            catalog: Vec::new(),
            primed: false,
        }
    }

    /// Install the system prompt for `catalog`.
    ///
    /// Calling it again replaces the existing system prompt in place instead of adding
    /// a second one.
    pub fn prime_system_prompt(&mut self, catalog: &[CapabilityDescriptor]) {
        self.catalog = catalog.to_vec();
        let prompt = Message::system(build_system_prompt(catalog));
        if self.primed {
            self.history[0] = prompt;
        } else {
            self.history.insert(0, prompt);
            self.primed = true;
        }
    }

    /// Append `prompt` as a user message, send the whole history to the model and
    /// append the reply.
    ///
    /// On failure the user message stays in history and the backend error is
    /// returned unchanged; no retry is attempted.
    pub async fn send_turn(&mut self, prompt: &str) -> Result<Message, ModelError> {
        self.history.push(Message::user(prompt));
        self.complete().await
    }

    /// Ask the model for its next message on the history as it stands, e.g. right
    /// after [`inject_observation`](Self::inject_observation).
    pub async fn follow_up(&mut self) -> Result<Message, ModelError> {
        self.complete().await
    }

    async fn complete(&mut self) -> Result<Message, ModelError> {
        let mut reply = self.client.send_message(&self.history).await?;
        // whatever the backend calls it, this is the model speaking
        reply.role = Role::Assistant;
        self.history.push(reply.clone());
        Ok(reply)
    }

    /// Append a system message carrying a tool result.
    pub fn inject_observation(&mut self, text: impl Into<String>) {
        self.history.push(Message::system(text));
    }

    /// Clear the history and re-install the system prompt for the last catalog.
    pub fn reset(&mut self) {
        self.history.clear();
        self.primed = false;
        let catalog = std::mem::take(&mut self.catalog);
        self.prime_system_prompt(&catalog);
    }

    /// The full history, system prompt first.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Usage reported by the backend for the most recent turn.
    pub async fn last_usage(&self) -> Option<TokenUsage> {
        self.client.get_last_usage().await
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }
}

/// Render the system prompt: every capability with its description and input schema,
/// followed by the exact JSON shape the model must use to request a call.
pub fn build_system_prompt(catalog: &[CapabilityDescriptor]) -> String {
    let tools_description = catalog
        .iter()
        .map(|tool| {
            format!(
                "Tool: {}\nDescription: {}\nInput Schema: {}",
                tool.name,
                tool.description,
                serde_json::to_string_pretty(&tool.input_schema)
                    .unwrap_or_else(|_| tool.input_schema.to_string())
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are an assistant with access to the following tools:\n\n{tools}\n\n\
When you need to use a tool, respond using this exact JSON format:\n\
{{\n  \"{key}\": [\n    {{\n      \"name\": \"tool_name\",\n      \"arguments\": {{\n        \"arg1\": \"value1\",\n        \"arg2\": \"value2\"\n      }}\n    }}\n  ]\n}}\n\n\
Only use {key} when a query requires external data. Otherwise, respond normally.",
        tools = tools_description,
        key = TOOL_CALLS_KEY,
    )
}
