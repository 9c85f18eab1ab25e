use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use tokio::sync::Mutex;

/// A ClientWrapper is a wrapper around a specific model backend.
/// It provides a common interface to send a full conversation and receive the next reply.
/// It does not keep track of the conversation, for that we use an LLMSession
/// which owns the message history and uses a ClientWrapper to talk to the model.
// src/mcpchat/client_wrapper.rs

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    // instructions and injected observations
    System,
    // a message sent by a human user (or app user)
    User,
    // lets the model know the content was generated as a response to a user message
    Assistant,
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Represents a single chat message exchanged with the model backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Failures talking to the model backend.
#[derive(Debug, Clone)]
pub enum ModelError {
    /// The backend answered with a non-success status. `body` is the raw response text.
    Backend { status: u16, body: String },
    /// The request never produced a response (connect failure, timeout, ...).
    Transport(String),
    /// The backend answered 2xx but the payload could not be understood.
    InvalidResponse(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Backend { status, body } => {
                write!(f, "Model backend error: {} {}", status, body)
            }
            ModelError::Transport(msg) => write!(f, "Model backend unreachable: {}", msg),
            ModelError::InvalidResponse(msg) => {
                write!(f, "Invalid response from model backend: {}", msg)
            }
        }
    }
}

impl Error for ModelError {}

/// Trait defining the interface to a chat-style model backend.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the full conversation to the model and get the assistant's reply.
    /// Streaming is never requested; the reply arrives in one piece.
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ModelError>;

    /// Model identifier sent with every request.
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the *last* send_message() call.
    /// Default impl reads the slot exposed by `usage_slot()`.
    async fn get_last_usage(&self) -> Option<TokenUsage> {
        match self.usage_slot() {
            Some(slot) => slot.lock().await.clone(),
            None => None,
        }
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        // Clients that report token usage return their slot by overriding this method.
        None
    }
}
