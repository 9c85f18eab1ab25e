//! Tool Protocol Abstraction Layer
//!
//! This module defines the seam between the orchestration core and capability providers.
//! A provider is anything implementing [`ToolProtocol`]: a subprocess speaking MCP over
//! stdio, a set of in-process closures, or a test double.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator → ToolRegistry → ToolProtocol (trait) → [MCP stdio | Custom | User-defined]
//! ```
//!
//! Results travel back as an [`InvocationResult`], a plain value that represents failure
//! with `is_error` instead of unwinding, so a misbehaving provider never ends a
//! conversation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::error::Error;
use std::fmt;

/// Arguments passed to a capability: a JSON object keyed by argument name.
pub type Arguments = Map<String, JsonValue>;

/// A capability advertised by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Unique, stable identifier the model uses to request the capability.
    pub name: String,
    /// Human-readable description embedded into the system prompt.
    #[serde(default)]
    pub description: String,
    /// JSON schema of the accepted arguments, as advertised by the provider.
    #[serde(rename = "inputSchema", default)]
    pub input_schema: JsonValue,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Replace the argument schema.
    pub fn with_input_schema(mut self, schema: JsonValue) -> Self {
        self.input_schema = schema;
        self
    }
}

/// One typed item of provider output.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    /// `{"type": "text", "text": ...}`
    Text(String),
    /// `{"type": "resource", "resource": {"text": ..., "mimeType": ...}}`
    Resource {
        uri: Option<String>,
        mime_type: Option<String>,
        text: String,
    },
    /// Anything else (images, blobs, future item kinds), kept verbatim.
    Opaque(JsonValue),
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        ContentItem::Text(text.into())
    }

    /// Classify a raw content item by its `type` tag.
    ///
    /// A `resource` without textual contents stays [`ContentItem::Opaque`].
    pub fn from_value(value: JsonValue) -> Self {
        let tag = value.get("type").and_then(JsonValue::as_str);
        match tag {
            Some("text") => {
                if let Some(text) = value.get("text").and_then(JsonValue::as_str) {
                    return ContentItem::Text(text.to_string());
                }
            }
            Some("resource") => {
                if let Some(resource) = value.get("resource") {
                    if let Some(text) = resource.get("text").and_then(JsonValue::as_str) {
                        let field = |key: &str| {
                            resource
                                .get(key)
                                .and_then(JsonValue::as_str)
                                .map(str::to_string)
                        };
                        return ContentItem::Resource {
                            uri: field("uri"),
                            mime_type: field("mimeType"),
                            text: text.to_string(),
                        };
                    }
                }
            }
            _ => {}
        }
        ContentItem::Opaque(value)
    }
}

/// Payload of an [`InvocationResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationContent {
    Text(String),
    Structured(JsonValue),
    Items(Vec<ContentItem>),
}

impl InvocationContent {
    /// Interpret a raw payload: arrays become typed items, strings stay text,
    /// everything else is kept as structured data.
    pub fn from_value(value: JsonValue) -> Self {
        match value {
            JsonValue::String(text) => InvocationContent::Text(text),
            JsonValue::Array(items) => {
                InvocationContent::Items(items.into_iter().map(ContentItem::from_value).collect())
            }
            other => InvocationContent::Structured(other),
        }
    }
}

/// Represents the outcome of one capability invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub content: InvocationContent,
    pub is_error: bool,
}

impl InvocationResult {
    /// Convenience constructor for a successful invocation.
    pub fn success(content: InvocationContent) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Successful invocation carrying a single text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self::success(InvocationContent::Items(vec![ContentItem::text(text)]))
    }

    /// Error-flagged result carrying a descriptive message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: InvocationContent::Text(message.into()),
            is_error: true,
        }
    }
}

/// Error types for provider operations
#[derive(Debug, Clone)]
pub enum ToolError {
    /// The provider process could not be started or did not complete its handshake.
    ProviderUnreachable(String),
    /// The provider path does not name a runtime we know how to launch.
    UnsupportedProviderKind(String),
    /// No connected provider advertises the requested capability.
    UnknownCapability(String),
    /// A call failed mid-flight (pipe closed, timeout, JSON-RPC error).
    InvocationTransport(String),
    /// The provider replied with something that is not valid protocol.
    Protocol(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::ProviderUnreachable(msg) => write!(f, "Provider unreachable: {}", msg),
            ToolError::UnsupportedProviderKind(path) => write!(
                f,
                "Unsupported provider kind: {} (provider must be a .js or .py file)",
                path
            ),
            ToolError::UnknownCapability(name) => write!(f, "Tool \"{}\" not found.", name),
            ToolError::InvocationTransport(msg) => write!(f, "Invocation failed: {}", msg),
            ToolError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// A connection to one capability provider.
///
/// Implementations own whatever resource backs the provider (a child process, a set
/// of closures) for as long as the connection lives.
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    /// Capabilities advertised by the provider, in the provider's order.
    async fn list_tools(&self) -> Result<Vec<CapabilityDescriptor>, ToolError>;

    /// Invoke a capability. Provider-reported failures come back as
    /// `Ok(InvocationResult { is_error: true, .. })`; `Err` means the call itself
    /// could not be completed.
    async fn execute(
        &self,
        tool_name: &str,
        arguments: Arguments,
    ) -> Result<InvocationResult, ToolError>;

    /// Protocol identifier (e.g. "mcp-stdio", "custom").
    fn protocol_name(&self) -> &str;

    /// Release the provider. Must tolerate being called more than once and after
    /// the provider has already died.
    async fn shutdown(&self) -> Result<(), ToolError> {
        Ok(())
    }
}
