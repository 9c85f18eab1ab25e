//! Orchestrator and provider event system.
//!
//! Provides a callback-based observability layer. Implement [`EventHandler`] to receive
//! real-time notifications about:
//!
//! - **Queries**: start, completion and failure of each query
//! - **Model round-trips**: every turn sent to the model backend
//! - **Tool operations**: calls extracted from model output and their outcomes
//! - **Providers**: connections, capability replacement, shutdown
//!
//! Both trait methods have default no-op implementations, so you only override what
//! you care about. The handler is shared as `Arc<dyn EventHandler>`.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpchat::event::{EventHandler, OrchestratorEvent};
//! use async_trait::async_trait;
//!
//! struct MyHandler;
//!
//! #[async_trait]
//! impl EventHandler for MyHandler {
//!     async fn on_orchestrator_event(&self, event: &OrchestratorEvent) {
//!         if let OrchestratorEvent::ToolCallDetected { tool_name, .. } = event {
//!             println!("model asked for {}", tool_name);
//!         }
//!     }
//! }
//! ```

use crate::mcpchat::client_wrapper::TokenUsage;
use async_trait::async_trait;

/// Events emitted by the [`Orchestrator`](crate::Orchestrator) while it processes a query.
///
/// # Event Flow
///
/// ```text
/// QueryStarted
///   └─ LLMCallStarted { iteration: 1 }
///   └─ LLMCallCompleted { iteration: 1 }
///   └─ (for each extracted call, in order)
///       ├─ ToolCallDetected
///       ├─ ToolExecutionCompleted
///       ├─ LLMCallStarted { iteration: n }
///       └─ LLMCallCompleted { iteration: n }
/// QueryCompleted | QueryFailed
/// ```
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    QueryStarted {
        /// First ~120 characters of the query.
        query_preview: String,
    },
    /// Fired before each model turn. Iteration 1 is the query turn, later
    /// iterations are analysis turns.
    LLMCallStarted { iteration: usize },
    LLMCallCompleted {
        iteration: usize,
        /// Usage reported by the backend for this turn, if any.
        tokens_used: Option<TokenUsage>,
        response_length: usize,
    },
    /// A call was extracted from the model reply. `arguments` are already normalized.
    ToolCallDetected {
        tool_name: String,
        arguments: serde_json::Value,
        index: usize,
    },
    ToolExecutionCompleted {
        tool_name: String,
        is_error: bool,
        index: usize,
    },
    QueryCompleted {
        tool_calls_made: usize,
        response_length: usize,
    },
    /// The query ended early; `error` is the text that was published instead.
    QueryFailed { error: String },
}

/// Events emitted by the [`ToolRegistry`](crate::ToolRegistry).
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    Connected {
        provider: String,
        capabilities: Vec<String>,
    },
    /// A later provider advertised a name that was already in the catalog and
    /// now owns it.
    CapabilityReplaced {
        capability: String,
        previous_provider: String,
        provider: String,
    },
    ShutDown { provider: String },
}

/// Receives orchestrator and provider events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_orchestrator_event(&self, _event: &OrchestratorEvent) {}

    async fn on_provider_event(&self, _event: &ProviderEvent) {}
}
