//! # mcpchat
//!
//! mcpchat connects a local chat model to capability providers that speak the Model
//! Context Protocol over stdio. The model is told which capabilities exist; when its
//! reply contains a `tool_calls` block the calls are dispatched to the providers, the
//! results are fed back to the model for analysis, and the combined transcript is
//! returned to whoever asked.
//!
//! The crate is layered as follows:
//!
//! * **Model access**: the [`ClientWrapper`] trait and the Ollama implementation in
//!   [`clients::ollama`].
//! * **Conversation**: [`LLMSession`] holds the history and renders the capability
//!   catalog into the system prompt.
//! * **Providers**: [`tool_protocol::ToolProtocol`] is the connection seam.
//!   [`tool_protocols::McpStdioProtocol`] launches `.js`/`.py` provider scripts and
//!   [`tool_protocols::CustomToolProtocol`] registers Rust closures.
//! * **Routing**: [`ToolRegistry`] merges every provider's capabilities into one catalog
//!   and routes invocations by name.
//! * **Control loop**: [`Orchestrator`] drives one query at a time through the model,
//!   the [`tool_call`] extractor and the registry, publishing each result to a
//!   [`SessionState`].
//! * **Front ends**: the `mcpchat` binary (terminal) and, with the `http-server`
//!   feature, the HTTP façade in `http_server`.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::RwLock;
//! use mcpchat::clients::ollama::OllamaClient;
//! use mcpchat::tool_protocol::{CapabilityDescriptor, InvocationResult};
//! use mcpchat::tool_protocols::CustomToolProtocol;
//! use mcpchat::{ClientConfig, Orchestrator, ToolRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     mcpchat::init_logger();
//!     let config = ClientConfig::from_env();
//!
//!     let local = Arc::new(CustomToolProtocol::new());
//!     local
//!         .register_tool(
//!             CapabilityDescriptor::new("echo", "Returns its msg argument"),
//!             Arc::new(|args| Ok(InvocationResult::text(args["msg"].to_string()))),
//!         )
//!         .await;
//!
//!     let mut registry = ToolRegistry::new();
//!     registry.add_protocol("local", local).await?;
//!
//!     let client = OllamaClient::new(&config.ollama_api_url, &config.ollama_model)?;
//!     let orchestrator =
//!         Orchestrator::new(Arc::new(client), Arc::new(RwLock::new(registry))).await;
//!
//!     println!("{}", orchestrator.process_query("Echo 5 back to me").await);
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Defaults to `info` when `RUST_LOG` is unset.
///
/// ```rust
/// mcpchat::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .init();
    });
}

// Import the top-level `mcpchat` module.
pub mod mcpchat;

// Re-exporting key items for easier external access.
pub use mcpchat::client_wrapper;
pub use mcpchat::client_wrapper::{ClientWrapper, Message, ModelError, Role, TokenUsage};
pub use mcpchat::clients;
pub use mcpchat::config;
pub use mcpchat::config::ClientConfig;
pub use mcpchat::event;
pub use mcpchat::event::{EventHandler, OrchestratorEvent, ProviderEvent};
pub use mcpchat::formatters;
#[cfg(feature = "http-server")]
pub use mcpchat::http_server;
pub use mcpchat::llm_session::LLMSession;
pub use mcpchat::orchestrator::Orchestrator;
pub use mcpchat::session_state::SessionState;
pub use mcpchat::tool_call;
pub use mcpchat::tool_protocol;
pub use mcpchat::tool_protocols;
pub use mcpchat::tool_registry::ToolRegistry;
