// src/mcpchat/mod.rs

pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod event;
pub mod formatters;
pub mod http_client_pool;
#[cfg(feature = "http-server")]
pub mod http_server;
pub mod llm_session;
pub mod orchestrator;
pub mod session_state;
pub mod tool_call;
pub mod tool_protocol;
pub mod tool_protocols;
pub mod tool_registry;

// Let's explicitly export the core types so they don't have to be reached through
// their submodules.
pub use llm_session::LLMSession;
pub use orchestrator::Orchestrator;
pub use session_state::SessionState;
pub use tool_registry::ToolRegistry;
