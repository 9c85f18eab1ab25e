//! Per-query control loop.
//!
//! ```text
//! AwaitingModel → ExtractingCalls → NoCalls → Done
//!                                 → Dispatching → Analyzing → (next call) … → Done
//! ```
//!
//! One query runs to completion before the next starts: the conversation history is
//! mutated in place, so [`Orchestrator::process_query`] holds the session lock for the
//! whole query. Extracted calls are dispatched one at a time in the order the model
//! wrote them, and each call's analysis turn finishes before the next dispatch.
//!
//! Any failure ends the query with a readable error text that is published like a
//! normal response. History up to the failure stays in place and the next query
//! proceeds normally.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::RwLock;
//! use mcpchat::clients::ollama::OllamaClient;
//! use mcpchat::{ClientConfig, Orchestrator, ToolRegistry};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env();
//! let mut registry = ToolRegistry::new();
//! registry
//!     .connect(std::path::Path::new("packages/weather/build/index.js"), &config)
//!     .await?;
//!
//! let client = OllamaClient::new(&config.ollama_api_url, &config.ollama_model)?;
//! let orchestrator =
//!     Orchestrator::new(Arc::new(client), Arc::new(RwLock::new(registry))).await;
//! println!("{}", orchestrator.process_query("Weather in Paris?").await);
//! # Ok(())
//! # }
//! ```

use crate::mcpchat::client_wrapper::{ClientWrapper, Message};
use crate::mcpchat::event::{EventHandler, OrchestratorEvent};
use crate::mcpchat::formatters::format_tool_result;
use crate::mcpchat::llm_session::LLMSession;
use crate::mcpchat::session_state::SessionState;
use crate::mcpchat::tool_call::{normalize_arguments, CallExtractor, JsonBlockExtractor};
use crate::mcpchat::tool_registry::ToolRegistry;
use serde_json::Value as JsonValue;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

const NO_RESPONSE: &str = "No response";
const NO_ANALYSIS: &str = "No analysis provided.";

/// Drives queries through the model, the call extractor and the tool registry.
pub struct Orchestrator {
    session: Mutex<LLMSession>,
    registry: Arc<RwLock<ToolRegistry>>,
    extractor: Box<dyn CallExtractor>,
    state: Arc<SessionState>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl Orchestrator {
    /// Build an orchestrator whose session is primed with the registry's current
    /// catalog.
    pub async fn new(client: Arc<dyn ClientWrapper>, registry: Arc<RwLock<ToolRegistry>>) -> Self {
        let mut session = LLMSession::new(client);
        session.prime_system_prompt(registry.read().await.list_capabilities());
        Self {
            session: Mutex::new(session),
            registry,
            extractor: Box::new(JsonBlockExtractor),
            state: Arc::new(SessionState::new()),
            event_handler: None,
        }
    }

    /// Replace the call extraction strategy.
    pub fn with_extractor(mut self, extractor: Box<dyn CallExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Attach an event handler that receives [`OrchestratorEvent`]s.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    async fn emit(&self, event: OrchestratorEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_orchestrator_event(&event).await;
        }
    }

    /// Process one query and return the final response text.
    ///
    /// The result, successful or not, is also published to the [`SessionState`].
    /// Concurrent callers are served one at a time.
    pub async fn process_query(&self, query: &str) -> String {
        let mut session = self.session.lock().await;

        self.emit(OrchestratorEvent::QueryStarted {
            query_preview: query.chars().take(120).collect(),
        })
        .await;

        match self.run_query(&mut session, query).await {
            Ok((response, tool_calls_made)) => {
                self.state.publish(response.clone());
                self.emit(OrchestratorEvent::QueryCompleted {
                    tool_calls_made,
                    response_length: response.len(),
                })
                .await;
                response
            }
            Err(e) => {
                log::error!("Error processing query: {}", e);
                let message = format!("An error occurred while processing your query: {}", e);
                self.state.publish(message.clone());
                self.emit(OrchestratorEvent::QueryFailed {
                    error: message.clone(),
                })
                .await;
                message
            }
        }
    }

    async fn run_query(
        &self,
        session: &mut LLMSession,
        query: &str,
    ) -> Result<(String, usize), Box<dyn Error + Send + Sync>> {
        let reply = self.model_turn(session, 1, Some(query)).await?;
        let reply_text = non_empty_or(&reply.content, NO_RESPONSE);

        let Some(calls) = self.extractor.extract(&reply.content) else {
            return Ok((reply_text, 0));
        };
        log::info!(
            "Parsed tool calls: {:?}",
            calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
        );

        let call_count = calls.len();
        let mut final_response = format!("{}\n\n", reply_text);

        for (index, call) in calls.into_iter().enumerate() {
            let arguments = normalize_arguments(call.arguments);
            let arguments_json = JsonValue::Object(arguments.clone());
            final_response.push_str(&format!(
                "[Calling tool {} with args {}]\n",
                call.name, arguments_json
            ));
            self.emit(OrchestratorEvent::ToolCallDetected {
                tool_name: call.name.clone(),
                arguments: arguments_json,
                index,
            })
            .await;

            let result = {
                let registry = self.registry.read().await;
                registry.invoke(&call.name, arguments).await
            };
            self.emit(OrchestratorEvent::ToolExecutionCompleted {
                tool_name: call.name.clone(),
                is_error: result.is_error,
                index,
            })
            .await;

            let formatted = format_tool_result(&result);
            final_response.push_str(&format!("\nTool result:\n{}\n", formatted));

            session.inject_observation(format!(
                "Tool result from {}: {}\n\nAnalyze this result and provide insights.",
                call.name, formatted
            ));
            let analysis = self.model_turn(session, index + 2, None).await?;
            final_response.push_str(&format!(
                "\nAnalysis:\n{}",
                non_empty_or(&analysis.content, NO_ANALYSIS)
            ));
        }

        Ok((final_response, call_count))
    }

    /// One model turn: a user turn when `prompt` is given, otherwise a follow-up on
    /// the history as it stands.
    async fn model_turn(
        &self,
        session: &mut LLMSession,
        iteration: usize,
        prompt: Option<&str>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        self.emit(OrchestratorEvent::LLMCallStarted { iteration }).await;
        let reply = match prompt {
            Some(prompt) => session.send_turn(prompt).await?,
            None => session.follow_up().await?,
        };
        self.emit(OrchestratorEvent::LLMCallCompleted {
            iteration,
            tokens_used: session.last_usage().await,
            response_length: reply.content.len(),
        })
        .await;
        Ok(reply)
    }

    /// Clear the conversation and re-prime it with the registry's current catalog.
    /// Waits for an in-flight query to finish first.
    pub async fn reset(&self) {
        let mut session = self.session.lock().await;
        let registry = self.registry.read().await;
        session.reset();
        session.prime_system_prompt(registry.list_capabilities());
    }

    /// Snapshot of the conversation history. Waits for an in-flight query to finish.
    pub async fn history(&self) -> Vec<Message> {
        self.session.lock().await.history().to_vec()
    }

    /// Last published response (`""` before the first query).
    pub fn last_response(&self) -> String {
        self.state.last_response()
    }

    /// Receive every response published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.state.subscribe()
    }

    pub fn registry(&self) -> &Arc<RwLock<ToolRegistry>> {
        &self.registry
    }
}

fn non_empty_or(text: &str, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    }
}
