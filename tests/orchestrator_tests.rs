//! End-to-end tests of the query loop with a scripted model and in-process providers.

mod common;

use async_trait::async_trait;
use common::{echo_provider, tool_call_reply, ScriptedClient};
use mcpchat::client_wrapper::{ModelError, Role};
use mcpchat::event::{EventHandler, OrchestratorEvent};
use mcpchat::tool_protocol::{CapabilityDescriptor, ToolError};
use mcpchat::tool_call::{CallExtractor, ToolCall};
use mcpchat::tool_protocols::CustomToolProtocol;
use mcpchat::{Orchestrator, ToolRegistry};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

async fn orchestrator_with_echo(client: Arc<ScriptedClient>) -> Orchestrator {
    let (echo, _) = echo_provider().await;
    let mut registry = ToolRegistry::new();
    registry.add_protocol("echo-provider", echo).await.unwrap();
    Orchestrator::new(client, Arc::new(RwLock::new(registry))).await
}

#[tokio::test]
async fn tool_call_is_dispatched_and_analyzed() {
    let (echo, received) = echo_provider().await;
    let mut registry = ToolRegistry::new();
    registry.add_protocol("echo-provider", echo).await.unwrap();

    let call = tool_call_reply("Let me echo that.", &[("echo", json!({"msg": "5"}))]);
    let client = Arc::new(ScriptedClient::replying(&[call.as_str(), "The tool echoed 5."]));
    let orchestrator = Orchestrator::new(client.clone(), Arc::new(RwLock::new(registry))).await;

    let response = orchestrator.process_query("Echo 5").await;

    // numeric strings reach the provider as numbers
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(
        serde_json::Value::Object(received.lock().unwrap()[0].clone()),
        json!({"msg": 5})
    );

    let expected = format!(
        "{}\n\n[Calling tool echo with args {{\"msg\":5}}]\n\nTool result:\n5\n\nAnalysis:\nThe tool echoed 5.",
        call
    );
    assert_eq!(response, expected);
    assert!(response.contains("Calling tool echo"));
    assert_eq!(orchestrator.last_response(), response);
    assert_eq!(client.calls(), 2);

    let history = orchestrator.history().await;
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::System, Role::Assistant]
    );
    assert!(history[0].content.contains("Tool: echo"));
    assert!(history[3].content.starts_with("Tool result from echo: 5"));
    assert_eq!(history[4].content, "The tool echoed 5.");
}

#[tokio::test]
async fn plain_reply_is_returned_unchanged() {
    let client = Arc::new(ScriptedClient::replying(&["It is sunny in Paris."]));
    let orchestrator = orchestrator_with_echo(client.clone()).await;

    let response = orchestrator.process_query("Weather in Paris?").await;

    assert_eq!(response, "It is sunny in Paris.");
    assert_eq!(orchestrator.history().await.len(), 3);
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn each_call_adds_observation_and_analysis() {
    let call = tool_call_reply(
        "Two calls.",
        &[("echo", json!({"msg": "1"})), ("echo", json!({"msg": "2"}))],
    );
    let client = Arc::new(ScriptedClient::replying(&[call.as_str(), "first", "second"]));
    let orchestrator = orchestrator_with_echo(client.clone()).await;

    let response = orchestrator.process_query("Echo twice").await;

    // 3 for the query turn, +2 per dispatched call
    assert_eq!(orchestrator.history().await.len(), 7);
    assert_eq!(client.seen_lengths(), vec![2, 4, 6]);

    let first = response.find("[Calling tool echo with args {\"msg\":1}]").unwrap();
    let first_analysis = response.find("Analysis:\nfirst").unwrap();
    let second = response.find("[Calling tool echo with args {\"msg\":2}]").unwrap();
    let second_analysis = response.find("Analysis:\nsecond").unwrap();
    assert!(first < first_analysis && first_analysis < second && second < second_analysis);
}

#[tokio::test]
async fn unknown_capability_is_reported_and_analyzed() {
    let call = tool_call_reply("Trying.", &[("weather", json!({"city": "Paris"}))]);
    let client = Arc::new(ScriptedClient::replying(&[call.as_str(), "That tool does not exist."]));
    let orchestrator = orchestrator_with_echo(client).await;

    let response = orchestrator.process_query("Weather?").await;

    assert!(response.contains("\nTool result:\nTool \"weather\" not found.\n"));
    assert!(response.ends_with("\nAnalysis:\nThat tool does not exist."));
    let history = orchestrator.history().await;
    assert!(history[3].content.contains("Tool \"weather\" not found."));
}

#[tokio::test]
async fn transport_failure_does_not_end_the_session() {
    let flaky = Arc::new(CustomToolProtocol::new());
    flaky
        .register_tool(
            CapabilityDescriptor::new("flaky", "Always loses its pipe"),
            Arc::new(|_| Err(ToolError::InvocationTransport("pipe closed".into()))),
        )
        .await;
    let (echo, _) = echo_provider().await;
    let mut registry = ToolRegistry::new();
    registry.add_protocol("flaky-provider", flaky).await.unwrap();
    registry.add_protocol("echo-provider", echo).await.unwrap();

    let flaky_call = tool_call_reply("", &[("flaky", json!({}))]);
    let echo_call = tool_call_reply("", &[("echo", json!({"msg": "ok"}))]);
    let client = Arc::new(ScriptedClient::replying(&[
        flaky_call.as_str(),
        "It failed.",
        echo_call.as_str(),
        "It worked.",
    ]));
    let orchestrator = Orchestrator::new(client, Arc::new(RwLock::new(registry))).await;

    let first = orchestrator.process_query("Try flaky").await;
    assert!(first.contains("Error calling tool \"flaky\": Invocation failed: pipe closed"));

    let second = orchestrator.process_query("Try echo").await;
    assert!(second.contains("\nTool result:\nok\n"));
    assert_eq!(orchestrator.registry().read().await.provider_count(), 2);
}

#[tokio::test]
async fn backend_error_is_published_and_next_query_proceeds() {
    let client = Arc::new(ScriptedClient::new(vec![
        Err(ModelError::Backend {
            status: 500,
            body: "out of memory".into(),
        }),
        Ok("Recovered.".into()),
    ]));
    let orchestrator = orchestrator_with_echo(client).await;

    let failed = orchestrator.process_query("First").await;
    assert_eq!(
        failed,
        "An error occurred while processing your query: Model backend error: 500 out of memory"
    );
    assert_eq!(orchestrator.last_response(), failed);

    // the user turn stays in history, no assistant message was added
    let history = orchestrator.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::User);

    assert_eq!(orchestrator.process_query("Second").await, "Recovered.");
    assert_eq!(orchestrator.history().await.len(), 4);
}

#[tokio::test]
async fn failed_analysis_turn_ends_the_query() {
    let call = tool_call_reply("Calling.", &[("echo", json!({"msg": "7"}))]);
    let client = Arc::new(ScriptedClient::new(vec![
        Ok(call),
        Err(ModelError::Transport("connection reset".into())),
    ]));
    let orchestrator = orchestrator_with_echo(client).await;

    let response = orchestrator.process_query("Echo 7").await;
    assert_eq!(
        response,
        "An error occurred while processing your query: Model backend unreachable: connection reset"
    );
    // system, user, assistant, observation
    assert_eq!(orchestrator.history().await.len(), 4);
}

#[tokio::test]
async fn empty_replies_get_placeholders() {
    let client = Arc::new(ScriptedClient::replying(&[""]));
    let orchestrator = orchestrator_with_echo(client).await;
    assert_eq!(orchestrator.process_query("Anything?").await, "No response");

    let call = tool_call_reply("", &[("echo", json!({"msg": "x"}))]);
    let client = Arc::new(ScriptedClient::replying(&[call.as_str(), "   "]));
    let orchestrator = orchestrator_with_echo(client).await;
    let response = orchestrator.process_query("Echo x").await;
    assert!(response.ends_with("\nAnalysis:\nNo analysis provided."));
}

#[tokio::test]
async fn subscribers_see_every_published_response() {
    let client = Arc::new(ScriptedClient::replying(&["one", "two"]));
    let orchestrator = orchestrator_with_echo(client).await;
    let mut updates = orchestrator.subscribe();

    assert_eq!(orchestrator.last_response(), "");
    orchestrator.process_query("1").await;
    orchestrator.process_query("2").await;

    assert_eq!(updates.recv().await.unwrap(), "one");
    assert_eq!(updates.recv().await.unwrap(), "two");
    assert_eq!(orchestrator.last_response(), "two");
}

#[tokio::test]
async fn quit_is_an_ordinary_query() {
    let client = Arc::new(ScriptedClient::replying(&["Goodbye is not my job."]));
    let orchestrator = orchestrator_with_echo(client.clone()).await;

    let response = orchestrator.process_query("quit").await;
    assert_eq!(response, "Goodbye is not my job.");
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn reset_keeps_only_the_system_prompt() {
    let client = Arc::new(ScriptedClient::replying(&["hello"]));
    let orchestrator = orchestrator_with_echo(client).await;
    orchestrator.process_query("hi").await;
    assert_eq!(orchestrator.history().await.len(), 3);

    orchestrator.reset().await;
    let history = orchestrator.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::System);
    assert!(history[0].content.contains("Tool: echo"));
}

#[tokio::test]
async fn concurrent_queries_do_not_interleave() {
    let client = Arc::new(ScriptedClient::replying(&["a", "b", "c", "d"]));
    let orchestrator = Arc::new(orchestrator_with_echo(client.clone()).await);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.process_query(&format!("q{}", i)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    // each request saw the previous query fully recorded
    assert_eq!(client.seen_lengths(), vec![2, 4, 6, 8]);
    let history = orchestrator.history().await;
    for pair in history[1..].chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
    }
}

struct Recorder {
    events: Mutex<Vec<OrchestratorEvent>>,
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_orchestrator_event(&self, event: &OrchestratorEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn events_follow_the_query_lifecycle() {
    let call = tool_call_reply("", &[("echo", json!({"msg": "3"}))]);
    let client = Arc::new(ScriptedClient::replying(&[call.as_str(), "three"]));
    let recorder = Arc::new(Recorder {
        events: Mutex::new(Vec::new()),
    });
    let orchestrator = orchestrator_with_echo(client)
        .await
        .with_event_handler(recorder.clone());

    orchestrator.process_query("Echo 3").await;

    let events = recorder.events.lock().unwrap();
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            OrchestratorEvent::QueryStarted { .. } => "query_started",
            OrchestratorEvent::LLMCallStarted { .. } => "llm_started",
            OrchestratorEvent::LLMCallCompleted { .. } => "llm_completed",
            OrchestratorEvent::ToolCallDetected { .. } => "tool_detected",
            OrchestratorEvent::ToolExecutionCompleted { .. } => "tool_completed",
            OrchestratorEvent::QueryCompleted { .. } => "query_completed",
            OrchestratorEvent::QueryFailed { .. } => "query_failed",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "query_started",
            "llm_started",
            "llm_completed",
            "tool_detected",
            "tool_completed",
            "llm_started",
            "llm_completed",
            "query_completed",
        ]
    );
    match &events[3] {
        OrchestratorEvent::ToolCallDetected { arguments, .. } => {
            assert_eq!(arguments, &json!({"msg": 3}))
        }
        other => panic!("unexpected event {:?}", other),
    }
    match &events[7] {
        OrchestratorEvent::QueryCompleted {
            tool_calls_made, ..
        } => assert_eq!(*tool_calls_made, 1),
        other => panic!("unexpected event {:?}", other),
    }
}

/// Treats `echo: <text>` replies as a call to the echo tool.
struct PrefixExtractor;

impl CallExtractor for PrefixExtractor {
    fn extract(&self, model_text: &str) -> Option<Vec<ToolCall>> {
        let msg = model_text.trim().strip_prefix("echo:")?.trim();
        let mut arguments = mcpchat::tool_protocol::Arguments::new();
        arguments.insert("msg".into(), json!(msg));
        Some(vec![ToolCall {
            name: "echo".into(),
            arguments,
        }])
    }
}

#[tokio::test]
async fn custom_extractor_replaces_the_json_format() {
    let (echo, received) = echo_provider().await;
    let mut registry = ToolRegistry::new();
    registry.add_protocol("echo-provider", echo).await.unwrap();

    let fenced = tool_call_reply("", &[("echo", json!({"msg": "1"}))]);
    let client = Arc::new(ScriptedClient::replying(&[
        fenced.as_str(),
        "echo: 7",
        "seven",
    ]));
    let orchestrator = Orchestrator::new(client.clone(), Arc::new(RwLock::new(registry)))
        .await
        .with_extractor(Box::new(PrefixExtractor));

    // the default JSON block format no longer triggers calls
    let plain = orchestrator.process_query("first").await;
    assert_eq!(plain, fenced);
    assert!(received.lock().unwrap().is_empty());

    let response = orchestrator.process_query("second").await;
    assert_eq!(
        response,
        "echo: 7\n\n[Calling tool echo with args {\"msg\":7}]\n\nTool result:\n7\n\nAnalysis:\nseven"
    );
    assert_eq!(
        serde_json::Value::Object(received.lock().unwrap()[0].clone()),
        json!({"msg": 7})
    );
    assert_eq!(client.calls(), 3);
}
