#![allow(dead_code)]

use async_trait::async_trait;
use mcpchat::client_wrapper::{ClientWrapper, Message, ModelError, Role};
use mcpchat::tool_protocol::{Arguments, CapabilityDescriptor, InvocationResult};
use mcpchat::tool_protocols::CustomToolProtocol;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Mock model that plays back canned replies in order, then answers "Done.".
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    call_count: AtomicUsize,
    /// History length of every request, in call order.
    seen_lengths: Mutex<Vec<usize>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<String, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            call_count: AtomicUsize::new(0),
            seen_lengths: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn seen_lengths(&self) -> Vec<usize> {
        self.seen_lengths.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ModelError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.seen_lengths.lock().unwrap().push(messages.len());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(content)) => Ok(Message {
                // the session must not trust the role the backend reports
                role: Role::User,
                content,
            }),
            Some(Err(e)) => Err(e),
            None => Ok(Message::assistant("Done.")),
        }
    }

    fn model_name(&self) -> &str {
        "mock-scripted"
    }
}

/// A fenced tool-call block asking for `name` with `arguments`.
pub fn tool_call_reply(prefix: &str, calls: &[(&str, serde_json::Value)]) -> String {
    let calls: Vec<serde_json::Value> = calls
        .iter()
        .map(|(name, arguments)| serde_json::json!({"name": name, "arguments": arguments}))
        .collect();
    format!(
        "{}\n```json\n{}\n```",
        prefix,
        serde_json::json!({ "tool_calls": calls })
    )
}

/// In-process provider with an `echo` capability that records what it received.
pub async fn echo_provider() -> (Arc<CustomToolProtocol>, Arc<Mutex<Vec<Arguments>>>) {
    let received: Arc<Mutex<Vec<Arguments>>> = Arc::new(Mutex::new(Vec::new()));
    let protocol = Arc::new(CustomToolProtocol::new());
    let sink = received.clone();
    protocol
        .register_tool(
            CapabilityDescriptor::new("echo", "Returns its msg argument").with_input_schema(
                serde_json::json!({
                    "type": "object",
                    "properties": {"msg": {"type": "number"}},
                    "required": ["msg"]
                }),
            ),
            Arc::new(move |args: Arguments| {
                sink.lock().unwrap().push(args.clone());
                let msg = args.get("msg").cloned().unwrap_or_default();
                Ok(InvocationResult::text(match msg {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }))
            }),
        )
        .await;
    (protocol, received)
}
