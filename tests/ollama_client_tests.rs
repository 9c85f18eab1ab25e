//! Exercises the Ollama client against a throwaway local HTTP server.
#![cfg(feature = "http-server")]

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use mcpchat::client_wrapper::{ClientWrapper, Message, ModelError, Role, TokenUsage};
use mcpchat::clients::ollama::OllamaClient;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Captured = Arc<Mutex<Vec<Value>>>;

async fn spawn_backend(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn chat_ok(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
    captured.lock().unwrap().push(body);
    Json(json!({
        "model": "llama3.2:3b",
        "created_at": "2024-11-05T10:00:00Z",
        "message": {"role": "assistant", "content": "Hello from the model."},
        "done": true,
        "prompt_eval_count": 26,
        "eval_count": 7
    }))
}

#[tokio::test]
async fn chat_reply_and_usage_are_returned() {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/api/chat", post(chat_ok))
        .with_state(captured.clone());
    let base_url = spawn_backend(app).await;

    let client = OllamaClient::new(&format!("{}/", base_url), "llama3.2:3b")
        .unwrap()
        .with_timeout(Duration::from_secs(5));
    assert!(client.get_last_usage().await.is_none());

    let reply = client
        .send_message(&[Message::system("Be brief."), Message::user("Hi")])
        .await
        .unwrap();
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "Hello from the model.");
    assert_eq!(
        client.get_last_usage().await,
        Some(TokenUsage {
            input_tokens: 26,
            output_tokens: 7,
            total_tokens: 33,
        })
    );

    let requests = captured.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0],
        json!({
            "model": "llama3.2:3b",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hi"}
            ],
            "stream": false
        })
    );
}

#[tokio::test]
async fn non_success_status_is_a_backend_error() {
    let app = Router::new().route(
        "/api/chat",
        post(|| async {
            (
                StatusCode::NOT_FOUND,
                "{\"error\":\"model 'missing' not found\"}",
            )
                .into_response()
        }),
    );
    let base_url = spawn_backend(app).await;
    let client = OllamaClient::new(&base_url, "missing").unwrap();

    let err = client.send_message(&[Message::user("Hi")]).await.unwrap_err();
    match err {
        ModelError::Backend { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("model 'missing' not found"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn reply_without_message_is_invalid() {
    let app = Router::new().route(
        "/api/chat",
        post(|| async { Json(json!({"done": true})) }),
    );
    let base_url = spawn_backend(app).await;
    let client = OllamaClient::new(&base_url, "llama3.2:3b").unwrap();

    let err = client.send_message(&[Message::user("Hi")]).await.unwrap_err();
    assert!(matches!(err, ModelError::InvalidResponse(_)));
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    // bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = OllamaClient::new(&format!("http://{}", addr), "llama3.2:3b")
        .unwrap()
        .with_timeout(Duration::from_secs(5));
    let err = client.send_message(&[Message::user("Hi")]).await.unwrap_err();
    assert!(matches!(err, ModelError::Transport(_)));
}
