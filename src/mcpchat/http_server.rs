//! HTTP façade for the web UI.
//!
//! | Method | Path        | Behavior                                                      |
//! |--------|-------------|---------------------------------------------------------------|
//! | GET    | `/response` | `{"response": <last published response>}`                     |
//! | POST   | `/query`    | body `{"query": "..."}`, answers `{"success": true, "response"}` |
//! | OPTIONS| any         | `204`, CORS headers only                                      |
//! | other  | any         | `404 Not Found`                                               |
//!
//! Every response carries permissive CORS headers. A query submitted here goes through
//! the same [`Orchestrator`] as the terminal, so the two front ends share one
//! conversation; `quit` sent over HTTP is an ordinary query. A query runs to completion
//! and is published even when the client disconnects before the answer is ready.

use crate::mcpchat::orchestrator::Orchestrator;
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value as JsonValue};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Build the router. Exposed separately from [`serve`] so it can be driven in-process.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/response", get(get_response))
        .route("/query", post(post_query))
        .fallback(not_found)
        .layer(middleware::from_fn(cors))
        .with_state(orchestrator)
}

/// Bind `0.0.0.0:port`.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port)).await
}

/// Serve requests on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    orchestrator: Arc<Orchestrator>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    log::info!("HTTP server running on {}", listener.local_addr()?);
    axum::serve(listener, router(orchestrator))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn get_response(State(orchestrator): State<Arc<Orchestrator>>) -> Response {
    Json(json!({ "response": orchestrator.last_response() })).into_response()
}

async fn post_query(State(orchestrator): State<Arc<Orchestrator>>, body: Bytes) -> Response {
    // malformed bodies answer 500 with details instead of the extractor rejection
    let payload: JsonValue = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            log::error!("Error processing HTTP query: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to process query",
                    "details": e.to_string(),
                })),
            )
                .into_response();
        }
    };

    let query = match payload.get("query").and_then(JsonValue::as_str) {
        Some(query) if !query.is_empty() => query.to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Query is required" })),
            )
                .into_response();
        }
    };

    log::info!("Received query via HTTP: {}", query);
    // detached: a client that hangs up must not cancel a query half way through
    let task = tokio::spawn(async move { orchestrator.process_query(&query).await });
    match task.await {
        Ok(response) => Json(json!({ "success": true, "response": response })).into_response(),
        Err(e) => {
            log::error!("Query task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to process query",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
