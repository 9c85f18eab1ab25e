//! HTTP Client Pool for maintaining persistent connections to model backends.
//!
//! Every query issues at least two model calls against the same base URL, so each
//! base URL gets one configured `reqwest::Client` that is reused for the lifetime of
//! the process instead of paying connection setup on every turn.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::time::Duration;

/// Global cache of HTTP clients indexed by base URL.
static CLIENT_POOL: Lazy<DashMap<String, reqwest::Client>> = Lazy::new(DashMap::new);

/// Creates or retrieves a shared HTTP client for the given base URL.
///
/// Local model servers can take minutes on a cold model load, so the pooled clients
/// carry no overall request timeout; callers bound individual requests instead.
pub fn get_or_create_client(base_url: &str) -> Result<reqwest::Client, reqwest::Error> {
    if let Some(client) = CLIENT_POOL.get(base_url) {
        return Ok(client.clone());
    }
    let client = create_pooled_client()?;
    Ok(CLIENT_POOL
        .entry(base_url.to_string())
        .or_insert(client)
        .clone())
}

/// Creates a new reqwest client with connection pooling settings.
///
/// - `pool_max_idle_per_host(16)`: a single orchestrator never needs more
/// - `pool_idle_timeout(90s)`: keeps connections alive between queries
/// - `tcp_keepalive(60s)`
/// - `connect_timeout(10s)`: an unreachable backend fails fast
fn create_pooled_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(10))
        .build()
}
