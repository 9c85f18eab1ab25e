//! Configuration for mcpchat.
//!
//! Provides the [`ClientConfig`] struct. Users construct it manually or start from
//! [`ClientConfig::from_env`], which layers the recognised environment variables over
//! the defaults. No config-file parsing dependencies are involved.
//!
//! # Example
//!
//! ```rust
//! use mcpchat::ClientConfig;
//!
//! let config = ClientConfig {
//!     ollama_model: "qwen2.5:7b".to_string(),
//!     ..ClientConfig::default()
//! };
//! assert_eq!(config.http_port, 3000);
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the model backend base URL.
pub const ENV_OLLAMA_API_URL: &str = "OLLAMA_API_URL";
/// Environment variable holding the model identifier.
pub const ENV_OLLAMA_MODEL: &str = "OLLAMA_MODEL";
/// Environment variable holding the HTTP listen port.
pub const ENV_HTTP_PORT: &str = "MCPCHAT_PORT";
/// Environment variable holding the request timeout in seconds.
pub const ENV_REQUEST_TIMEOUT: &str = "MCPCHAT_REQUEST_TIMEOUT_SECS";

/// Runtime configuration shared by the model client, the provider connections
/// and the HTTP façade.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Ollama server, without the `/api/chat` suffix.
    pub ollama_api_url: String,
    /// Model identifier sent with every chat request.
    pub ollama_model: String,
    /// Name announced to capability providers during the handshake.
    pub client_name: String,
    /// Version announced to capability providers during the handshake.
    pub client_version: String,
    /// Port the HTTP façade listens on.
    pub http_port: u16,
    /// Upper bound for a single model call or provider request.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ollama_api_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2:3b".to_string(),
            client_name: "mcp-client-cli".to_string(),
            client_version: "1.0.0".to_string(),
            http_port: 3000,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by whichever of `OLLAMA_API_URL`, `OLLAMA_MODEL`,
    /// `MCPCHAT_PORT` and `MCPCHAT_REQUEST_TIMEOUT_SECS` are set.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_OLLAMA_API_URL).filter(|v| !v.is_empty()) {
            config.ollama_api_url = url;
        }
        if let Some(model) = lookup(ENV_OLLAMA_MODEL).filter(|v| !v.is_empty()) {
            config.ollama_model = model;
        }
        if let Some(port) = lookup(ENV_HTTP_PORT) {
            match port.parse() {
                Ok(port) => config.http_port = port,
                Err(_) => log::warn!("Ignoring invalid {}={}", ENV_HTTP_PORT, port),
            }
        }
        if let Some(secs) = lookup(ENV_REQUEST_TIMEOUT) {
            match secs.parse() {
                Ok(secs) => config.request_timeout = Duration::from_secs(secs),
                Err(_) => log::warn!("Ignoring invalid {}={}", ENV_REQUEST_TIMEOUT, secs),
            }
        }
        config
    }
}

/// Resolve the provider paths named by `path`.
///
/// A file is returned as-is. A directory is scanned one level deep for provider
/// bundles laid out as `<dir>/<provider>/build/index.js`; the result is sorted so
/// catalog order is stable between runs.
pub fn discover_provider_paths(path: &Path) -> io::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let candidate = entry.path().join("build").join("index.js");
        if candidate.is_file() {
            found.push(candidate);
        }
    }
    found.sort();
    Ok(found)
}
