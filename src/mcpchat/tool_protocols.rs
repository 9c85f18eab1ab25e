//! Tool Protocol Implementations
//!
//! Concrete [`ToolProtocol`] implementations:
//!
//! - **McpStdioProtocol**: an MCP server running as a child process, spoken to with
//!   newline-delimited JSON-RPC over its stdin/stdout
//! - **CustomToolProtocol**: Rust closures (sync and async) registered in-process
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = ToolRegistry::new();
//! registry.connect(Path::new("packages/weather/build/index.js"), &config).await?;
//! registry.add_protocol("local", Arc::new(CustomToolProtocol::new())).await?;
//! ```

use crate::mcpchat::config::ClientConfig;
use crate::mcpchat::tool_protocol::{
    Arguments, CapabilityDescriptor, InvocationContent, InvocationResult, ToolError, ToolProtocol,
};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, RwLock};

/// MCP protocol revision announced during the handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Type alias for synchronous tool functions exposed via the custom adapter.
pub type ToolFunction =
    Arc<dyn Fn(Arguments) -> Result<InvocationResult, ToolError> + Send + Sync>;

/// Type alias for asynchronous tool functions exposed via the custom adapter.
pub type AsyncToolFunction = Arc<
    dyn Fn(
            Arguments,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<InvocationResult, ToolError>> + Send>,
        > + Send
        + Sync,
>;

/// Custom function-calling tool adapter
///
/// Registers Rust functions as capabilities. Useful for in-process providers and
/// for exercising the orchestrator without spawning processes.
///
/// # Example
///
/// ```rust,no_run
/// use mcpchat::tool_protocols::CustomToolProtocol;
/// use mcpchat::tool_protocol::{CapabilityDescriptor, InvocationResult};
/// use std::sync::Arc;
///
/// # async {
/// let adapter = CustomToolProtocol::new();
/// adapter
///     .register_tool(
///         CapabilityDescriptor::new("echo", "Returns its msg argument"),
///         Arc::new(|args| Ok(InvocationResult::text(args["msg"].to_string()))),
///     )
///     .await;
/// # };
/// ```
pub struct CustomToolProtocol {
    tools: Arc<RwLock<Vec<CapabilityDescriptor>>>,
    sync_functions: Arc<RwLock<HashMap<String, ToolFunction>>>,
    async_functions: Arc<RwLock<HashMap<String, AsyncToolFunction>>>,
}

impl CustomToolProtocol {
    /// Create an empty adapter ready to accept new tool registrations.
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(Vec::new())),
            sync_functions: Arc::new(RwLock::new(HashMap::new())),
            async_functions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a synchronous tool function.
    ///
    /// Subsequent calls will overwrite any existing tool with the same name.
    pub async fn register_tool(&self, descriptor: CapabilityDescriptor, function: ToolFunction) {
        let name = descriptor.name.clone();
        self.upsert_descriptor(descriptor).await;
        self.async_functions.write().await.remove(&name);
        self.sync_functions.write().await.insert(name, function);
    }

    /// Register an asynchronous tool function.
    pub async fn register_async_tool(
        &self,
        descriptor: CapabilityDescriptor,
        function: AsyncToolFunction,
    ) {
        let name = descriptor.name.clone();
        self.upsert_descriptor(descriptor).await;
        self.sync_functions.write().await.remove(&name);
        self.async_functions.write().await.insert(name, function);
    }

    /// Remove a tool from the adapter.
    pub async fn unregister_tool(&self, name: &str) {
        self.tools.write().await.retain(|t| t.name != name);
        self.sync_functions.write().await.remove(name);
        self.async_functions.write().await.remove(name);
    }

    async fn upsert_descriptor(&self, descriptor: CapabilityDescriptor) {
        let mut tools = self.tools.write().await;
        match tools.iter_mut().find(|t| t.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => tools.push(descriptor),
        }
    }
}

impl Default for CustomToolProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProtocol for CustomToolProtocol {
    async fn list_tools(&self) -> Result<Vec<CapabilityDescriptor>, ToolError> {
        Ok(self.tools.read().await.clone())
    }

    async fn execute(
        &self,
        tool_name: &str,
        arguments: Arguments,
    ) -> Result<InvocationResult, ToolError> {
        // Try async functions first
        let async_func = self.async_functions.read().await.get(tool_name).cloned();
        if let Some(func) = async_func {
            return func(arguments).await;
        }

        let sync_func = self.sync_functions.read().await.get(tool_name).cloned();
        if let Some(func) = sync_func {
            return func(arguments);
        }

        Err(ToolError::UnknownCapability(tool_name.to_string()))
    }

    fn protocol_name(&self) -> &str {
        "custom"
    }
}

/// Runtime used to launch a provider script, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRuntime {
    Node,
    Python,
}

impl ProviderRuntime {
    /// `.js` runs under node, `.py` under python; anything else is rejected.
    pub fn for_path(path: &Path) -> Result<Self, ToolError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("js") => Ok(ProviderRuntime::Node),
            Some("py") => Ok(ProviderRuntime::Python),
            _ => Err(ToolError::UnsupportedProviderKind(
                path.display().to_string(),
            )),
        }
    }

    /// Interpreter executable.
    pub fn command(&self) -> &'static str {
        match self {
            ProviderRuntime::Node => "node",
            ProviderRuntime::Python if cfg!(windows) => "python",
            ProviderRuntime::Python => "python3",
        }
    }
}

/// Live pipes to a provider process.
struct StdioChannel {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl StdioChannel {
    async fn write_message(&mut self, message: &JsonValue) -> Result<(), ToolError> {
        let mut line = serde_json::to_vec(message)
            .map_err(|e| ToolError::Protocol(format!("cannot encode request: {}", e)))?;
        line.push(b'\n');
        self.stdin
            .write_all(&line)
            .await
            .map_err(|e| ToolError::InvocationTransport(format!("write failed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| ToolError::InvocationTransport(format!("write failed: {}", e)))
    }

    async fn notify(&mut self, method: &str) -> Result<(), ToolError> {
        self.write_message(&json!({"jsonrpc": "2.0", "method": method}))
            .await
    }

    /// Send one request and wait for the response carrying its id.
    async fn request(
        &mut self,
        method: &str,
        params: JsonValue,
        timeout: Duration,
    ) -> Result<JsonValue, ToolError> {
        self.next_id += 1;
        let id = self.next_id;
        self.write_message(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        match tokio::time::timeout(timeout, self.read_response(id)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::InvocationTransport(format!(
                "{} timed out after {}s",
                method,
                timeout.as_secs()
            ))),
        }
    }

    async fn read_response(&mut self, id: u64) -> Result<JsonValue, ToolError> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| ToolError::InvocationTransport(format!("read failed: {}", e)))?
                .ok_or_else(|| {
                    ToolError::InvocationTransport("provider closed its output".to_string())
                })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let message: JsonValue = match serde_json::from_str(line) {
                Ok(message) => message,
                Err(_) => {
                    log::debug!("Skipping non-JSON provider output: {}", line);
                    continue;
                }
            };
            if message.get("id").and_then(JsonValue::as_u64) != Some(id)
                || message.get("method").is_some()
            {
                log::debug!("Skipping unrelated provider message: {}", message);
                continue;
            }
            if let Some(error) = message.get("error") {
                let detail = error
                    .get("message")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("unknown error");
                return Err(ToolError::InvocationTransport(format!(
                    "provider returned error: {}",
                    detail
                )));
            }
            return Ok(message.get("result").cloned().unwrap_or(JsonValue::Null));
        }
    }
}

/// MCP server running as a child process.
///
/// The process is started and the capability handshake performed by
/// [`McpStdioProtocol::spawn`]; it lives until [`ToolProtocol::shutdown`] is called
/// or the protocol is dropped.
pub struct McpStdioProtocol {
    path: PathBuf,
    tools: Vec<CapabilityDescriptor>,
    channel: Mutex<Option<StdioChannel>>,
    timeout: Duration,
}

impl McpStdioProtocol {
    /// Launch the provider at `path` and complete the MCP handshake.
    ///
    /// Fails with [`ToolError::UnsupportedProviderKind`] for unknown extensions and
    /// [`ToolError::ProviderUnreachable`] when the process cannot be started or does
    /// not answer the handshake.
    pub async fn spawn(path: &Path, config: &ClientConfig) -> Result<Self, ToolError> {
        let runtime = ProviderRuntime::for_path(path)?;
        let unreachable =
            |e: ToolError| ToolError::ProviderUnreachable(format!("{}: {}", path.display(), e));

        let mut child = Command::new(runtime.command())
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ToolError::ProviderUnreachable(format!(
                    "{}: failed to start {}: {}",
                    path.display(),
                    runtime.command(),
                    e
                ))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            ToolError::ProviderUnreachable(format!("{}: stdin unavailable", path.display()))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ToolError::ProviderUnreachable(format!("{}: stdout unavailable", path.display()))
        })?;

        let mut channel = StdioChannel {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
        };

        let tools = match handshake(&mut channel, config).await {
            Ok(tools) => tools,
            Err(e) => {
                let _ = channel.child.kill().await;
                return Err(unreachable(e));
            }
        };

        log::info!(
            "Loaded tools from {}: {:?}",
            path.display(),
            tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            path: path.to_path_buf(),
            tools,
            channel: Mutex::new(Some(channel)),
            timeout: config.request_timeout,
        })
    }

    /// Path of the provider script this connection was started from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn handshake(
    channel: &mut StdioChannel,
    config: &ClientConfig,
) -> Result<Vec<CapabilityDescriptor>, ToolError> {
    let timeout = config.request_timeout;
    channel
        .request(
            "initialize",
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": config.client_name,
                    "version": config.client_version,
                },
            }),
            timeout,
        )
        .await?;
    channel.notify("notifications/initialized").await?;

    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let params = match &cursor {
            Some(cursor) => json!({"cursor": cursor}),
            None => json!({}),
        };
        let page = channel.request("tools/list", params, timeout).await?;
        let batch: Vec<CapabilityDescriptor> =
            serde_json::from_value(page.get("tools").cloned().unwrap_or(json!([])))
                .map_err(|e| ToolError::Protocol(format!("malformed tools/list reply: {}", e)))?;
        tools.extend(batch);
        cursor = page
            .get("nextCursor")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        if cursor.is_none() {
            break;
        }
    }
    Ok(tools)
}

#[async_trait]
impl ToolProtocol for McpStdioProtocol {
    async fn list_tools(&self) -> Result<Vec<CapabilityDescriptor>, ToolError> {
        Ok(self.tools.clone())
    }

    async fn execute(
        &self,
        tool_name: &str,
        arguments: Arguments,
    ) -> Result<InvocationResult, ToolError> {
        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or_else(|| {
            ToolError::InvocationTransport(format!("{} is shut down", self.path.display()))
        })?;

        let result = channel
            .request(
                "tools/call",
                json!({"name": tool_name, "arguments": arguments}),
                self.timeout,
            )
            .await?;

        let is_error = result
            .get("isError")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        let content = match result.get("content").cloned() {
            Some(content) => InvocationContent::from_value(content),
            None if result.is_null() => {
                return Ok(InvocationResult::error("No result returned from tool."))
            }
            None => InvocationContent::Structured(result),
        };
        Ok(InvocationResult { content, is_error })
    }

    fn protocol_name(&self) -> &str {
        "mcp-stdio"
    }

    async fn shutdown(&self) -> Result<(), ToolError> {
        let channel = self.channel.lock().await.take();
        if let Some(mut channel) = channel {
            drop(channel.stdin);
            if let Err(e) = channel.child.kill().await {
                // already exited
                log::debug!("Provider {} kill: {}", self.path.display(), e);
            }
            log::info!("Closed provider {}", self.path.display());
        }
        Ok(())
    }
}
