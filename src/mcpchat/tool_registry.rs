//! Capability registry and connection manager.
//!
//! [`ToolRegistry`] owns one [`ToolProtocol`] per provider, merges their advertised
//! capabilities into a single catalog, and routes each invocation to the provider
//! that owns the name. Every provider failure is turned into an error-flagged
//! [`InvocationResult`] here, so callers never special-case provider faults.
//!
//! Catalog order is discovery order. When two providers advertise the same name the
//! later registration wins: the catalog entry keeps its position, the route moves to
//! the new provider, and the replacement is logged.
//!
//! The registry is built mutably at startup and then shared read-mostly, typically as
//! `Arc<RwLock<ToolRegistry>>`.

use crate::mcpchat::config::ClientConfig;
use crate::mcpchat::event::{EventHandler, ProviderEvent};
use crate::mcpchat::tool_protocol::{
    Arguments, CapabilityDescriptor, InvocationResult, ToolError, ToolProtocol,
};
use crate::mcpchat::tool_protocols::McpStdioProtocol;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

struct ProviderEntry {
    name: String,
    protocol: Arc<dyn ToolProtocol>,
}

/// Registry of connected providers and their capabilities.
#[derive(Default)]
pub struct ToolRegistry {
    providers: Vec<ProviderEntry>,
    catalog: Vec<CapabilityDescriptor>,
    /// capability name -> index into `providers`
    routes: HashMap<String, usize>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an event handler that receives [`ProviderEvent`]s.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    async fn emit(&self, event: ProviderEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_provider_event(&event).await;
        }
    }

    /// Launch the provider script at `path`, perform the capability handshake and
    /// merge its capabilities into the catalog.
    ///
    /// Returns the names the provider advertised. Fails with
    /// [`ToolError::UnsupportedProviderKind`] or [`ToolError::ProviderUnreachable`];
    /// the registry is unchanged on failure.
    pub async fn connect(
        &mut self,
        path: &Path,
        config: &ClientConfig,
    ) -> Result<Vec<String>, ToolError> {
        let protocol = McpStdioProtocol::spawn(path, config).await?;
        self.add_protocol(&path.display().to_string(), Arc::new(protocol))
            .await
    }

    /// Register an already-connected provider under `name`.
    ///
    /// If the provider cannot list its capabilities it is shut down and the error
    /// returned as [`ToolError::ProviderUnreachable`].
    pub async fn add_protocol(
        &mut self,
        name: &str,
        protocol: Arc<dyn ToolProtocol>,
    ) -> Result<Vec<String>, ToolError> {
        let capabilities = match protocol.list_tools().await {
            Ok(capabilities) => capabilities,
            Err(e) => {
                if let Err(close_err) = protocol.shutdown().await {
                    log::warn!("Error closing provider {}: {}", name, close_err);
                }
                return Err(match e {
                    ToolError::ProviderUnreachable(_) => e,
                    other => ToolError::ProviderUnreachable(format!("{}: {}", name, other)),
                });
            }
        };

        let index = self.providers.len();
        self.providers.push(ProviderEntry {
            name: name.to_string(),
            protocol,
        });

        let mut added = Vec::with_capacity(capabilities.len());
        for descriptor in capabilities {
            added.push(descriptor.name.clone());
            match self.routes.insert(descriptor.name.clone(), index) {
                Some(previous) => {
                    let previous_provider = self.providers[previous].name.clone();
                    log::warn!(
                        "Capability '{}' from {} replaces the one from {}",
                        descriptor.name,
                        name,
                        previous_provider
                    );
                    if let Some(slot) = self.catalog.iter_mut().find(|c| c.name == descriptor.name)
                    {
                        *slot = descriptor.clone();
                    }
                    self.emit(ProviderEvent::CapabilityReplaced {
                        capability: descriptor.name,
                        previous_provider,
                        provider: name.to_string(),
                    })
                    .await;
                }
                None => self.catalog.push(descriptor),
            }
        }

        log::info!("Connected to {} with tools: {:?}", name, added);
        self.emit(ProviderEvent::Connected {
            provider: name.to_string(),
            capabilities: added.clone(),
        })
        .await;
        Ok(added)
    }

    /// Current catalog, in discovery order.
    pub fn list_capabilities(&self) -> &[CapabilityDescriptor] {
        &self.catalog
    }

    /// Names of all capabilities, in discovery order.
    pub fn capability_names(&self) -> Vec<String> {
        self.catalog.iter().map(|c| c.name.clone()).collect()
    }

    /// Borrow a capability descriptor by name.
    pub fn get_capability(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.catalog.iter().find(|c| c.name == name)
    }

    /// Number of providers currently held.
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Invoke a capability on the provider that owns it.
    ///
    /// Never fails: unknown names and transport failures come back as error-flagged
    /// results. The provider stays connected after a failed call.
    pub async fn invoke(&self, name: &str, arguments: Arguments) -> InvocationResult {
        let Some(entry) = self.routes.get(name).map(|&i| &self.providers[i]) else {
            let err = ToolError::UnknownCapability(name.to_string());
            log::error!("{}", err);
            return InvocationResult::error(err.to_string());
        };

        match entry.protocol.execute(name, arguments).await {
            Ok(result) => result,
            Err(ToolError::UnknownCapability(_)) => {
                let message = format!("Tool \"{}\" not found on {}.", name, entry.name);
                log::error!("{}", message);
                InvocationResult::error(message)
            }
            Err(e) => {
                let message = format!("Error calling tool \"{}\": {}", name, e);
                log::error!("{}", message);
                InvocationResult::error(message)
            }
        }
    }

    /// Close every provider once and clear the catalog.
    ///
    /// Safe to call repeatedly; providers that already died are logged and skipped.
    pub async fn shutdown(&mut self) {
        let providers = std::mem::take(&mut self.providers);
        self.catalog.clear();
        self.routes.clear();
        for entry in providers {
            if let Err(e) = entry.protocol.shutdown().await {
                log::warn!("Error closing provider {}: {}", entry.name, e);
            }
            self.emit(ProviderEvent::ShutDown { provider: entry.name })
                .await;
        }
    }
}
