//! Link-time discovery of the execution service and of tools.
//!
//! Crates contribute components by submitting entries with
//! `inventory::submit!`:
//!
//! ```rust,ignore
//! inventory::submit! {
//!     ToolRegistrar::new("archive-tools", register_archive_tools)
//! }
//!
//! fn register_archive_tools(registry: &ToolRegistry) -> Result<(), InvalidComponentError> {
//!     registry.register::<UnzipTool>()?.register::<UntarTool>()?;
//!     Ok(())
//! }
//! ```
//!
//! The [`ServiceProvider`] with the highest priority builds the service and
//! the registry; every [`ToolRegistrar`] then fills that registry.

use super::ToolRegistry;
use crate::errors::{ExecutionError, InvalidComponentError, Result};
use crate::execution::ExecutionService;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds the execution service and the empty tool registry.
pub struct ServiceProvider {
    /// Name used in logs.
    pub name: &'static str,
    /// Higher priorities win.
    pub priority: i32,
    /// Creates the execution service.
    pub create_service: fn() -> Result<ExecutionService>,
    /// Creates the tool registry.
    pub create_registry: fn() -> ToolRegistry,
}

impl ServiceProvider {
    /// Creates a provider.
    pub const fn new(
        name: &'static str,
        priority: i32,
        create_service: fn() -> Result<ExecutionService>,
        create_registry: fn() -> ToolRegistry,
    ) -> Self {
        Self {
            name,
            priority,
            create_service,
            create_registry,
        }
    }
}

/// Registers a group of tools.
pub struct ToolRegistrar {
    /// Name of the tool group (e.g. "archive", "process").
    pub name: &'static str,
    /// Registers the group's tools.
    pub register: fn(&ToolRegistry) -> std::result::Result<(), InvalidComponentError>,
}

impl ToolRegistrar {
    /// Creates a registrar.
    pub const fn new(
        name: &'static str,
        register: fn(&ToolRegistry) -> std::result::Result<(), InvalidComponentError>,
    ) -> Self {
        Self { name, register }
    }
}

inventory::collect!(ServiceProvider);
inventory::collect!(ToolRegistrar);

/// Priority of the provider shipped with this crate.
pub const DEFAULT_PROVIDER_PRIORITY: i32 = 100;

inventory::submit! {
    ServiceProvider::new(
        "default",
        DEFAULT_PROVIDER_PRIORITY,
        ExecutionService::new,
        ToolRegistry::new,
    )
}

/// Returns the provider with the highest priority.
pub fn provider() -> Result<&'static ServiceProvider> {
    inventory::iter::<ServiceProvider>()
        .max_by_key(|provider| provider.priority)
        .ok_or_else(|| ExecutionError::new("No execution service provider is linked").into())
}

/// Lists the names of all linked tool registrars.
pub fn registrar_names() -> Vec<&'static str> {
    inventory::iter::<ToolRegistrar>()
        .map(|registrar| registrar.name)
        .collect()
}

/// Builds the service and the registry and runs every registrar.
pub fn discover() -> Result<(ExecutionService, Arc<ToolRegistry>)> {
    let provider = provider()?;
    debug!(provider = provider.name, priority = provider.priority, "Using service provider");

    let service = (provider.create_service)()?;
    let registry = (provider.create_registry)();

    for registrar in inventory::iter::<ToolRegistrar>() {
        debug!(registrar = registrar.name, "Running tool registrar");
        (registrar.register)(&registry)?;
    }

    info!(
        provider = provider.name,
        tools = registry.len(),
        "Discovered execution service and tools"
    );
    Ok((service, Arc::new(registry)))
}
