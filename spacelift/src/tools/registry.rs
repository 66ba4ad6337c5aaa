//! Tool registry indexing tools by type and by alias.

use super::Tool;
use crate::errors::{ExecutionError, InvalidComponentError};
use crate::execution_error;
use crate::tasks::{DynTask, ErasedTask, Task, TypeInfo};
use parking_lot::RwLock;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

type Factory<T> = Arc<dyn Fn() -> Result<T, ExecutionError> + Send + Sync>;

type TypedFactory<I, O> =
    Arc<dyn Fn() -> Result<Box<dyn Task<Input = I, Output = O>>, ExecutionError> + Send + Sync>;

type ErasedFactory = Arc<dyn Fn() -> Result<Box<dyn DynTask>, ExecutionError> + Send + Sync>;

/// Introspection entry for one registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    /// Fully qualified type name.
    pub type_name: String,
    /// Aliases the type was registered with.
    pub aliases: Vec<String>,
    /// Input type name.
    pub input: String,
    /// Output type name.
    pub output: String,
}

struct Registration {
    descriptor: ToolDescriptor,
    /// `Factory<T>` for the registered type.
    concrete: Arc<dyn Any + Send + Sync>,
    /// `TypedFactory<T::Input, T::Output>` for the registered type.
    typed: Arc<dyn Any + Send + Sync>,
    erased: ErasedFactory,
}

#[derive(Default)]
struct RegistryState {
    tools: HashMap<TypeId, Registration>,
    aliases: HashMap<String, TypeId>,
}

/// Registry of tool factories.
///
/// Every lookup builds a fresh instance. Lookups that can legitimately miss
/// return `None`; only a malformed tool fails registration.
///
/// When a second type registers an alias that is already taken, the alias
/// moves to the new type. A strict registry rejects such registrations
/// instead.
#[derive(Default)]
pub struct ToolRegistry {
    state: RwLock<RegistryState>,
    strict: bool,
}

impl ToolRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that rejects alias collisions between types.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            state: RwLock::default(),
            strict: true,
        }
    }

    /// Returns true if alias collisions are rejected.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Registers a default-constructible tool.
    pub fn register<T>(&self) -> Result<&Self, InvalidComponentError>
    where
        T: Tool + Default + 'static,
        T::Input: 'static,
        T::Output: Send + 'static,
    {
        self.register_with(|| Ok(T::default()))
    }

    /// Registers a tool built by `factory`.
    ///
    /// One transient instance is built to validate the factory. Registration
    /// fails if that fails, or if the tool declares no alias or an empty one;
    /// the registry is left unchanged in that case. Registering the same type
    /// again replaces its factory and alias set.
    pub fn register_with<T, F>(&self, factory: F) -> Result<&Self, InvalidComponentError>
    where
        T: Tool + 'static,
        T::Input: 'static,
        T::Output: Send + 'static,
        F: Fn() -> Result<T, ExecutionError> + Send + Sync + 'static,
    {
        let component = std::any::type_name::<T>();
        let invalid = |cause: ExecutionError| InvalidComponentError::new(component, cause);

        factory().map_err(|e| invalid(e.prepend_message("Unable to create an instance")))?;

        let aliases = T::aliases();
        if aliases.is_empty() {
            return Err(invalid(ExecutionError::new("Tool does not declare any alias")));
        }
        if aliases.iter().any(|alias| alias.is_empty()) {
            return Err(invalid(ExecutionError::new("Tool declares an empty alias")));
        }

        let type_id = TypeId::of::<T>();
        let registration = registration::<T>(Arc::new(factory), aliases);

        let mut state = self.state.write();
        if self.strict {
            let taken = aliases.iter().find_map(|alias| {
                state
                    .aliases
                    .get(*alias)
                    .filter(|owner| **owner != type_id)
                    .map(|owner| (*alias, type_label(&state, *owner)))
            });
            if let Some((alias, owner)) = taken {
                return Err(invalid(execution_error!(
                    "Alias '{}' is already registered by {}",
                    alias,
                    owner
                )));
            }
        }

        if let Some(previous) = state.tools.remove(&type_id) {
            for alias in &previous.descriptor.aliases {
                if state.aliases.get(alias) == Some(&type_id) {
                    state.aliases.remove(alias);
                }
            }
        }
        for alias in aliases {
            if let Some(previous) = state.aliases.insert((*alias).to_string(), type_id) {
                if previous != type_id {
                    warn!(
                        alias = %alias,
                        tool = component,
                        previous = %type_label(&state, previous),
                        "Alias reassigned to another tool"
                    );
                }
            }
        }
        state.tools.insert(type_id, registration);
        drop(state);

        debug!(tool = component, aliases = ?aliases, "Registered tool");
        Ok(self)
    }

    /// Builds a new instance of `T` if `T` was registered.
    pub fn find<T>(&self) -> Option<T>
    where
        T: Tool + 'static,
    {
        let factory = {
            let state = self.state.read();
            let registration = state.tools.get(&TypeId::of::<T>())?;
            registration.concrete.downcast_ref::<Factory<T>>()?.clone()
        };
        instantiate(std::any::type_name::<T>(), || factory())
    }

    /// Builds a new instance of the tool registered under `alias`.
    pub fn find_alias(&self, alias: &str) -> Option<Box<dyn DynTask>> {
        let (component, factory) = {
            let state = self.state.read();
            let registration = state.tools.get(state.aliases.get(alias)?)?;
            (
                registration.descriptor.type_name.clone(),
                registration.erased.clone(),
            )
        };
        instantiate(&component, || factory())
    }

    /// Builds a new instance of the tool registered under `alias`, typed as
    /// a task from `I` to `O`.
    ///
    /// Returns `None` if the alias is unknown or if the registered tool does
    /// not map `I` to `O`.
    pub fn find_typed<I, O>(&self, alias: &str) -> Option<Box<dyn Task<Input = I, Output = O>>>
    where
        I: 'static,
        O: 'static,
    {
        let (component, factory) = {
            let state = self.state.read();
            let registration = state.tools.get(state.aliases.get(alias)?)?;
            let Some(factory) = registration.typed.downcast_ref::<TypedFactory<I, O>>() else {
                debug!(
                    alias,
                    registered_input = %registration.descriptor.input,
                    registered_output = %registration.descriptor.output,
                    requested_input = std::any::type_name::<I>(),
                    requested_output = std::any::type_name::<O>(),
                    "Tool does not have the requested shape"
                );
                return None;
            };
            (registration.descriptor.type_name.clone(), factory.clone())
        };
        instantiate(&component, || factory())
    }

    /// Returns true if `T` was registered.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.state.read().tools.contains_key(&TypeId::of::<T>())
    }

    /// Returns true if some tool is registered under `alias`.
    #[must_use]
    pub fn contains_alias(&self, alias: &str) -> bool {
        self.state.read().aliases.contains_key(alias)
    }

    /// Lists every registered tool, one entry per type.
    pub fn all_tools(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<ToolDescriptor> = self
            .state
            .read()
            .tools
            .values()
            .map(|registration| registration.descriptor.clone())
            .collect();
        tools.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        tools
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().tools.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ToolRegistry")
            .field("tool_count", &state.tools.len())
            .field("alias_count", &state.aliases.len())
            .field("strict", &self.strict)
            .finish()
    }
}

fn registration<T>(factory: Factory<T>, aliases: &[&str]) -> Registration
where
    T: Tool + 'static,
    T::Input: 'static,
    T::Output: Send + 'static,
{
    let typed_source = Arc::clone(&factory);
    let typed: TypedFactory<T::Input, T::Output> = Arc::new(move || {
        typed_source().map(|tool| Box::new(tool) as Box<dyn Task<Input = T::Input, Output = T::Output>>)
    });

    let erased_source = Arc::clone(&factory);
    let erased: ErasedFactory = Arc::new(move || {
        erased_source().map(|tool| Box::new(ErasedTask::new(tool)) as Box<dyn DynTask>)
    });

    Registration {
        descriptor: ToolDescriptor {
            type_name: std::any::type_name::<T>().to_string(),
            aliases: aliases.iter().map(ToString::to_string).collect(),
            input: TypeInfo::of::<T::Input>().name().to_string(),
            output: TypeInfo::of::<T::Output>().name().to_string(),
        },
        concrete: Arc::new(factory),
        typed: Arc::new(typed),
        erased,
    }
}

fn type_label(state: &RegistryState, id: TypeId) -> String {
    state
        .tools
        .get(&id)
        .map_or_else(|| "an unknown tool".to_string(), |r| r.descriptor.type_name.clone())
}

fn instantiate<R>(component: &str, build: impl FnOnce() -> Result<R, ExecutionError>) -> Option<R> {
    match build() {
        Ok(instance) => Some(instance),
        Err(e) => {
            warn!(tool = component, error = %e, "Unable to instantiate tool");
            None
        }
    }
}
