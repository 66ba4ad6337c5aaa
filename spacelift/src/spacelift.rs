//! Entry points for building and running pipelines.

use crate::cancellation::{install_signal_handler, ShutdownHooks};
use crate::errors::{ExecutionError, Result, SpaceliftError};
use crate::execution::{Execution, ExecutionService, TaskContext};
use crate::tasks::{Chain, DynChain, DynTask, InjectTask, Task, TaskExt};
use crate::tools::{discovery, Tool, ToolRegistry};
use parking_lot::RwLock;
use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

static GLOBAL: RwLock<Option<Spacelift>> = RwLock::new(None);

thread_local! {
    static DISCOVERING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as discovering the global context.
struct DiscoveryScope;

impl DiscoveryScope {
    fn enter() -> Result<Self> {
        if DISCOVERING.with(|flag| flag.replace(true)) {
            return Err(ExecutionError::new(
                "Spacelift::global() was called while discovering the global context",
            )
            .into());
        }
        Ok(Self)
    }
}

impl Drop for DiscoveryScope {
    fn drop(&mut self) {
        DISCOVERING.with(|flag| flag.set(false));
    }
}

/// An execution service together with the tool registry used to resolve
/// pipeline stages.
///
/// Clones share the same service and registry.
///
/// ```rust
/// use spacelift::prelude::*;
/// use spacelift::testing::{LengthTool, UppercaseTool};
/// use std::sync::Arc;
///
/// let registry = ToolRegistry::new();
/// registry.register::<UppercaseTool>()?.register::<LengthTool>()?;
/// let spacelift = Spacelift::new(ExecutionService::new()?, Arc::new(registry));
///
/// let execution = spacelift
///     .task_from::<_, UppercaseTool>("hello".to_string())?
///     .then::<LengthTool>()?
///     .execute();
/// assert_eq!(execution.wait()?, 5);
/// # spacelift.shutdown();
/// # Ok::<(), spacelift::errors::SpaceliftError>(())
/// ```
#[derive(Clone)]
pub struct Spacelift {
    service: ExecutionService,
    registry: Arc<ToolRegistry>,
}

impl Spacelift {
    /// Creates a context over an explicit service and registry.
    #[must_use]
    pub fn new(service: ExecutionService, registry: Arc<ToolRegistry>) -> Self {
        Self { service, registry }
    }

    /// Creates a context from the linked service provider and tool
    /// registrars.
    pub fn discover() -> Result<Self> {
        let (service, registry) = discovery::discover()?;
        Ok(Self::new(service, registry))
    }

    /// Returns the process-wide context, discovering it on first use.
    ///
    /// Tool registrars run without the global lock held. Calling this from a
    /// registrar fails instead of recursing.
    pub fn global() -> Result<Self> {
        Self::global_with(Self::discover)
    }

    fn global_with<F>(discover: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Self>,
    {
        if let Some(context) = GLOBAL.read().as_ref() {
            return Ok(context.clone());
        }

        let discovered = {
            let _scope = DiscoveryScope::enter()?;
            discover()?
        };

        let mut global = GLOBAL.write();
        if let Some(existing) = global.as_ref() {
            let existing = existing.clone();
            drop(global);
            discovered.shutdown();
            return Ok(existing);
        }
        *global = Some(discovered.clone());
        Ok(discovered)
    }

    /// Drops the process-wide context and shuts its pools down.
    ///
    /// The next [`Spacelift::global`] call discovers a fresh one.
    pub fn reset_global() {
        let previous = GLOBAL.write().take();
        if let Some(context) = previous {
            context.shutdown();
            info!("Global spacelift context reset");
        }
    }

    /// The execution service.
    #[must_use]
    pub fn service(&self) -> &ExecutionService {
        &self.service
    }

    /// The tool registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The process-wide shutdown hooks used by [`Spacelift::guard`].
    #[must_use]
    pub fn hooks(&self) -> &'static ShutdownHooks {
        ShutdownHooks::global()
    }

    /// Starts a pipeline with a fresh instance of a registered tool.
    pub fn task<T>(&self) -> Result<Pipeline<T>>
    where
        T: Tool + 'static,
    {
        let stage = self
            .registry
            .find::<T>()
            .ok_or_else(|| SpaceliftError::unknown_tool(std::any::type_name::<T>()))?;
        Ok(self.pipeline(stage))
    }

    /// Starts a pipeline that feeds `value` into a fresh instance of `T`.
    pub fn task_from<V, T>(&self, value: V) -> Result<Pipeline<Chain<InjectTask<V>, T>>>
    where
        V: Send,
        T: Tool<Input = V> + 'static,
    {
        self.pipeline(InjectTask::new(value)).then::<T>()
    }

    /// Builds a fresh instance of the tool registered under `alias`.
    pub fn tool(&self, alias: &str) -> Result<Box<dyn DynTask>> {
        self.registry
            .find_alias(alias)
            .ok_or_else(|| SpaceliftError::unknown_tool(alias))
    }

    /// Chains the tools registered under `aliases`, in order.
    pub fn tool_chain(&self, aliases: &[&str]) -> Result<DynChain> {
        let (first, rest) = aliases
            .split_first()
            .ok_or_else(|| SpaceliftError::invalid_argument("A tool chain needs at least one alias"))?;

        let mut chain = DynChain::new(self.tool(first)?);
        for alias in rest {
            chain = chain.then(self.tool(alias)?)?;
        }
        Ok(chain)
    }

    /// Starts a pipeline with `stage`.
    pub fn pipeline<S: Task>(&self, stage: S) -> Pipeline<S> {
        Pipeline {
            stage,
            context: self.clone(),
        }
    }

    /// Runs `work` on the execution service.
    pub fn execute<T, F>(&self, work: F) -> Execution<T>
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext) -> std::result::Result<T, ExecutionError> + Send + 'static,
    {
        self.service.execute(work)
    }

    /// Runs `work` on the execution service after `delay`.
    pub fn schedule<T, F>(&self, work: F, delay: Duration) -> Execution<T>
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext) -> std::result::Result<T, ExecutionError> + Send + 'static,
    {
        self.service.schedule(work, delay)
    }

    /// Terminates `execution` on process exit unless it finished or was
    /// marked as finished by then.
    ///
    /// The first call installs the SIGINT/SIGTERM handler running the global
    /// hooks. Normal returns from `main` run them only while the guard from
    /// [`crate::cancellation::install`] is alive. The execution stays guarded
    /// even if the handler cannot be installed.
    pub fn guard<T>(&self, execution: &Execution<T>) -> Result<()>
    where
        T: Send + 'static,
    {
        self.hooks().guard(execution);
        install_signal_handler()
    }

    /// Shuts the execution service down.
    pub fn shutdown(&self) {
        self.service.shutdown();
    }
}

impl std::fmt::Debug for Spacelift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spacelift")
            .field("service", &self.service)
            .field("registry", &self.registry)
            .finish()
    }
}

/// A pipeline under construction.
///
/// Every `then*` call consumes the pipeline and returns a longer one.
pub struct Pipeline<S> {
    stage: S,
    context: Spacelift,
}

impl<S: Task> Pipeline<S> {
    /// Appends a fresh instance of a registered tool.
    pub fn then<B>(self) -> Result<Pipeline<Chain<S, B>>>
    where
        B: Tool<Input = S::Output> + 'static,
    {
        let next = self
            .context
            .registry
            .find::<B>()
            .ok_or_else(|| SpaceliftError::unknown_tool(std::any::type_name::<B>()))?;
        Ok(self.then_with(next))
    }

    /// Appends `next`.
    pub fn then_with<B>(self, next: B) -> Pipeline<Chain<S, B>>
    where
        B: Task<Input = S::Output>,
    {
        Pipeline {
            stage: self.stage.then_with(next),
            context: self.context,
        }
    }

    /// Appends a fresh instance of the tool registered under `alias`.
    ///
    /// Fails with [`SpaceliftError::UnknownTool`] if the alias is unknown or
    /// the tool does not consume this pipeline's output and produce `O`.
    #[allow(clippy::type_complexity)]
    pub fn then_alias<O>(
        self,
        alias: &str,
    ) -> Result<Pipeline<Chain<S, Box<dyn Task<Input = S::Output, Output = O>>>>>
    where
        S::Output: 'static,
        O: 'static,
    {
        let next = self
            .context
            .registry
            .find_typed::<S::Output, O>(alias)
            .ok_or_else(|| SpaceliftError::unknown_tool(alias))?;
        Ok(self.then_with(next))
    }

    /// Configures the stage added last.
    #[must_use]
    pub fn configure<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&mut S),
    {
        configure(&mut self.stage);
        self
    }

    /// The composed stage.
    pub fn stage(&self) -> &S {
        &self.stage
    }

    /// Unwraps the composed stage.
    pub fn into_task(self) -> S {
        self.stage
    }

    /// Runs the pipeline on the calling thread.
    pub fn run_on(mut self, input: S::Input) -> std::result::Result<S::Output, ExecutionError> {
        self.stage.process(input, &TaskContext::detached())
    }

    /// Submits the pipeline with `input` to the execution service.
    pub fn execute_on(self, input: S::Input) -> Execution<S::Output>
    where
        S: 'static,
        S::Input: Send + 'static,
        S::Output: Send + 'static,
    {
        let Self { mut stage, context } = self;
        context
            .service
            .execute(move |ctx: &TaskContext| stage.process(input, ctx))
    }

    /// Submits the pipeline with `input` to run after `delay`.
    pub fn schedule_on(self, input: S::Input, delay: Duration) -> Execution<S::Output>
    where
        S: 'static,
        S::Input: Send + 'static,
        S::Output: Send + 'static,
    {
        let Self { mut stage, context } = self;
        context
            .service
            .schedule(move |ctx: &TaskContext| stage.process(input, ctx), delay)
    }
}

impl<S> Pipeline<S>
where
    S: Task<Input = ()> + 'static,
    S::Output: Send + 'static,
{
    /// Submits the pipeline to the execution service.
    pub fn execute(self) -> Execution<S::Output> {
        self.execute_on(())
    }

    /// Submits the pipeline to run after `delay`.
    pub fn schedule(self, delay: Duration) -> Execution<S::Output> {
        self.schedule_on((), delay)
    }

    /// Runs the pipeline on the calling thread.
    pub fn run(self) -> std::result::Result<S::Output, ExecutionError> {
        self.run_on(())
    }
}

impl<S> std::fmt::Debug for Pipeline<S>
where
    S: Task,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stage", &self.stage.name())
            .finish()
    }
}
