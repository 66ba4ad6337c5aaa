//! Type-erased tasks for name-driven pipelines.

use super::task::short_type_name;
use super::Task;
use crate::errors::ExecutionError;
use crate::execution::TaskContext;
use crate::execution_error;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::fmt;

/// A value crossing a type-erased task boundary.
pub type AnyValue = Box<dyn Any + Send>;

/// Identity and readable name of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeInfo {
    #[serde(skip)]
    id: TypeId,
    name: &'static str,
}

impl TypeInfo {
    /// Describes `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The type's identity.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The fully qualified type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A task whose input and output types are only known at runtime.
pub trait DynTask: Send {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Type the task consumes.
    fn input_type(&self) -> TypeInfo;

    /// Type the task produces.
    fn output_type(&self) -> TypeInfo;

    /// Runs the task on a boxed input.
    ///
    /// Fails if `input` is not of [`DynTask::input_type`].
    fn process_any(&mut self, input: AnyValue, ctx: &TaskContext) -> Result<AnyValue, ExecutionError>;
}

impl fmt::Debug for dyn DynTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynTask")
            .field("name", &self.name())
            .field("input", &self.input_type().name())
            .field("output", &self.output_type().name())
            .finish()
    }
}

/// Adapts a typed task to [`DynTask`].
#[derive(Debug, Clone)]
pub struct ErasedTask<T> {
    task: T,
}

impl<T> ErasedTask<T>
where
    T: Task,
    T::Input: 'static,
    T::Output: Send + 'static,
{
    /// Wraps `task`.
    pub fn new(task: T) -> Self {
        Self { task }
    }

    /// Unwraps the typed task.
    pub fn into_inner(self) -> T {
        self.task
    }
}

impl<T> DynTask for ErasedTask<T>
where
    T: Task,
    T::Input: 'static,
    T::Output: Send + 'static,
{
    fn name(&self) -> &str {
        self.task.name()
    }

    fn input_type(&self) -> TypeInfo {
        TypeInfo::of::<T::Input>()
    }

    fn output_type(&self) -> TypeInfo {
        TypeInfo::of::<T::Output>()
    }

    fn process_any(&mut self, input: AnyValue, ctx: &TaskContext) -> Result<AnyValue, ExecutionError> {
        let input = input.downcast::<T::Input>().map_err(|_| {
            execution_error!(
                "{} expects input of type {}",
                self.task.name(),
                short_type_name(std::any::type_name::<T::Input>())
            )
        })?;
        let output = self.task.process(*input, ctx)?;
        Ok(Box::new(output))
    }
}

/// A chain of type-erased stages, checked link by link when built.
pub struct DynChain {
    stages: Vec<Box<dyn DynTask>>,
}

impl DynChain {
    /// Starts a chain with `first`.
    #[must_use]
    pub fn new(first: Box<dyn DynTask>) -> Self {
        Self {
            stages: vec![first],
        }
    }

    /// Appends `next`.
    ///
    /// Fails if `next` does not consume what the chain currently produces.
    pub fn then(mut self, next: Box<dyn DynTask>) -> Result<Self, ExecutionError> {
        let produced = self.output_type();
        if next.input_type() != produced {
            return Err(execution_error!(
                "Unable to chain {} after {}: it expects {} but receives {}",
                next.name(),
                self.last_name(),
                next.input_type(),
                produced
            ));
        }
        self.stages.push(next);
        Ok(self)
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false; a chain has at least one stage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the chain with typed ends.
    pub fn run<I, O>(&mut self, input: I, ctx: &TaskContext) -> Result<O, ExecutionError>
    where
        I: Send + 'static,
        O: 'static,
    {
        let output = self.process_any(Box::new(input), ctx)?;
        output.downcast::<O>().map(|value| *value).map_err(|_| {
            execution_error!(
                "Chain produces {} but {} was requested",
                self.output_type(),
                std::any::type_name::<O>()
            )
        })
    }

    fn last_name(&self) -> &str {
        self.stages.last().map_or("chain", |stage| stage.name())
    }
}

impl DynTask for DynChain {
    fn name(&self) -> &str {
        self.last_name()
    }

    fn input_type(&self) -> TypeInfo {
        self.stages
            .first()
            .map_or_else(TypeInfo::of::<()>, |stage| stage.input_type())
    }

    fn output_type(&self) -> TypeInfo {
        self.stages
            .last()
            .map_or_else(TypeInfo::of::<()>, |stage| stage.output_type())
    }

    fn process_any(&mut self, input: AnyValue, ctx: &TaskContext) -> Result<AnyValue, ExecutionError> {
        let mut value = input;
        for (index, stage) in self.stages.iter_mut().enumerate() {
            if index > 0 {
                ctx.check_cancelled()?;
            }
            value = stage
                .process_any(value, ctx)
                .map_err(|e| e.prepend_message(format!("{} failed", stage.name())))?;
        }
        Ok(value)
    }
}

impl fmt::Debug for DynChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|stage| stage.name()).collect();
        f.debug_struct("DynChain").field("stages", &names).finish()
    }
}
