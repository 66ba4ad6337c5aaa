//! Closure-backed tasks.

use super::Task;
use crate::errors::ExecutionError;
use crate::execution::TaskContext;
use std::fmt::Debug;
use std::marker::PhantomData;

/// A simple function-based task.
pub struct FnTask<I, O, F> {
    name: String,
    func: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FnTask<I, O, F>
where
    F: FnMut(I, &TaskContext) -> Result<O, ExecutionError> + Send,
{
    /// Creates a new function-based task.
    pub fn new(func: F) -> Self {
        Self::named("FnTask", func)
    }

    /// Creates a new function-based task with a name used in error messages.
    pub fn named(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _marker: PhantomData,
        }
    }
}

impl<I, O, F> Debug for FnTask<I, O, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}

impl<I, O, F> Task for FnTask<I, O, F>
where
    F: FnMut(I, &TaskContext) -> Result<O, ExecutionError> + Send,
{
    type Input = I;
    type Output = O;

    fn process(&mut self, input: I, ctx: &TaskContext) -> Result<O, ExecutionError> {
        (self.func)(input, ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
