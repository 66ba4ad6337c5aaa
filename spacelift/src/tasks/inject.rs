//! The bootstrap stage carrying an initial value into a chain.

use super::Task;
use crate::errors::ExecutionError;
use crate::execution::TaskContext;

/// Injects a value as the input of the next stage.
///
/// Lets a pipeline start from a concrete value instead of from `()`. The
/// value is handed over once; processing the task again fails.
#[derive(Debug, Clone)]
pub struct InjectTask<V> {
    value: Option<V>,
}

impl<V> InjectTask<V> {
    /// Creates a task injecting `value`.
    pub fn new(value: V) -> Self {
        Self { value: Some(value) }
    }

    /// Replaces the injected value.
    pub fn pass_to_next(&mut self, value: V) -> &mut Self {
        self.value = Some(value);
        self
    }

    /// Returns true if the value was not consumed yet.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

impl<V: Send> Task for InjectTask<V> {
    type Input = ();
    type Output = V;

    fn process(&mut self, _input: (), _ctx: &TaskContext) -> Result<V, ExecutionError> {
        self.value
            .take()
            .ok_or_else(|| ExecutionError::new("Injected value was already consumed"))
    }
}
