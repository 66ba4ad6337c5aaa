//! The task trait.

use super::Chain;
use crate::errors::ExecutionError;
use crate::execution::TaskContext;

/// A typed unit of work taking one input and producing one output.
///
/// Tasks may carry per-instance configuration set through builder methods
/// before they run. An instance is meant for a single pipeline execution.
pub trait Task: Send {
    /// What the task consumes.
    type Input;
    /// What the task produces.
    type Output;

    /// Runs the task.
    fn process(
        &mut self,
        input: Self::Input,
        ctx: &TaskContext,
    ) -> Result<Self::Output, ExecutionError>;

    /// Name used in logs and error messages.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }
}

impl<T> Task for Box<T>
where
    T: Task + ?Sized,
{
    type Input = T::Input;
    type Output = T::Output;

    fn process(
        &mut self,
        input: Self::Input,
        ctx: &TaskContext,
    ) -> Result<Self::Output, ExecutionError> {
        (**self).process(input, ctx)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Composition helpers available on every task.
pub trait TaskExt: Task + Sized {
    /// Chains `next` after this task.
    ///
    /// Consumes both tasks and returns a new one; the output of `self`
    /// becomes the input of `next`.
    fn then_with<B>(self, next: B) -> Chain<Self, B>
    where
        B: Task<Input = Self::Output>,
    {
        Chain::new(self, next)
    }

    /// Runs the task on the calling thread, outside of any execution.
    fn run_detached(mut self, input: Self::Input) -> Result<Self::Output, ExecutionError> {
        self.process(input, &TaskContext::detached())
    }
}

impl<T: Task> TaskExt for T {}

/// Strips module paths and generic arguments from a type name.
pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Double;

    impl Task for Double {
        type Input = i64;
        type Output = i64;

        fn process(&mut self, input: i64, _ctx: &TaskContext) -> Result<i64, ExecutionError> {
            Ok(input * 2)
        }
    }

    #[test]
    fn test_default_name_is_short_type_name() {
        assert_eq!(Double.name(), "Double");
        let boxed: Box<dyn Task<Input = i64, Output = i64>> = Box::new(Double);
        assert_eq!(boxed.name(), "Double");
    }

    #[test]
    fn test_boxed_task_processes() {
        let mut boxed: Box<dyn Task<Input = i64, Output = i64>> = Box::new(Double);
        assert_eq!(boxed.process(21, &TaskContext::detached()).unwrap(), 42);
    }

    #[test]
    fn test_run_detached() {
        assert_eq!(Double.then_with(Double).run_detached(3).unwrap(), 12);
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("spacelift::tasks::chain::Chain<a::B, c::D>"), "Chain");
        assert_eq!(short_type_name("alloc::string::String"), "String");
        assert_eq!(short_type_name("u32"), "u32");
    }
}
