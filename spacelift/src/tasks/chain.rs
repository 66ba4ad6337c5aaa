//! Sequential composition of two tasks.

use super::Task;
use crate::errors::ExecutionError;
use crate::execution::TaskContext;
use std::ops::{Deref, DerefMut};

/// Runs `first`, then feeds its output into `last`.
///
/// Chains nest to arbitrary depth: `a.then_with(b).then_with(c)` is
/// `Chain<Chain<A, B>, C>`. A chain dereferences to its last stage, so the
/// most recently added task stays configurable.
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: A,
    last: B,
}

impl<A, B> Chain<A, B> {
    /// Creates a chain of two tasks.
    pub fn new(first: A, last: B) -> Self {
        Self { first, last }
    }

    /// The upstream part of the chain.
    pub fn first(&self) -> &A {
        &self.first
    }

    /// The stage added last.
    pub fn last(&self) -> &B {
        &self.last
    }

    /// Splits the chain back into its parts.
    pub fn into_parts(self) -> (A, B) {
        (self.first, self.last)
    }
}

impl<A, B> Task for Chain<A, B>
where
    A: Task,
    B: Task<Input = A::Output>,
{
    type Input = A::Input;
    type Output = B::Output;

    fn process(
        &mut self,
        input: Self::Input,
        ctx: &TaskContext,
    ) -> Result<Self::Output, ExecutionError> {
        let intermediate = self.first.process(input, ctx)?;
        ctx.check_cancelled()?;
        self.last
            .process(intermediate, ctx)
            .map_err(|e| e.prepend_message(format!("{} failed", self.last.name())))
    }
}

impl<A, B> Deref for Chain<A, B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.last
    }
}

impl<A, B> DerefMut for Chain<A, B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{FnTask, TaskExt};

    struct Multiply {
        factor: i32,
    }

    impl Multiply {
        fn factor(&mut self, factor: i32) -> &mut Self {
            self.factor = factor;
            self
        }
    }

    impl Task for Multiply {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: i32, _ctx: &TaskContext) -> Result<i32, ExecutionError> {
            Ok(input * self.factor)
        }
    }

    fn add_one() -> impl Task<Input = i32, Output = i32> {
        FnTask::new(|x: i32, _: &TaskContext| Ok(x + 1))
    }

    #[test]
    fn test_chain_feeds_output_forward() {
        let mut chain = add_one().then_with(Multiply { factor: 10 });
        assert_eq!(chain.process(4, &TaskContext::detached()).unwrap(), 50);
    }

    #[test]
    fn test_chain_equals_sequential_processing() {
        let ctx = TaskContext::detached();
        for x in [-3, 0, 7] {
            let expected = Multiply { factor: 3 }
                .process(add_one().process(x, &ctx).unwrap(), &ctx)
                .unwrap();
            let mut chain = add_one().then_with(Multiply { factor: 3 });
            assert_eq!(chain.process(x, &ctx).unwrap(), expected);
        }
    }

    #[test]
    fn test_last_stage_is_configurable_through_deref() {
        let mut chain = add_one().then_with(Multiply { factor: 1 });
        chain.factor(5);

        assert_eq!(chain.last().factor, 5);
        assert_eq!(chain.process(1, &TaskContext::detached()).unwrap(), 10);
    }

    #[test]
    fn test_failure_of_last_stage_is_prefixed() {
        let failing = FnTask::named("Validate", |_: i32, _: &TaskContext| -> Result<i32, ExecutionError> {
            Err(ExecutionError::new("value out of range"))
        });
        let mut chain = add_one().then_with(failing);

        let err = chain.process(1, &TaskContext::detached()).unwrap_err();
        assert_eq!(err.message(), "Validate failed. value out of range");
    }

    #[test]
    fn test_cancellation_stops_before_next_stage() {
        let ctx = TaskContext::detached();
        let cancel = ctx.token().clone();
        let first = FnTask::new(move |x: i32, _: &TaskContext| {
            cancel.cancel("stop");
            Ok(x)
        });
        let mut chain = first.then_with(Multiply { factor: 2 });

        let err = chain.process(1, &ctx).unwrap_err();
        assert!(err.is_termination());
    }
}
