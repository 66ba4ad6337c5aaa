//! Mock tasks and tools for testing.

use parking_lot::Mutex;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ExecutionError;
use crate::execution::TaskContext;
use crate::tasks::Task;
use crate::tools::Tool;

static UPPERCASE_CREATED: AtomicUsize = AtomicUsize::new(0);

/// A pass-through task that records every input.
///
/// Clones share the recording, so a clone kept by the test observes what the
/// submitted instance saw.
#[derive(Debug, Clone)]
pub struct RecordingTask<T> {
    name: String,
    seen: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone> RecordingTask<T> {
    /// Creates a new recording task.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns all recorded inputs.
    #[must_use]
    pub fn recorded(&self) -> Vec<T> {
        self.seen.lock().clone()
    }

    /// Returns the number of times the task ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.seen.lock().len()
    }
}

impl<T: Clone + Send> Task for RecordingTask<T> {
    type Input = T;
    type Output = T;

    fn process(&mut self, input: T, _ctx: &TaskContext) -> Result<T, ExecutionError> {
        self.seen.lock().push(input.clone());
        Ok(input)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A pass-through task that takes time.
///
/// Sleeps cooperatively: a terminated execution interrupts the sleep and the
/// task fails with a termination error.
pub struct SlowTask<T> {
    delay: Duration,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T> SlowTask<T> {
    /// Creates a new slow task.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            _marker: PhantomData,
        }
    }

    /// Creates a slow task with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

impl<T> Debug for SlowTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlowTask").field("delay", &self.delay).finish()
    }
}

impl<T> Task for SlowTask<T> {
    type Input = T;
    type Output = T;

    fn process(&mut self, input: T, ctx: &TaskContext) -> Result<T, ExecutionError> {
        if ctx.token().wait_timeout(self.delay) {
            return Err(ExecutionError::terminated());
        }
        Ok(input)
    }
}

/// A task that always fails.
pub struct FailingTask<I, O> {
    message: String,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> FailingTask<I, O> {
    /// Creates a new failing task.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            _marker: PhantomData,
        }
    }
}

impl<I, O> Debug for FailingTask<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailingTask")
            .field("message", &self.message)
            .finish()
    }
}

impl<I, O> Task for FailingTask<I, O> {
    type Input = I;
    type Output = O;

    fn process(&mut self, _input: I, _ctx: &TaskContext) -> Result<O, ExecutionError> {
        Err(ExecutionError::new(self.message.clone()))
    }
}

/// Upper-cases its input; registered as `uppercase` and `upper`.
#[derive(Debug)]
pub struct UppercaseTool {
    instance: usize,
    suffix: String,
}

impl UppercaseTool {
    /// Sequence number of this instance.
    #[must_use]
    pub fn instance(&self) -> usize {
        self.instance
    }

    /// Number of instances created so far in this process.
    #[must_use]
    pub fn created() -> usize {
        UPPERCASE_CREATED.load(Ordering::SeqCst)
    }

    /// Appends `suffix` to every output.
    pub fn suffix(&mut self, suffix: impl Into<String>) -> &mut Self {
        self.suffix = suffix.into();
        self
    }
}

impl Default for UppercaseTool {
    fn default() -> Self {
        Self {
            instance: UPPERCASE_CREATED.fetch_add(1, Ordering::SeqCst),
            suffix: String::new(),
        }
    }
}

impl Task for UppercaseTool {
    type Input = String;
    type Output = String;

    fn process(&mut self, input: String, _ctx: &TaskContext) -> Result<String, ExecutionError> {
        Ok(format!("{}{}", input.to_uppercase(), self.suffix))
    }
}

impl Tool for UppercaseTool {
    fn aliases() -> &'static [&'static str] {
        &["uppercase", "upper"]
    }
}

/// Counts the characters of its input; registered as `length` and `len`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LengthTool;

impl Task for LengthTool {
    type Input = String;
    type Output = usize;

    fn process(&mut self, input: String, _ctx: &TaskContext) -> Result<usize, ExecutionError> {
        Ok(input.chars().count())
    }
}

impl Tool for LengthTool {
    fn aliases() -> &'static [&'static str] {
        &["length", "len"]
    }
}

/// A tool declaring no aliases; registering it always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrokenTool;

impl Task for BrokenTool {
    type Input = ();
    type Output = ();

    fn process(&mut self, _input: (), _ctx: &TaskContext) -> Result<(), ExecutionError> {
        Ok(())
    }
}

impl Tool for BrokenTool {
    fn aliases() -> &'static [&'static str] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_task_shares_recording_with_clones() {
        let probe = RecordingTask::new("record");
        let mut task = probe.clone();
        let ctx = TaskContext::detached();

        assert_eq!(task.process(1, &ctx).unwrap(), 1);
        assert_eq!(task.process(2, &ctx).unwrap(), 2);
        assert_eq!(probe.recorded(), vec![1, 2]);
        assert_eq!(probe.call_count(), 2);
        assert_eq!(task.name(), "record");
    }

    #[test]
    fn test_slow_task_is_interrupted_by_cancellation() {
        let ctx = TaskContext::detached();
        ctx.token().cancel("stop");

        let err = SlowTask::<u8>::with_delay_ms(5_000).process(1, &ctx).unwrap_err();
        assert!(err.is_termination());
    }

    #[test]
    fn test_failing_task() {
        let err = FailingTask::<(), ()>::new("broken")
            .process((), &TaskContext::detached())
            .unwrap_err();
        assert_eq!(err.message(), "broken");
    }

    #[test]
    fn test_uppercase_tool_instances_are_distinct() {
        let mut first = UppercaseTool::default();
        let second = UppercaseTool::default();
        assert_ne!(first.instance(), second.instance());

        first.suffix("!");
        assert_eq!(first.process("hey".to_string(), &TaskContext::detached()).unwrap(), "HEY!");
    }

    #[test]
    fn test_length_counts_chars() {
        assert_eq!(LengthTool.process("héllo".to_string(), &TaskContext::detached()).unwrap(), 5);
    }
}
