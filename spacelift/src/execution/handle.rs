//! Execution handles for outstanding asynchronous work.

use super::{ExecutionService, TaskContext};
use crate::cancellation::{CancellationToken, Terminable};
use crate::errors::{ExecutionError, Result, SpaceliftError, TimeoutError};
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

/// Observable state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// The work has not reached a terminal state yet.
    Running,
    /// The work returned a value.
    Finished,
    /// The work returned an error or panicked.
    Failed,
    /// The execution was terminated before the work completed.
    Terminated,
}

impl ExecutionState {
    /// Returns true for every state except `Running`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

enum Outcome<T> {
    Running,
    Finished(T),
    Failed(SpaceliftError),
    Terminated,
}

impl<T: Clone> Outcome<T> {
    fn resolve(&self) -> Option<Result<T>> {
        match self {
            Self::Running => None,
            Self::Finished(value) => Some(Ok(value.clone())),
            Self::Failed(err) => Some(Err(err.clone())),
            Self::Terminated => Some(Err(ExecutionError::terminated().into())),
        }
    }
}

impl<T> Outcome<T> {
    const fn state(&self) -> ExecutionState {
        match self {
            Self::Running => ExecutionState::Running,
            Self::Finished(_) => ExecutionState::Finished,
            Self::Failed(_) => ExecutionState::Failed,
            Self::Terminated => ExecutionState::Terminated,
        }
    }
}

/// State shared between a handle and the worker running its work.
pub(crate) struct ExecutionInner<T> {
    id: Uuid,
    submitted_at: DateTime<Utc>,
    outcome: Mutex<Outcome<T>>,
    done: Condvar,
    notify: Notify,
    token: Arc<CancellationToken>,
    marked: AtomicBool,
}

impl<T> ExecutionInner<T> {
    pub(crate) fn new(id: Uuid, token: Arc<CancellationToken>) -> Arc<Self> {
        Arc::new(Self {
            id,
            submitted_at: Utc::now(),
            outcome: Mutex::new(Outcome::Running),
            done: Condvar::new(),
            notify: Notify::new(),
            token,
            marked: AtomicBool::new(false),
        })
    }

    /// Publishes the result of the work.
    ///
    /// Returns false if the execution already reached a terminal state, in
    /// which case the result is discarded.
    pub(crate) fn complete(&self, result: Result<T>) -> bool {
        {
            let mut outcome = self.outcome.lock();
            if !matches!(*outcome, Outcome::Running) {
                return false;
            }
            *outcome = match result {
                Ok(value) => Outcome::Finished(value),
                Err(err) => Outcome::Failed(err),
            };
        }
        self.wake_waiters();
        true
    }

    fn state(&self) -> ExecutionState {
        self.outcome.lock().state()
    }

    fn wake_waiters(&self) {
        self.done.notify_all();
        self.notify.notify_waiters();
    }

    fn terminate_now(&self) {
        {
            let mut outcome = self.outcome.lock();
            if !matches!(*outcome, Outcome::Running) {
                return;
            }
            *outcome = Outcome::Terminated;
        }
        debug!(execution_id = %self.id, "Execution terminated");
        self.wake_waiters();
        self.token.cancel("Execution terminated");
    }
}

impl<T: Send> Terminable for ExecutionInner<T> {
    fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    fn is_marked_as_finished(&self) -> bool {
        self.marked.load(Ordering::SeqCst)
    }

    fn terminate(&self) {
        self.terminate_now();
    }

    fn label(&self) -> String {
        format!("execution {}", self.id)
    }
}

/// A cancellable, awaitable handle to one unit of asynchronous work.
///
/// Handles are cheap to clone; every clone observes the same execution.
pub struct Execution<T> {
    inner: Arc<ExecutionInner<T>>,
    service: ExecutionService,
}

impl<T> Execution<T> {
    pub(crate) fn new(inner: Arc<ExecutionInner<T>>, service: ExecutionService) -> Self {
        Self { inner, service }
    }

    /// Unique identifier of this execution.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// When the work was submitted.
    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.inner.submitted_at
    }

    /// The service that created this execution.
    #[must_use]
    pub fn service(&self) -> &ExecutionService {
        &self.service
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ExecutionState {
        self.inner.state()
    }

    /// Returns true once the work finished, failed or was terminated.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Returns true if the work failed.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.state() == ExecutionState::Failed
    }

    /// Requests termination of the work.
    ///
    /// A running execution becomes `Terminated` immediately and its token is
    /// cancelled; the work itself stops only if it observes the token. Has no
    /// effect once the execution is terminal.
    pub fn terminate(&self) {
        self.inner.terminate_now();
    }

    /// Tells shutdown hooks that the caller took over cleanup.
    pub fn mark_as_finished(&self) -> &Self {
        self.inner.marked.store(true, Ordering::SeqCst);
        self
    }

    /// Returns true if [`Execution::mark_as_finished`] was called.
    #[must_use]
    pub fn is_marked_as_finished(&self) -> bool {
        self.inner.marked.load(Ordering::SeqCst)
    }
}

impl<T: Send + 'static> Execution<T> {
    pub(crate) fn terminable(&self) -> Weak<dyn Terminable> {
        let strong: Arc<dyn Terminable> = self.inner.clone();
        Arc::downgrade(&strong)
    }
}

impl<T: Clone> Execution<T> {
    /// Blocks until the execution is terminal and returns its result.
    ///
    /// Returns the same value on every call once finished. May block forever
    /// if the work never completes and nobody terminates it.
    pub fn wait(&self) -> Result<T> {
        let mut outcome = self.inner.outcome.lock();
        loop {
            if let Some(result) = outcome.resolve() {
                return result;
            }
            self.inner.done.wait(&mut outcome);
        }
    }

    /// Blocks for at most `timeout`.
    ///
    /// Fails with [`SpaceliftError::Timeout`] if the execution is still running
    /// when the deadline passes; the work is left running.
    ///
    /// A timeout too large to express as a deadline behaves like
    /// [`Execution::wait`].
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait();
        };
        let mut outcome = self.inner.outcome.lock();
        loop {
            if let Some(result) = outcome.resolve() {
                return result;
            }
            if self.inner.done.wait_until(&mut outcome, deadline).timed_out() {
                return outcome.resolve().unwrap_or_else(|| {
                    Err(TimeoutError::new(
                        format!("Execution {} did not finish in time", self.inner.id),
                        timeout,
                    )
                    .into())
                });
            }
        }
    }

    /// Waits asynchronously until the execution is terminal.
    pub async fn completion(&self) -> Result<T> {
        loop {
            let notified = self.inner.notify.notified();
            let resolved = self.inner.outcome.lock().resolve();
            if let Some(result) = resolved {
                return result;
            }
            notified.await;
        }
    }
}

impl<T> Clone for Execution<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            service: self.service.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Execution<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("marked_as_finished", &self.is_marked_as_finished())
            .finish()
    }
}

/// Work waiting for a pool thread.
///
/// Dropping a submission that never ran fails its execution, so work
/// discarded by a shut down pool is still observed by waiters.
pub(crate) struct Submission<T, F> {
    inner: Arc<ExecutionInner<T>>,
    ctx: TaskContext,
    work: Option<F>,
}

impl<T, F> Submission<T, F>
where
    F: FnOnce(&TaskContext) -> Result<T>,
{
    pub(crate) fn new(inner: Arc<ExecutionInner<T>>, ctx: TaskContext, work: F) -> Self {
        Self {
            inner,
            ctx,
            work: Some(work),
        }
    }

    pub(crate) fn run(mut self) {
        let Some(work) = self.work.take() else {
            return;
        };
        if self.inner.state().is_terminal() {
            debug!(execution_id = %self.inner.id, "Skipping work of a terminated execution");
            return;
        }

        let ctx = &self.ctx;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| work(ctx)))
            .unwrap_or_else(|panic| Err(panic_error(panic.as_ref()).into()));

        let failed = result.is_err();
        if self.inner.complete(result) {
            debug!(execution_id = %self.inner.id, failed, "Execution completed");
        } else {
            debug!(execution_id = %self.inner.id, "Discarding result of a terminated execution");
        }
    }
}

impl<T, F> Drop for Submission<T, F> {
    fn drop(&mut self) {
        if self.work.is_some() {
            self.inner.complete(Err(ExecutionError::new(
                "Execution service was shut down before the work started",
            )
            .into()));
        }
    }
}

fn panic_error(panic: &(dyn std::any::Any + Send)) -> ExecutionError {
    let detail = panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    ExecutionError::new(format!("Unit of work panicked: {detail}"))
}
