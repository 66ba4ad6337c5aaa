//! The execution service: owner of the worker pools.

use super::condition::{self, ExecutionCondition, PollPolicy};
use super::handle::{ExecutionInner, Submission};
use super::scheduler::DelayedScheduler;
use super::{Execution, ExecutionConfig, TaskContext};
use crate::cancellation::CancellationToken;
use crate::errors::{ExecutionError, Result, SpaceliftError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};
use uuid::Uuid;

struct ServiceShared {
    config: ExecutionConfig,
    /// Used only for its blocking pool; `None` once shut down.
    runtime: RwLock<Option<Runtime>>,
    scheduler: DelayedScheduler,
    environment: RwLock<HashMap<String, String>>,
    working_directory: RwLock<Option<PathBuf>>,
    shut_down: AtomicBool,
}

impl ServiceShared {
    fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(runtime) = self.runtime.write().take() {
            runtime.shutdown_background();
        }
        self.scheduler.shutdown();
        true
    }
}

impl Drop for ServiceShared {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs units of work and hands out [`Execution`] handles for them.
///
/// Immediate work goes to a pool that grows with demand and reclaims idle
/// threads; delayed work goes to a single timer thread. Clones share the
/// same pools; the pools are shut down with the last clone.
#[derive(Clone)]
pub struct ExecutionService {
    shared: Arc<ServiceShared>,
}

impl ExecutionService {
    /// Creates a service with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(ExecutionConfig::default())
    }

    /// Creates a service from `config`.
    ///
    /// The configured environment and working directory go through the same
    /// validation as the setters.
    pub fn with_config(config: ExecutionConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.max_pool_threads.max(1))
            .thread_keep_alive(config.idle_keep_alive())
            .thread_name(format!("{}-worker", config.thread_name_prefix))
            .build()
            .map_err(|e| ExecutionError::with_cause(e, "Unable to start the worker pool"))?;

        let scheduler = DelayedScheduler::start(format!("{}-scheduler", config.thread_name_prefix))
            .map_err(|e| ExecutionError::with_cause(e, "Unable to start the scheduler thread"))?;

        let environment = config.environment.clone();
        let working_directory = config.working_directory.clone();

        let service = Self {
            shared: Arc::new(ServiceShared {
                config,
                runtime: RwLock::new(Some(runtime)),
                scheduler,
                environment: RwLock::new(HashMap::new()),
                working_directory: RwLock::new(None),
                shut_down: AtomicBool::new(false),
            }),
        };
        service
            .set_environment(environment)
            .set_working_directory(working_directory)?;

        info!(
            max_pool_threads = service.shared.config.max_pool_threads,
            "Execution service started"
        );
        Ok(service)
    }

    /// The configuration the service was built with.
    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.shared.config
    }

    /// Submits `work` to the immediate pool.
    ///
    /// Never blocks. If the service was shut down the returned execution has
    /// already failed.
    pub fn execute<T, F>(&self, work: F) -> Execution<T>
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext) -> std::result::Result<T, ExecutionError> + Send + 'static,
    {
        self.submit(move |ctx: &TaskContext| work(ctx).map_err(SpaceliftError::from))
    }

    /// Submits `work` to the timer thread; it starts once `delay` elapsed.
    ///
    /// Delayed work runs one job at a time. Among jobs whose delay elapsed,
    /// the earliest submitted runs first.
    pub fn schedule<T, F>(&self, work: F, delay: Duration) -> Execution<T>
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext) -> std::result::Result<T, ExecutionError> + Send + 'static,
    {
        let (inner, ctx) = self.prepare::<T>();
        let id = ctx.execution_id();
        let submission = Submission::new(inner.clone(), ctx, move |ctx: &TaskContext| {
            work(ctx).map_err(SpaceliftError::from)
        });

        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        debug!(execution_id = %id, delay_ms, "Scheduling delayed work");
        self.shared
            .scheduler
            .submit(delay, Box::new(move || submission.run()));

        Execution::new(inner, self.clone())
    }

    /// Re-executes `work` every `policy.interval` until `condition` accepts
    /// its result.
    ///
    /// The execution fails with a timeout once `policy.timeout` passes, and
    /// stops between attempts when terminated.
    pub fn poll_until<T, W, C>(&self, work: W, condition: C, policy: PollPolicy) -> Execution<T>
    where
        T: Send + 'static,
        W: FnMut(&TaskContext) -> std::result::Result<T, ExecutionError> + Send + 'static,
        C: ExecutionCondition<T> + 'static,
    {
        self.submit(move |ctx: &TaskContext| condition::poll(ctx, work, &condition, policy))
    }

    fn submit<T, F>(&self, work: F) -> Execution<T>
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext) -> Result<T> + Send + 'static,
    {
        let (inner, ctx) = self.prepare::<T>();
        let id = ctx.execution_id();
        let submission = Submission::new(inner.clone(), ctx, work);

        match self.shared.runtime.read().as_ref() {
            Some(runtime) => {
                debug!(execution_id = %id, "Submitting work");
                runtime.spawn_blocking(move || submission.run());
            }
            None => {
                debug!(execution_id = %id, "Rejecting work, service is shut down");
                drop(submission);
            }
        }

        Execution::new(inner, self.clone())
    }

    fn prepare<T>(&self) -> (Arc<ExecutionInner<T>>, TaskContext) {
        let id = Uuid::new_v4();
        let token = Arc::new(CancellationToken::new());
        let ctx = TaskContext::new(
            id,
            token.clone(),
            self.environment(),
            self.working_directory(),
        );
        (ExecutionInner::new(id, token), ctx)
    }

    /// Replaces the environment overrides used by process-launching tasks.
    pub fn set_environment(&self, environment: HashMap<String, String>) -> &Self {
        *self.shared.environment.write() = environment;
        self
    }

    /// Returns a copy of the environment overrides.
    #[must_use]
    pub fn environment(&self) -> HashMap<String, String> {
        self.shared.environment.read().clone()
    }

    /// Sets the working directory used by process-launching tasks.
    ///
    /// `None` clears the setting. The path must exist and be a directory;
    /// on failure the previous value is kept.
    pub fn set_working_directory<P>(&self, path: Option<P>) -> Result<&Self>
    where
        P: AsRef<Path>,
    {
        let Some(path) = path else {
            return Ok(self.clear_working_directory());
        };
        let path = path.as_ref();

        if !path.exists() {
            return Err(SpaceliftError::invalid_argument(format!(
                "Specified path {} does not exist!",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(SpaceliftError::invalid_argument(format!(
                "Specified path {} is not a directory!",
                path.display()
            )));
        }

        *self.shared.working_directory.write() = Some(path.to_path_buf());
        Ok(self)
    }

    /// Clears the working directory.
    pub fn clear_working_directory(&self) -> &Self {
        *self.shared.working_directory.write() = None;
        self
    }

    /// Returns the working directory, if set.
    #[must_use]
    pub fn working_directory(&self) -> Option<PathBuf> {
        self.shared.working_directory.read().clone()
    }

    /// Shuts both pools down.
    ///
    /// Work that has not started yet fails; running work is left to finish.
    /// Calling it again has no effect.
    pub fn shutdown(&self) {
        if self.shared.shutdown() {
            info!("Execution service shut down");
        }
    }

    /// Returns true once [`ExecutionService::shutdown`] was called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shut_down.load(Ordering::SeqCst)
    }

    /// Number of delayed jobs not started yet.
    #[must_use]
    pub fn pending_scheduled(&self) -> usize {
        self.shared.scheduler.pending()
    }
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService")
            .field("shut_down", &self.is_shutdown())
            .field("pending_scheduled", &self.pending_scheduled())
            .field("working_directory", &self.working_directory())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionState;
    use std::sync::mpsc;
    use std::sync::Barrier;
    use std::time::Instant;

    #[test]
    fn test_execute_returns_value() {
        let service = ExecutionService::new().unwrap();
        let execution = service.execute(|_| Ok(21 * 2));

        assert_eq!(execution.wait().unwrap(), 42);
        assert!(execution.is_finished());
        assert_eq!(execution.state(), ExecutionState::Finished);
    }

    #[test]
    fn test_execute_runs_work_concurrently() {
        let service = ExecutionService::new().unwrap();
        let barrier = Arc::new(Barrier::new(3));

        let executions: Vec<_> = (0..3)
            .map(|i| {
                let barrier = barrier.clone();
                service.execute(move |_| {
                    barrier.wait();
                    Ok(i)
                })
            })
            .collect();

        for (i, execution) in executions.iter().enumerate() {
            assert_eq!(execution.wait_timeout(Duration::from_secs(5)).unwrap(), i);
        }
    }

    #[test]
    fn test_failure_keeps_cause() {
        let service = ExecutionService::new().unwrap();
        let execution: Execution<()> = service.execute(|_| {
            Err(ExecutionError::with_cause(
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                "Unable to read archive",
            ))
        });

        match execution.wait().unwrap_err() {
            SpaceliftError::Execution(err) => {
                assert_eq!(err.message(), "Unable to read archive");
                assert_eq!(err.cause().map(ToString::to_string), Some("no such file".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(execution.has_failed());
    }

    #[test]
    fn test_wait_timeout_leaves_work_running() {
        let service = ExecutionService::new().unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let execution = service.execute(move |_| {
            release_rx
                .recv_timeout(Duration::from_secs(5))
                .map_err(|e| ExecutionError::new(e.to_string()))?;
            Ok("done")
        });

        let err = execution.wait_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(err.is_timeout());
        assert!(!execution.is_finished());

        release_tx.send(()).unwrap();
        assert_eq!(execution.wait().unwrap(), "done");
    }

    #[test]
    fn test_terminate_signals_running_work() {
        let service = ExecutionService::new().unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let execution = service.execute(move |ctx| {
            started_tx.send(()).unwrap();
            let cancelled = ctx.token().wait_timeout(Duration::from_secs(5));
            Ok(cancelled)
        });

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        execution.terminate();

        assert_eq!(execution.state(), ExecutionState::Terminated);
        assert!(execution.wait().unwrap_err().is_termination());
    }

    #[test]
    fn test_schedule_never_starts_early() {
        let service = ExecutionService::new().unwrap();
        let submitted = Instant::now();
        let execution = service.schedule(move |_| Ok(submitted.elapsed()), Duration::from_millis(50));

        let started_after = execution.wait_timeout(Duration::from_secs(5)).unwrap();
        assert!(started_after >= Duration::from_millis(50));
    }

    #[test]
    fn test_zero_delay_reaches_terminal_state() {
        let service = ExecutionService::new().unwrap();
        let scheduled = service.schedule(|_| Ok(1), Duration::ZERO);
        let immediate = service.execute(|_| Ok(2));

        assert_eq!(scheduled.wait_timeout(Duration::from_secs(5)).unwrap(), 1);
        assert_eq!(immediate.wait_timeout(Duration::from_secs(5)).unwrap(), 2);
    }

    #[test]
    fn test_scheduled_work_does_not_block_execute() {
        let service = ExecutionService::new().unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let blocker = service.schedule(
            move |_| {
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
                Ok(())
            },
            Duration::ZERO,
        );

        let immediate = service.execute(|_| Ok("free"));
        assert_eq!(immediate.wait_timeout(Duration::from_secs(5)).unwrap(), "free");

        release_tx.send(()).unwrap();
        blocker.wait_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_working_directory_validation() {
        let service = ExecutionService::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let file = tempfile::NamedTempFile::new_in(dir.path()).unwrap();

        service.set_working_directory(Some(dir.path())).unwrap();
        assert_eq!(service.working_directory(), Some(dir.path().to_path_buf()));

        let missing = dir.path().join("missing");
        let err = service.set_working_directory(Some(&missing)).unwrap_err();
        assert!(matches!(err, SpaceliftError::InvalidArgument { .. }));
        assert!(err.to_string().contains("does not exist"));
        assert_eq!(service.working_directory(), Some(dir.path().to_path_buf()));

        let err = service.set_working_directory(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("is not a directory"));
        assert_eq!(service.working_directory(), Some(dir.path().to_path_buf()));

        service.set_working_directory(None::<&Path>).unwrap();
        assert!(service.working_directory().is_none());
    }

    #[test]
    fn test_with_config_rejects_missing_working_directory() {
        let config = ExecutionConfig::new().with_working_directory("/definitely/not/here");
        let err = ExecutionService::with_config(config).unwrap_err();
        assert!(matches!(err, SpaceliftError::InvalidArgument { .. }));
    }

    #[test]
    fn test_context_snapshots_environment_at_submission() {
        let service = ExecutionService::with_config(ExecutionConfig::new().with_env("MODE", "first"))
            .unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let execution = service.execute(move |ctx| {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
            Ok(ctx.environment().get("MODE").cloned())
        });
        service.set_environment(HashMap::from([("MODE".to_string(), "second".to_string())]));
        release_tx.send(()).unwrap();

        assert_eq!(execution.wait().unwrap(), Some("first".to_string()));
        assert_eq!(service.environment().get("MODE").map(String::as_str), Some("second"));
    }

    #[test]
    fn test_execute_after_shutdown_fails() {
        let service = ExecutionService::new().unwrap();
        service.shutdown();
        service.shutdown();
        assert!(service.is_shutdown());

        let execution = service.execute(|_| Ok(1));
        assert!(execution.has_failed());
        assert!(execution.wait().unwrap_err().to_string().contains("shut down"));
    }

    #[test]
    fn test_shutdown_fails_pending_scheduled_work() {
        let service = ExecutionService::new().unwrap();
        let execution = service.schedule(|_| Ok(1), Duration::from_secs(60));
        assert_eq!(service.pending_scheduled(), 1);

        service.shutdown();
        assert!(execution.has_failed());
        assert_eq!(service.pending_scheduled(), 0);
    }

    #[test]
    fn test_poll_until_condition() {
        let service = ExecutionService::new().unwrap();
        let mut attempts = 0;
        let execution = service.poll_until(
            move |_| {
                attempts += 1;
                Ok(attempts)
            },
            |n: &u32| *n == 3,
            PollPolicy::new(Duration::from_millis(5), Duration::from_secs(5)),
        );

        assert_eq!(execution.wait().unwrap(), 3);
    }

    #[test]
    fn test_poll_until_times_out() {
        let service = ExecutionService::new().unwrap();
        let execution = service.poll_until(
            |_| Ok(false),
            |ready: &bool| *ready,
            PollPolicy::new(Duration::from_millis(5), Duration::from_millis(50)),
        );

        let err = execution.wait().unwrap_err();
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("Condition was not satisfied"));
        assert_eq!(execution.state(), ExecutionState::Failed);
    }
}
