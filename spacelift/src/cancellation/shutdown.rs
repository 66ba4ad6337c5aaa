//! Shutdown hooks that terminate abandoned executions.
//!
//! Units of work frequently own OS-level resources (child processes in
//! particular) that must not outlive the process that started them. A guarded
//! execution that is still running, and was not marked as finished by its
//! owner, is terminated when its hooks run.
//!
//! Hooks run in three situations:
//! - a scoped [`ShutdownHooks`] instance is dropped;
//! - the [`ExitGuard`] returned by [`install`] is dropped at the end of `main`;
//! - the process receives SIGINT/SIGTERM after [`install`] was called.

use crate::errors::{ExecutionError, Result};
use crate::execution::Execution;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Exit status used when a termination signal triggers the hooks.
pub const SIGNAL_EXIT_CODE: i32 = 130;

static GLOBAL_HOOKS: OnceLock<ShutdownHooks> = OnceLock::new();
static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Registrations between two sweeps of dead and finished entries.
const PRUNE_EVERY: usize = 64;

/// Something a shutdown hook can terminate.
#[cfg_attr(test, mockall::automock)]
pub trait Terminable: Send + Sync {
    /// Returns true once the work reached a terminal state.
    fn is_finished(&self) -> bool;

    /// Returns true if the owner took over responsibility for cleanup.
    fn is_marked_as_finished(&self) -> bool;

    /// Requests termination.
    fn terminate(&self);

    /// Human readable identifier used in logs.
    fn label(&self) -> String;
}

/// Registry of shutdown hooks, one per guarded execution.
///
/// Only weak references are held, so guarding never extends the lifetime of
/// an execution; entries whose execution is gone are skipped.
pub struct ShutdownHooks {
    hooks: DashMap<Uuid, Weak<dyn Terminable>>,
    registrations: AtomicUsize,
}

impl ShutdownHooks {
    /// Creates a scoped set of hooks that runs when dropped.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hooks: DashMap::new(),
            registrations: AtomicUsize::new(0),
        }
    }

    /// Returns the process-wide hooks.
    pub fn global() -> &'static Self {
        GLOBAL_HOOKS.get_or_init(Self::new)
    }

    /// Registers a hook for `execution`.
    pub fn guard<T>(&self, execution: &Execution<T>)
    where
        T: Send + 'static,
    {
        debug!(execution_id = %execution.id(), "Registering shutdown hook");
        self.hooks.insert(execution.id(), execution.terminable());
        self.registered();
    }

    /// Registers a hook for an arbitrary terminable resource.
    ///
    /// The caller keeps ownership; the hook is skipped once `target` is dropped.
    pub fn register(&self, target: &Arc<dyn Terminable>) -> Uuid {
        let id = Uuid::new_v4();
        self.hooks.insert(id, Arc::downgrade(target));
        self.registered();
        id
    }

    /// Runs every pending hook and returns how many targets were terminated.
    ///
    /// Each hook fires at most once.
    pub fn run(&self) -> usize {
        let ids: Vec<Uuid> = self.hooks.iter().map(|entry| *entry.key()).collect();
        let mut terminated = 0;

        for id in ids {
            let Some((_, hook)) = self.hooks.remove(&id) else {
                continue;
            };
            let Some(target) = hook.upgrade() else {
                continue;
            };
            if !target.is_finished() && !target.is_marked_as_finished() {
                warn!(execution = %target.label(), "Terminating unfinished execution on shutdown");
                target.terminate();
                terminated += 1;
            }
        }

        terminated
    }

    /// Drops hooks whose target no longer exists or already finished.
    ///
    /// Runs on its own every few registrations.
    pub fn prune(&self) {
        self.hooks
            .retain(|_, hook| hook.upgrade().is_some_and(|target| !target.is_finished()));
    }

    fn registered(&self) {
        if self.registrations.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }
    }

    /// Returns the number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl Default for ShutdownHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ShutdownHooks {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for ShutdownHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHooks")
            .field("pending_count", &self.len())
            .finish()
    }
}

/// Runs the wrapped hooks when dropped.
///
/// Keep it alive for the duration of `main`.
#[must_use = "the hooks run when the guard is dropped"]
#[derive(Debug)]
pub struct ExitGuard {
    hooks: &'static ShutdownHooks,
}

impl ExitGuard {
    /// Creates a guard over a specific set of hooks.
    pub const fn for_hooks(hooks: &'static ShutdownHooks) -> Self {
        Self { hooks }
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let terminated = self.hooks.run();
        if terminated > 0 {
            info!(terminated, "Shutdown hooks terminated executions on exit");
        }
    }
}

/// Installs the process-level last-resort hooks.
///
/// SIGINT and SIGTERM run the global hooks and exit with
/// [`SIGNAL_EXIT_CODE`]. The returned guard runs them on normal exit.
/// Installing twice is harmless.
pub fn install() -> Result<ExitGuard> {
    install_signal_handler()?;
    Ok(ExitGuard::for_hooks(ShutdownHooks::global()))
}

/// Returns true once the SIGINT/SIGTERM handler running the global hooks is
/// in place.
pub fn signal_handler_installed() -> bool {
    HANDLER_INSTALLED.load(Ordering::SeqCst)
}

/// Installs the SIGINT/SIGTERM handler running the global hooks, once.
pub(crate) fn install_signal_handler() -> Result<()> {
    if !HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        let installed = ctrlc::set_handler(|| {
            let terminated = ShutdownHooks::global().run();
            info!(terminated, "Termination signal received, shutdown hooks ran");
            std::process::exit(SIGNAL_EXIT_CODE);
        });
        if let Err(e) = installed {
            HANDLER_INSTALLED.store(false, Ordering::SeqCst);
            return Err(ExecutionError::with_cause(e, "Unable to install signal handler").into());
        }
        debug!("Installed signal handler running shutdown hooks");
    }
    Ok(())
}
