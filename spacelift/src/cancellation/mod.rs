//! Cooperative cancellation and shutdown safety net.
//!
//! This module provides:
//! - `CancellationToken` for interrupting running work
//! - `ShutdownHooks` for terminating abandoned executions on exit

mod shutdown;
mod token;

pub(crate) use shutdown::install_signal_handler;
pub use shutdown::{
    install, signal_handler_installed, ExitGuard, ShutdownHooks, Terminable, SIGNAL_EXIT_CODE,
};
pub use token::{CancelCallback, CancellationToken};
