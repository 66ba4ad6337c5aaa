//! Asynchronous execution of units of work.
//!
//! [`ExecutionService`] owns the worker pools and is the only producer of
//! [`Execution`] handles.

mod condition;
mod config;
mod context;
mod handle;
mod scheduler;
mod service;

pub use condition::{ExecutionCondition, PollPolicy};
pub use config::ExecutionConfig;
pub use context::TaskContext;
pub use handle::{Execution, ExecutionState};
pub use service::ExecutionService;
