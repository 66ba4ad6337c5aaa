//! # Spacelift
//!
//! Composable task chains with asynchronous, timeout-aware executions.
//!
//! Spacelift provides:
//!
//! - **Typed task chains**: compose units of work whose output feeds the next input
//! - **Executions**: submit work to a shared pool and wait, poll or terminate it
//! - **Scheduling and polling**: delayed work and repeat-until-satisfied loops
//! - **Tool registry**: resolve tools by type or by alias, with link-time discovery
//! - **Shutdown safety**: abandoned executions are terminated when the process exits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacelift::prelude::*;
//!
//! let spacelift = Spacelift::global()?;
//! let execution = spacelift
//!     .task_from::<_, DownloadTool>(url)?
//!     .then::<UnzipTool>()?
//!     .configure(|unzip| unzip.target("/tmp/out"))
//!     .execute();
//!
//! let files = execution.wait_timeout(Duration::from_secs(30))?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod errors;
pub mod execution;
pub mod logging;
mod spacelift;
pub mod tasks;
pub mod testing;
pub mod tools;

pub use crate::spacelift::{Pipeline, Spacelift};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, ShutdownHooks};
    pub use crate::errors::{
        ExecutionError, InvalidComponentError, SpaceliftError, TimeoutError,
    };
    pub use crate::execution::{
        Execution, ExecutionCondition, ExecutionConfig, ExecutionService,
        ExecutionState, PollPolicy, TaskContext,
    };
    pub use crate::logging::{init_tracing, LogFormat};
    pub use crate::spacelift::{Pipeline, Spacelift};
    pub use crate::tasks::{
        Chain, DynChain, DynTask, FnTask, InjectTask, ProcessTask, Task, TaskExt,
    };
    pub use crate::tools::{Tool, ToolRegistry};
}
