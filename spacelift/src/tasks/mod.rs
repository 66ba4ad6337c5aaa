//! Tasks: typed units of work and their composition.
//!
//! A [`Task`] maps one input to one output. Tasks are composed with
//! [`TaskExt::then_with`] into a [`Chain`], which is again a task, so
//! pipelines of any length stay type checked end to end. [`DynTask`] erases
//! the types for pipelines assembled from names at runtime.

mod chain;
mod dynamic;
mod fn_task;
mod inject;
mod process;
mod task;

pub use chain::Chain;
pub use dynamic::{AnyValue, DynChain, DynTask, ErasedTask, TypeInfo};
pub use fn_task::FnTask;
pub use inject::InjectTask;
pub use process::{ProcessOutput, ProcessTask};
pub use task::{Task, TaskExt};
