//! Tools: tasks registered under names.
//!
//! This module provides:
//! - the [`Tool`] trait, a task with aliases
//! - the [`ToolRegistry`] resolving tools by type or alias
//! - link-time [`discovery`] of the service and of tool groups

pub mod discovery;
mod registry;
mod tool;

pub use discovery::{ServiceProvider, ToolRegistrar};
pub use registry::{ToolDescriptor, ToolRegistry};
pub use tool::Tool;
