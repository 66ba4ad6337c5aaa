//! Tasks addressable by name.

use crate::tasks::Task;

/// A task that can be looked up in a [`ToolRegistry`](super::ToolRegistry)
/// by one of its aliases.
///
/// Aliases belong to the type, not to an instance. They are case sensitive
/// and must not be empty; a tool without aliases cannot be registered.
///
/// ```rust
/// use spacelift::errors::ExecutionError;
/// use spacelift::execution::TaskContext;
/// use spacelift::tasks::Task;
/// use spacelift::tools::Tool;
///
/// #[derive(Default)]
/// struct Unzip;
///
/// impl Task for Unzip {
///     type Input = String;
///     type Output = Vec<String>;
///
///     fn process(&mut self, archive: String, _ctx: &TaskContext) -> Result<Vec<String>, ExecutionError> {
///         Ok(vec![archive])
///     }
/// }
///
/// impl Tool for Unzip {
///     fn aliases() -> &'static [&'static str] {
///         &["unzip", "extract"]
///     }
/// }
/// ```
pub trait Tool: Task {
    /// Names this tool is registered under.
    fn aliases() -> &'static [&'static str]
    where
        Self: Sized;
}
