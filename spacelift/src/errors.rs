//! Error types for spacelift.
//!
//! Every failure that crosses a public API is one of the kinds below:
//! an [`ExecutionError`] raised by a unit of work or by the engine, a
//! [`TimeoutError`] from a bounded wait, or an [`InvalidComponentError`]
//! raised by the tool registry. [`SpaceliftError`] unifies them.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Shared, clonable error cause.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Convenience result type for spacelift operations.
pub type Result<T, E = SpaceliftError> = std::result::Result<T, E>;

/// Builds an [`ExecutionError`] from a message template and its parameters.
///
/// ```rust
/// use spacelift::execution_error;
///
/// let err = execution_error!("Unable to extract {} into {}", "hello.zip", "target");
/// assert_eq!(err.message(), "Unable to extract hello.zip into target");
/// ```
#[macro_export]
macro_rules! execution_error {
    (cause = $cause:expr, $($arg:tt)+) => {
        $crate::errors::ExecutionError::with_cause($cause, format!($($arg)+))
    };
    ($($arg:tt)+) => {
        $crate::errors::ExecutionError::new(format!($($arg)+))
    };
}

/// The main error type for spacelift operations.
#[derive(Debug, Clone, Error)]
pub enum SpaceliftError {
    /// A unit of work or the engine failed.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// A bounded wait elapsed before the execution reached a terminal state.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),

    /// A component could not be registered.
    #[error("{0}")]
    InvalidComponent(#[from] InvalidComponentError),

    /// A configuration value was rejected.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Why the value was rejected.
        message: String,
    },

    /// A task or tool was requested that was never registered.
    #[error("No tool registered for '{name}'")]
    UnknownTool {
        /// The type name or alias that was looked up.
        name: String,
    },
}

impl SpaceliftError {
    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an unknown tool error.
    #[must_use]
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    /// Returns true if this error signals "still running" rather than failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns true if the execution was terminated before completing.
    #[must_use]
    pub fn is_termination(&self) -> bool {
        matches!(self, Self::Execution(err) if err.is_termination())
    }
}

/// The unifying failure kind for units of work and the engine itself.
///
/// Clonable so that the same failure can be observed by every waiter of an
/// execution; the original cause is kept behind an `Arc`.
#[derive(Clone, Error)]
#[error("{message}")]
pub struct ExecutionError {
    message: String,
    #[source]
    cause: Option<Cause>,
    terminated: bool,
}

impl ExecutionError {
    /// Creates an execution error with a message and no cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            terminated: false,
        }
    }

    /// Creates an execution error wrapping a cause.
    #[must_use]
    pub fn with_cause<E>(cause: E, message: impl Into<String>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            cause: Some(Arc::new(cause)),
            terminated: false,
        }
    }

    /// Creates an execution error whose message is taken from the cause.
    #[must_use]
    pub fn from_cause<E>(cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let message = cause.to_string();
        Self::with_cause(cause, message)
    }

    /// The error raised when waiting on an execution that was terminated.
    #[must_use]
    pub fn terminated() -> Self {
        Self {
            message: "Execution was terminated".to_string(),
            cause: None,
            terminated: true,
        }
    }

    /// Returns a new error with `context` prepended to the message.
    ///
    /// The cause chain is preserved.
    #[must_use]
    pub fn prepend_message(&self, context: impl fmt::Display) -> Self {
        Self {
            message: format!("{context}. {}", self.message),
            cause: self.cause.clone(),
            terminated: self.terminated,
        }
    }

    /// Returns the formatted message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the original cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// Returns true if this error reports a terminated execution.
    #[must_use]
    pub fn is_termination(&self) -> bool {
        self.terminated
    }
}

impl fmt::Debug for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionError")
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(ToString::to_string))
            .field("terminated", &self.terminated)
            .finish()
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let cause: Box<dyn StdError + Send + Sync + 'static> = err.into();
        Self {
            message,
            cause: Some(Arc::from(cause)),
            terminated: false,
        }
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        Self::from_cause(err)
    }
}

/// Raised when a bounded wait elapses; the computation may still be running.
#[derive(Debug, Clone, Error)]
#[error("{message} (waited {waited:?})")]
pub struct TimeoutError {
    /// Description of what was being waited for.
    pub message: String,
    /// How long the caller waited.
    pub waited: Duration,
}

impl TimeoutError {
    /// Creates a new timeout error.
    #[must_use]
    pub fn new(message: impl Into<String>, waited: Duration) -> Self {
        Self {
            message: message.into(),
            waited,
        }
    }
}

/// Raised by the registry when a component cannot be registered.
#[derive(Debug, Clone, Error)]
#[error("Unable to register {component}: {cause}")]
pub struct InvalidComponentError {
    /// Type name of the rejected component.
    pub component: String,
    /// Why it was rejected.
    #[source]
    pub cause: ExecutionError,
}

impl InvalidComponentError {
    /// Creates a new invalid component error.
    #[must_use]
    pub fn new(component: impl Into<String>, cause: ExecutionError) -> Self {
        Self {
            component: component.into(),
            cause,
        }
    }
}
