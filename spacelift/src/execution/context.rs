//! Context handed to every unit of work.

use crate::cancellation::CancellationToken;
use crate::errors::ExecutionError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Per-execution view of the service.
///
/// Environment and working directory are snapshotted when the work is
/// submitted, so later changes to the service do not affect it.
#[derive(Debug, Clone)]
pub struct TaskContext {
    execution_id: Uuid,
    token: Arc<CancellationToken>,
    environment: Arc<HashMap<String, String>>,
    working_directory: Option<PathBuf>,
}

impl TaskContext {
    pub(crate) fn new(
        execution_id: Uuid,
        token: Arc<CancellationToken>,
        environment: HashMap<String, String>,
        working_directory: Option<PathBuf>,
    ) -> Self {
        Self {
            execution_id,
            token,
            environment: Arc::new(environment),
            working_directory,
        }
    }

    /// A context not bound to any execution, for running tasks synchronously.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(
            Uuid::new_v4(),
            Arc::new(CancellationToken::new()),
            HashMap::new(),
            None,
        )
    }

    /// Returns a copy of this context with an environment override.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.environment).insert(name.into(), value.into());
        self
    }

    /// Returns a copy of this context with a working directory.
    #[must_use]
    pub fn with_working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Identifier of the execution running this work.
    #[must_use]
    pub const fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// The execution's cancellation token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Returns true once the execution was terminated.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fails with a termination error once the execution was terminated.
    pub fn check_cancelled(&self) -> Result<(), ExecutionError> {
        if self.is_cancelled() {
            Err(ExecutionError::terminated())
        } else {
            Ok(())
        }
    }

    /// Environment variable overrides.
    #[must_use]
    pub fn environment(&self) -> &HashMap<String, String> {
        &self.environment
    }

    /// Working directory for launched processes.
    #[must_use]
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }
}
