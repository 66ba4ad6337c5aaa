//! Configuration for the execution service.

use crate::errors::{Result, SpaceliftError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration of the worker pools and of the ambient process settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound of the growable pool used by `execute`.
    #[serde(default = "default_max_pool_threads")]
    pub max_pool_threads: usize,
    /// Idle pool threads are reclaimed after this many milliseconds.
    #[serde(default = "default_idle_keep_alive_ms")]
    pub idle_keep_alive_ms: u64,
    /// Prefix of worker thread names.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Environment variable overrides for process-launching tasks.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Working directory for process-launching tasks.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
}

fn default_max_pool_threads() -> usize {
    512
}

fn default_idle_keep_alive_ms() -> u64 {
    60_000
}

fn default_thread_name_prefix() -> String {
    "spacelift".to_string()
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_pool_threads: default_max_pool_threads(),
            idle_keep_alive_ms: default_idle_keep_alive_ms(),
            thread_name_prefix: default_thread_name_prefix(),
            environment: HashMap::new(),
            working_directory: None,
        }
    }
}

impl ExecutionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            SpaceliftError::invalid_argument(format!("Malformed execution configuration: {e}"))
        })
    }

    /// Sets the pool size cap.
    #[must_use]
    pub fn with_max_pool_threads(mut self, threads: usize) -> Self {
        self.max_pool_threads = threads;
        self
    }

    /// Sets the idle keep-alive.
    #[must_use]
    pub fn with_idle_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.idle_keep_alive_ms = u64::try_from(keep_alive.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Adds an environment variable override.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Returns the idle keep-alive as a duration.
    #[must_use]
    pub const fn idle_keep_alive(&self) -> Duration {
        Duration::from_millis(self.idle_keep_alive_ms)
    }
}
