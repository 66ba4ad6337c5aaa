//! Tracing subscriber setup for binaries and test harnesses embedding spacelift.

use crate::errors::{ExecutionError, Result, SpaceliftError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable single-line output.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = SpaceliftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(SpaceliftError::invalid_argument(format!(
                "Unknown log format '{other}', expected 'compact' or 'json'"
            ))),
        }
    }
}

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `default_directive` (e.g.
/// `"spacelift=info"`). Fails instead of panicking when a global subscriber
/// is already installed.
pub fn init_tracing(format: LogFormat, default_directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| {
            SpaceliftError::invalid_argument(format!(
                "Invalid log directive '{default_directive}': {e}"
            ))
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true);

    let installed = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| {
        ExecutionError::new(format!("Unable to install tracing subscriber: {e}")).into()
    })
}
