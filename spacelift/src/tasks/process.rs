//! A task launching an external process.

use super::Task;
use crate::errors::ExecutionError;
use crate::execution::TaskContext;
use crate::execution_error;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const REAP_INTERVAL: Duration = Duration::from_millis(20);

/// What a finished process left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Exit status, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Lines written to standard output.
    pub stdout: Vec<String>,
    /// Lines written to standard error.
    pub stderr: Vec<String>,
}

/// Runs a command and collects its output.
///
/// The environment and working directory of the execution apply first;
/// values set on the task itself win. When the execution is terminated the
/// child is killed.
#[derive(Debug, Clone)]
pub struct ProcessTask {
    program: OsString,
    args: Vec<OsString>,
    env: HashMap<String, String>,
    working_directory: Option<PathBuf>,
    allowed_exit_codes: Vec<i32>,
}

impl ProcessTask {
    /// Creates a task running `program`.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_directory: None,
            allowed_exit_codes: vec![0],
        }
    }

    /// Appends one argument.
    pub fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for this process only.
    pub fn env(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Overrides the working directory of the execution.
    pub fn working_directory(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Exit codes treated as success. Defaults to `[0]`; empty accepts any.
    pub fn allowed_exit_codes(&mut self, codes: impl IntoIterator<Item = i32>) -> &mut Self {
        self.allowed_exit_codes = codes.into_iter().collect();
        self
    }

    fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self, ctx: &TaskContext) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(ctx.environment())
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = self.working_directory.as_deref().or(ctx.working_directory()) {
            command.current_dir(dir);
        }
        command
    }
}

impl Task for ProcessTask {
    type Input = ();
    type Output = ProcessOutput;

    fn process(&mut self, _input: (), ctx: &TaskContext) -> Result<ProcessOutput, ExecutionError> {
        ctx.check_cancelled()?;
        let command_line = self.command_line();

        let mut child = self
            .command(ctx)
            .spawn()
            .map_err(|e| execution_error!(cause = e, "Unable to start process {}", command_line))?;
        debug!(execution_id = %ctx.execution_id(), pid = child.id(), command = %command_line, "Process started");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let child = Arc::new(Mutex::new(child));

        let killer = Arc::clone(&child);
        ctx.token().on_cancel(move || {
            if let Err(e) = killer.lock().kill() {
                warn!(error = %e, "Unable to kill terminated process");
            }
        });

        let stderr_reader = std::thread::spawn(move || read_lines(stderr));
        let stdout = read_lines(stdout);
        let stderr = stderr_reader.join().unwrap_or_default();

        let status = loop {
            let exited = child
                .lock()
                .try_wait()
                .map_err(|e| execution_error!(cause = e, "Unable to wait for process {}", command_line))?;
            if let Some(status) = exited {
                break status;
            }
            if ctx.token().wait_timeout(REAP_INTERVAL) {
                let mut child = child.lock();
                let _ = child.kill();
                break child.wait().map_err(|e| {
                    execution_error!(cause = e, "Unable to wait for process {}", command_line)
                })?;
            }
        };
        ctx.check_cancelled()?;

        let output = ProcessOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        };
        let accepted = self.allowed_exit_codes.is_empty()
            || output
                .exit_code
                .is_some_and(|code| self.allowed_exit_codes.contains(&code));
        if !accepted {
            return Err(execution_error!(
                "Process {} exited with status {}, allowed are {:?}",
                command_line,
                output.exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()),
                self.allowed_exit_codes
            ));
        }
        Ok(output)
    }

    fn name(&self) -> &str {
        "ProcessTask"
    }
}

fn read_lines<R: Read>(stream: Option<R>) -> Vec<String> {
    stream
        .map(|stream| BufReader::new(stream).lines().map_while(Result::ok).collect())
        .unwrap_or_default()
}
