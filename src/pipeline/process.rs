//! External-process invocation with full output capture.
//!
//! Every stage command is run to completion with stdout and stderr captured
//! fully before success is evaluated; there is no streaming-based early
//! classification. A per-stage timeout and a cancellation signal both
//! terminate the child process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::debug;

/// Errors from spawning or supervising an external process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command file '{0}' is empty or has no command tokens")]
    EmptyCommandFile(PathBuf),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Process was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully resolved command line for one external invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Working directory for the child process.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Creates a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Builds a spec from a flag-per-line command-argument file.
    ///
    /// Each non-empty line that is not a `#` comment contributes its
    /// whitespace-separated tokens to the command line; the first token is
    /// the program. No shell quoting is interpreted.
    pub fn from_arg_file(path: &Path) -> Result<Self, ProcessError> {
        let content = std::fs::read_to_string(path)?;
        let mut tokens = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .flat_map(str::split_whitespace)
            .map(str::to_string);

        let program = tokens
            .next()
            .ok_or_else(|| ProcessError::EmptyCommandFile(path.to_path_buf()))?;

        Ok(Self {
            program,
            args: tokens.collect(),
            cwd: None,
        })
    }

    /// The command line as a single loggable string.
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a completed external process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code, or -1 when terminated by a signal.
    pub exit_code: i32,
    /// Full captured standard output.
    pub stdout: String,
    /// Full captured standard error.
    pub stderr: String,
}

impl ProcessOutput {
    /// Returns true if the process exited with status 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a command to completion, capturing both output streams.
///
/// The child is killed when `timeout` elapses or when `cancel` flips to
/// `true`; both cases surface as errors without partial output.
pub async fn run(
    spec: &CommandSpec,
    timeout: Duration,
    mut cancel: watch::Receiver<bool>,
) -> Result<ProcessOutput, ProcessError> {
    debug!("Executing: {}", spec.display_line());

    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    // Drain both pipes concurrently so a chatty child never blocks on a full
    // pipe buffer while we wait for it to exit.
    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    enum WaitOutcome {
        Exited(std::io::Result<std::process::ExitStatus>),
        TimedOut,
        Cancelled,
    }

    let outcome = tokio::select! {
        status = child.wait() => WaitOutcome::Exited(status),
        _ = tokio::time::sleep(timeout) => WaitOutcome::TimedOut,
        _ = cancelled(&mut cancel) => WaitOutcome::Cancelled,
    };

    let status = match outcome {
        WaitOutcome::Exited(status) => status?,
        WaitOutcome::TimedOut => {
            child.start_kill().ok();
            let _ = child.wait().await;
            return Err(ProcessError::Timeout(timeout));
        }
        WaitOutcome::Cancelled => {
            child.start_kill().ok();
            let _ = child.wait().await;
            return Err(ProcessError::Cancelled);
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(ProcessOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

async fn read_stream<R: AsyncReadExt + Unpin>(reader: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_string(&mut buf).await;
    }
    buf
}

/// Resolves once the cancel flag flips to true; pends forever if the sender
/// is dropped without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
