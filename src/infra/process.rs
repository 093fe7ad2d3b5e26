//! External process supervision
//!
//! Runs one external command with an explicit environment, racing its
//! completion against cancellation and an optional timeout.
//!
//! Each run spawns a single waiter task that owns the child. The supervisor
//! selects between the waiter's completion and cancellation; once cancelled, it
//! gives the child a grace period to exit on its own (the signal that cancelled
//! us has usually reached the whole process group) and only then asks the
//! waiter to kill it. The waiter is always joined before `run` returns, so the
//! child is reaped exactly once.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::defaults::{KILL_GRACE_PERIOD, MAX_CAPTURED_STDERR};

/// Process execution errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The command could not be started
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The command was started but could not be awaited
    #[error("failed waiting for '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The command exited unsuccessfully
    #[error("'{command}' {}{}", describe_exit(.code), describe_stderr(.stderr))]
    Exit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The ambient cancellation token fired
    #[error("'{command}' was cancelled")]
    Cancelled { command: String },

    /// The per-command timeout elapsed
    #[error("'{command}' timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{stderr}")
    }
}

impl ProcessError {
    /// Whether the command was interrupted by cancellation or timeout
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::TimedOut { .. })
    }

    /// Whether the command ran to completion and reported failure
    pub fn is_exit_failure(&self) -> bool {
        matches!(self, Self::Exit { .. })
    }
}

/// Where the output of external commands goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolchainOutput {
    /// Discard stdout, capture stderr for error reports
    #[default]
    Capture,
    /// Stream stdout and stderr to the terminal
    Inherit,
}

/// A single external command: program, arguments, environment and directory
///
/// The environment is exactly the one given here; nothing is inherited from
/// the current process implicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    current_dir: Option<PathBuf>,
}

impl Invocation {
    /// Create an invocation of `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
        }
    }

    /// Add an argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable, replacing any previous value
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables
    #[must_use]
    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Working directory
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    fn to_command(&self, output: ToolchainOutput) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null());

        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        match output {
            ToolchainOutput::Capture => {
                command.stdout(Stdio::null()).stderr(Stdio::piped());
            }
            ToolchainOutput::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        command
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let program = self
            .program
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| self.program.to_string_lossy());
        write!(f, "{program}")?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Final state of a child that ran to completion
struct Completion {
    status: ExitStatus,
    stderr: Vec<u8>,
}

/// Why a run stopped waiting for its command
enum Interrupt {
    Cancelled,
    TimedOut(Duration),
}

/// Runs external commands under cancellation and timeout
#[derive(Debug, Clone)]
pub struct Supervisor {
    grace_period: Duration,
    output: ToolchainOutput,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(ToolchainOutput::default())
    }
}

impl Supervisor {
    /// Create a supervisor with the default grace period
    pub fn new(output: ToolchainOutput) -> Self {
        Self {
            grace_period: KILL_GRACE_PERIOD,
            output,
        }
    }

    /// Set how long a cancelled command may keep running before it is killed
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Run `invocation` to completion
    ///
    /// Returns `Ok(())` if the command exits successfully. A `timeout` of
    /// `None` means the command is only bounded by `cancel`.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::Spawn`] if the command cannot be started
    /// - [`ProcessError::Exit`] if it exits unsuccessfully
    /// - [`ProcessError::Cancelled`] / [`ProcessError::TimedOut`] if it was
    ///   interrupted; the command is terminated before returning
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> Result<(), ProcessError> {
        let command = invocation.to_string();
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled { command });
        }

        tracing::debug!(command = %command, dir = ?invocation.get_current_dir(), "running");

        let child = invocation
            .to_command(self.output)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: command.clone(),
                source,
            })?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let mut waiter: JoinHandle<io::Result<Completion>> =
            tokio::spawn(wait_for_exit(child, kill_rx));

        let interrupt = tokio::select! {
            joined = &mut waiter => return finish(command, joined),
            () = cancel.cancelled() => Interrupt::Cancelled,
            () = expire(timeout) => Interrupt::TimedOut(timeout.unwrap_or_default()),
        };

        tokio::select! {
            _ = &mut waiter => {}
            () = tokio::time::sleep(self.grace_period) => {
                tracing::warn!(command = %command, "command did not stop after cancellation, killing it");
                let _ = kill_tx.send(());
                let _ = waiter.await;
            }
        }

        Err(match interrupt {
            Interrupt::Cancelled => ProcessError::Cancelled { command },
            Interrupt::TimedOut(timeout) => ProcessError::TimedOut { command, timeout },
        })
    }
}

/// Run a short informational command and return its standard output
///
/// Unlike [`Supervisor::run`] the command inherits the current environment.
/// It is killed if it does not finish within `timeout`.
pub async fn probe_output(
    program: &Path,
    args: &[&str],
    timeout: Duration,
) -> Result<String, ProcessError> {
    let command = Invocation::new(program).args(args.iter().copied()).to_string();

    let mut child = Command::new(program);
    child.args(args).stdin(Stdio::null()).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, child.output()).await {
        Ok(output) => output.map_err(|source| ProcessError::Spawn {
            command: command.clone(),
            source,
        })?,
        Err(_) => return Err(ProcessError::TimedOut { command, timeout }),
    };

    if !output.status.success() {
        return Err(ProcessError::Exit {
            command,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Waiter task: owns the child until it exits or is told to kill it
///
/// A dropped kill sender counts as a kill request, so abandoning a run never
/// leaves the child behind.
async fn wait_for_exit(mut child: Child, kill: oneshot::Receiver<()>) -> io::Result<Completion> {
    let mut stderr_pipe = child.stderr.take();
    let mut stderr = Vec::new();

    let status = tokio::select! {
        (status, _) = async {
            tokio::join!(child.wait(), drain(stderr_pipe.as_mut(), &mut stderr, MAX_CAPTURED_STDERR))
        } => status?,
        _ = kill => {
            child.kill().await?;
            child.wait().await?
        }
    };

    Ok(Completion { status, stderr })
}

/// Read `pipe` to the end, keeping only its last `max` bytes in `buf`
async fn drain<R>(pipe: Option<&mut R>, buf: &mut Vec<u8>, max: usize) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok(());
    };

    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > max {
            let excess = buf.len() - max;
            buf.drain(..excess);
        }
    }
}

fn finish(
    command: String,
    joined: Result<io::Result<Completion>, tokio::task::JoinError>,
) -> Result<(), ProcessError> {
    let completion = joined
        .map_err(io::Error::other)
        .and_then(|completion| completion)
        .map_err(|source| ProcessError::Wait {
            command: command.clone(),
            source,
        })?;

    if completion.status.success() {
        return Ok(());
    }

    Err(ProcessError::Exit {
        command,
        code: completion.status.code(),
        stderr: String::from_utf8_lossy(&completion.stderr).into_owned(),
    })
}
