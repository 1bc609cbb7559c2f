//! codex process spawning and control.
//!
//! This module provides a builder for the `codex exec` command line and a
//! handle for the running child. The agent flags are fixed; only the
//! program, the prompt and the resume target vary.

use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStdout, Command};

/// Default program name looked up on `PATH`.
pub const DEFAULT_BINARY: &str = "codex";

/// Flags always passed after the `exec` subcommand.
pub const EXEC_FLAGS: &[&str] = &["--json", "--skip-git-repo-check"];

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The binary was not found.
    #[error("codex binary not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied running {0}")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The child was spawned without a stdout pipe.
    #[error("Process stdout not available")]
    NoStdout,
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Builder for one `codex exec` invocation.
#[derive(Debug, Clone)]
pub struct CodexProcessBuilder {
    program: String,
    leading_args: Vec<OsString>,
    prompt: String,
    resume_session: Option<String>,
}

impl CodexProcessBuilder {
    /// Create a new builder with the given prompt.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            program: DEFAULT_BINARY.to_string(),
            leading_args: Vec::new(),
            prompt: prompt.into(),
            resume_session: None,
        }
    }

    /// Run a different program instead of `codex`.
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments placed before the codex arguments.
    ///
    /// Lets a wrapper (for example `sh script.sh`) stand in for the binary.
    #[must_use]
    pub fn leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Resume an existing session.
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume_session = Some(session_id.into());
        self
    }

    /// Get the prompt.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Get the program that will be spawned.
    #[must_use]
    pub fn get_program(&self) -> &str {
        &self.program
    }

    /// Build the codex command-line arguments.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        args.extend(EXEC_FLAGS.iter().map(|s| (*s).to_string()));

        if let Some(session_id) = &self.resume_session {
            args.push("resume".to_string());
            args.push(session_id.clone());
        }

        args.push(self.prompt.clone());
        args
    }

    /// Render the full command line for diagnostics.
    #[must_use]
    pub fn display_command(&self) -> String {
        let mut parts = vec![shell_escape::escape(self.program.as_str().into()).into_owned()];
        parts.extend(
            self.leading_args
                .iter()
                .map(|a| shell_escape::escape(a.to_string_lossy()).into_owned()),
        );
        parts.extend(
            self.build_args()
                .into_iter()
                .map(|a| shell_escape::escape(a.into()).into_owned()),
        );
        parts.join(" ")
    }
}

/// A running codex process.
#[derive(Debug)]
pub struct CodexProcess {
    child: Child,
}

impl CodexProcess {
    /// Spawn the process described by `builder`.
    ///
    /// Stdin and stderr are inherited from this process; stdout is piped.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(builder: &CodexProcessBuilder) -> Result<Self, SpawnError> {
        let mut cmd = Command::new(&builder.program);
        cmd.args(&builder.leading_args)
            .args(builder.build_args())
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        tracing::debug!(command = %builder.display_command(), "Spawning codex");
        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(&builder.program, e))?;

        Ok(Self { child })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Ask the process to stop.
    ///
    /// On Unix this sends SIGTERM and returns immediately. Elsewhere it
    /// falls back to an immediate kill.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    pub fn request_terminate(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let Some(pid) = self.id() else {
                return Ok(());
            };
            let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            kill(nix_pid, Signal::SIGTERM).map_err(std::io::Error::from)
        }

        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }

    /// Forcefully kill the process without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}

/// Human-readable name for a signal number, e.g. `SIGTERM`.
#[must_use]
pub fn signal_name(signal: i32) -> String {
    #[cfg(unix)]
    {
        nix::sys::signal::Signal::try_from(signal)
            .map_or_else(|_| format!("signal {signal}"), |s| s.as_str().to_string())
    }

    #[cfg(not(unix))]
    {
        format!("signal {signal}")
    }
}

/// Split an exit status into `(code, signal)`.
#[must_use]
pub fn exit_parts(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        (status.code(), status.signal())
    }

    #[cfg(not(unix))]
    {
        (status.code(), None)
    }
}
