//! Supervisor runner for one codex invocation.
//!
//! This module connects the process spawner, the line reader, the event
//! classifier, the session log and the renderer. One call to
//! [`Supervisor::run_turn`] owns exactly one child from spawn to exit.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::ChildStdout;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::cli::{
    classify_line, exit_parts, CodexProcess, CodexProcessBuilder, Line, LineReader, SpawnError,
    StreamLine, DEFAULT_BINARY,
};
use crate::config::TranscriptConfig;
use crate::display::Renderer;
use crate::session::{SessionIdentity, SessionLog};

use super::keys::EscapeWatcher;

/// Default time a cancelled child gets between SIGTERM and SIGKILL.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long stdout is still read once the child has exited. A background
/// descendant can keep the pipe open long after codex is gone.
const EXIT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// What to ask codex for in one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub prompt: String,
    /// Session to continue, or `None` for a fresh session.
    pub resume: Option<String>,
}

impl TurnRequest {
    #[must_use]
    pub fn fresh(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            resume: None,
        }
    }

    #[must_use]
    pub fn resume(session_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            resume: Some(session_id.into()),
        }
    }

    /// `exec` or `resume`, used in log file names.
    #[must_use]
    pub fn subcommand(&self) -> &'static str {
        if self.resume.is_some() {
            "resume"
        } else {
            "exec"
        }
    }
}

/// How the child ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    /// The child ran and exited.
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// The child could not be started or waited on.
    Failed { message: String },
}

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub status: TurnStatus,
    /// Session id known at the end of the turn.
    pub session_id: Option<String>,
    /// A cancel key was pressed during the turn.
    pub aborted: bool,
    /// Where the raw log ended up, if one was written.
    pub log_path: Option<PathBuf>,
}

impl TurnOutcome {
    /// Process exit code this outcome maps to.
    ///
    /// A cancelled turn is not a failure by itself and maps to 0.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.aborted {
            return 0;
        }
        match self.status {
            TurnStatus::Exited { code: Some(code), .. } => code,
            TurnStatus::Exited { .. } | TurnStatus::Failed { .. } => 1,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.exit_code() != 0
    }
}

/// Session log that degrades to nothing after the first I/O error.
struct LogSlot {
    log: Option<SessionLog>,
}

impl LogSlot {
    async fn open(dir: &Path, request: &TurnRequest, session_id: Option<&str>) -> Self {
        match SessionLog::open(dir, request.subcommand(), &request.prompt, session_id).await {
            Ok(log) => Self { log: Some(log) },
            Err(e) => {
                tracing::warn!(error = %e, "Session log unavailable for this turn");
                Self { log: None }
            }
        }
    }

    async fn write_line(&mut self, raw: &[u8]) {
        let failed = match self.log.as_mut() {
            Some(log) => log.write_line(raw).await.err(),
            None => None,
        };
        if let Some(e) = failed {
            tracing::warn!(error = %e, "Stopped writing session log");
            self.log = None;
        }
    }

    async fn record_thread(&mut self, session_id: &str) {
        let failed = match self.log.as_mut() {
            Some(log) => log.record_thread(session_id).await.err(),
            None => None,
        };
        if let Some(e) = failed {
            tracing::warn!(error = %e, "Stopped writing session log");
            self.log = None;
        }
    }

    async fn finalize(self, session_id: Option<&str>) -> Option<PathBuf> {
        let log = self.log?;
        match log.finalize(session_id).await {
            Ok(path) => {
                tracing::debug!(path = %path.display(), "Session log closed");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to close session log");
                None
            }
        }
    }
}

/// SIGTERM-then-SIGKILL bookkeeping for a cancelled child.
#[derive(Debug, Default)]
struct Termination {
    requested: bool,
    kill_at: Option<Instant>,
}

impl Termination {
    fn request<O: Write, E: Write>(
        &mut self,
        process: &mut CodexProcess,
        renderer: &mut Renderer<O, E>,
        timeout: Duration,
    ) {
        self.requested = true;
        renderer.cancel_requested();
        if let Err(e) = process.request_terminate() {
            tracing::warn!(error = %e, "Failed to signal codex");
        }
        self.kill_at = Some(Instant::now() + timeout);
    }

    fn escalate(&mut self, process: &mut CodexProcess) {
        self.kill_at = None;
        tracing::warn!("codex did not stop after SIGTERM, killing");
        if let Err(e) = process.start_kill() {
            tracing::warn!(error = %e, "Failed to kill codex");
        }
    }

    fn deadline(&self) -> Instant {
        self.kill_at.unwrap_or_else(Instant::now)
    }
}

/// Runs codex invocations and streams their output.
#[derive(Debug, Clone)]
pub struct Supervisor {
    program: String,
    leading_args: Vec<OsString>,
    log_dir: PathBuf,
    terminate_timeout: Duration,
}

impl Supervisor {
    /// Supervisor running `codex` and logging into `log_dir`.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: DEFAULT_BINARY.to_string(),
            leading_args: Vec::new(),
            log_dir: log_dir.into(),
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
        }
    }

    /// Supervisor configured from a loaded config.
    #[must_use]
    pub fn from_config(config: &TranscriptConfig) -> Self {
        Self::new(config.resolved_log_dir())
            .program(config.binary.clone())
            .terminate_timeout(config.terminate_timeout())
    }

    /// Run a different program instead of `codex`.
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments placed before the codex arguments.
    #[must_use]
    pub fn leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Process builder for a request.
    #[must_use]
    pub fn builder_for(&self, request: &TurnRequest) -> CodexProcessBuilder {
        let builder = CodexProcessBuilder::new(request.prompt.clone())
            .program(self.program.clone())
            .leading_args(self.leading_args.clone());
        match &request.resume {
            Some(session_id) => builder.resume(session_id.clone()),
            None => builder,
        }
    }

    /// Run one turn with the cancel keys watched when `watch_keys` is set.
    ///
    /// The keypress mode lasts exactly as long as the child.
    pub async fn run_watched<O: Write, E: Write>(
        &self,
        renderer: &mut Renderer<O, E>,
        request: &TurnRequest,
        watch_keys: bool,
    ) -> TurnOutcome {
        let cancel = CancellationToken::new();
        let watcher = if watch_keys {
            EscapeWatcher::arm(cancel.clone())
        } else {
            None
        };

        let outcome = self.run_turn(renderer, request, &cancel).await;

        if let Some(watcher) = watcher {
            watcher.disarm();
        }
        outcome
    }

    /// Spawn codex for `request` and stream its output until it exits.
    ///
    /// Cancelling `cancel` sends SIGTERM, escalating to SIGKILL after the
    /// terminate timeout. Never returns an error: spawn and wait failures are
    /// reported through the renderer and folded into [`TurnStatus::Failed`].
    pub async fn run_turn<O: Write, E: Write>(
        &self,
        renderer: &mut Renderer<O, E>,
        request: &TurnRequest,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let mut identity = SessionIdentity::from_option(request.resume.clone());
        let mut log = LogSlot::open(&self.log_dir, request, identity.get()).await;

        let builder = self.builder_for(request);
        let mut process = match CodexProcess::spawn(&builder) {
            Ok(process) => process,
            Err(e) => return Self::fail(renderer, log, identity, &e).await,
        };
        let Some(stdout) = process.take_stdout() else {
            return Self::fail(renderer, log, identity, &SpawnError::NoStdout).await;
        };
        tracing::info!(pid = ?process.id(), subcommand = request.subcommand(), "codex started");

        let mut lines = LineReader::new(stdout);
        let mut termination = Termination::default();
        let mut exited = None;

        loop {
            tokio::select! {
                () = cancel.cancelled(), if !termination.requested => {
                    termination.request(&mut process, renderer, self.terminate_timeout);
                }
                () = sleep_until(termination.deadline()), if termination.kill_at.is_some() => {
                    termination.escalate(&mut process);
                }
                status = process.wait() => {
                    exited = Some(status);
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        Self::handle_line(renderer, &mut log, &mut identity, &line).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read codex stdout");
                        break;
                    }
                },
            }
        }

        let status = if let Some(status) = exited {
            Self::drain(renderer, &mut log, &mut identity, &mut lines).await;
            status
        } else {
            loop {
                tokio::select! {
                    () = cancel.cancelled(), if !termination.requested => {
                        termination.request(&mut process, renderer, self.terminate_timeout);
                    }
                    () = sleep_until(termination.deadline()), if termination.kill_at.is_some() => {
                        termination.escalate(&mut process);
                    }
                    status = process.wait() => break status,
                }
            }
        };

        let status = match status {
            Ok(status) => {
                let (code, signal) = exit_parts(status);
                TurnStatus::Exited { code, signal }
            }
            Err(e) => TurnStatus::Failed {
                message: e.to_string(),
            },
        };

        // Read after exit: a key pressed while the child was already exiting
        // still counts as a cancel.
        let aborted = cancel.is_cancelled();
        tracing::info!(?status, aborted, "codex finished");

        let log_path = log.finalize(identity.get()).await;
        let outcome = TurnOutcome {
            status,
            session_id: identity.into_inner(),
            aborted,
            log_path,
        };
        renderer.report_exit(&outcome);
        outcome
    }

    /// Read what the exited child left in the pipe, for a bounded time.
    async fn drain<O: Write, E: Write>(
        renderer: &mut Renderer<O, E>,
        log: &mut LogSlot,
        identity: &mut SessionIdentity,
        lines: &mut LineReader<ChildStdout>,
    ) {
        let deadline = Instant::now() + EXIT_DRAIN_TIMEOUT;
        loop {
            match tokio::time::timeout_at(deadline, lines.next_line()).await {
                Ok(Ok(Some(line))) => Self::handle_line(renderer, log, identity, &line).await,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Failed to read codex stdout");
                    break;
                }
                Err(_) => {
                    tracing::debug!("stdout still open after codex exited, not waiting for it");
                    break;
                }
            }
        }
    }

    async fn handle_line<O: Write, E: Write>(
        renderer: &mut Renderer<O, E>,
        log: &mut LogSlot,
        identity: &mut SessionIdentity,
        received: &Line,
    ) {
        log.write_line(received.raw()).await;
        let line = classify_line(&received.text());

        if let StreamLine::Event(event) = &line {
            if let Some(thread_id) = event.thread_id() {
                if identity.fix(thread_id) {
                    tracing::info!(session_id = thread_id, "Session id established");
                    log.record_thread(thread_id).await;
                }
            }
        }

        renderer.render_line(&line);
    }

    async fn fail<O: Write, E: Write>(
        renderer: &mut Renderer<O, E>,
        log: LogSlot,
        identity: SessionIdentity,
        error: &SpawnError,
    ) -> TurnOutcome {
        tracing::error!(error = %error, "Failed to start codex");
        let log_path = log.finalize(identity.get()).await;
        let outcome = TurnOutcome {
            status: TurnStatus::Failed {
                message: error.to_string(),
            },
            session_id: identity.into_inner(),
            aborted: false,
            log_path,
        };
        renderer.report_exit(&outcome);
        outcome
    }
}
