//! Colored transcript rendering for codex output.
//!
//! [`Renderer`] turns classified stream lines into terminal output. The
//! transcript goes to one writer (stdout) and status notes to another
//! (stderr). Its only state is [`RenderState`]; one renderer is created per
//! session and reused across turns.

use std::io::{self, Stderr, Stdout, Write};

use owo_colors::OwoColorize;

use crate::cli::{
    AgentEvent, ChangeKind, CommandExecution, FileChange, StreamLine, ThreadItem, TodoEntry,
};
use crate::supervisor::{TurnOutcome, TurnStatus};

/// Name shown in the startup banner.
pub const RENDERER_NAME: &str = "codex-transcript";

/// Leading lines of command output shown before the rest is summarised.
pub const OUTPUT_PREVIEW_LINES: usize = 8;

/// Prompt shown by the interactive loop.
pub const PROMPT_MARKER: &str = "codex> ";

/// Rendering switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Print `reasoning` items. Off by default.
    pub show_reasoning: bool,
}

/// Counters a renderer carries between events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderState {
    /// Turns seen so far (1-based once the first turn starts).
    pub turn_count: u32,
    pub thread_banner_shown: bool,
    pub startup_banner_shown: bool,
}

/// Display label for a file change kind.
#[must_use]
pub fn change_label(kind: &ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Add => "Added",
        ChangeKind::Update => "Edited",
        ChangeKind::Delete => "Deleted",
        ChangeKind::Other(_) => "Changed",
    }
}

/// Exit annotation for a command, `?` while the code is unknown.
#[must_use]
pub fn exit_code_label(exit_code: Option<i64>) -> String {
    exit_code.map_or_else(|| "exit ?".to_string(), |code| format!("exit {code}"))
}

/// Whether a command should be styled as successful.
///
/// An unknown exit code counts as success.
#[must_use]
pub fn command_succeeded(exit_code: Option<i64>) -> bool {
    exit_code.map_or(true, |code| code == 0)
}

/// The visible part of a command's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPreview<'a> {
    pub lines: Vec<&'a str>,
    pub omitted: usize,
}

/// Keep the first `cap` lines of `output`, counting the rest.
///
/// One trailing newline is ignored so `"a\nb\n"` is two lines.
#[must_use]
pub fn output_preview(output: &str, cap: usize) -> OutputPreview<'_> {
    let body = output.strip_suffix('\n').unwrap_or(output);
    if body.is_empty() {
        return OutputPreview {
            lines: Vec::new(),
            omitted: 0,
        };
    }
    let all: Vec<&str> = body.split('\n').collect();
    let omitted = all.len().saturating_sub(cap);
    OutputPreview {
        lines: all.into_iter().take(cap).collect(),
        omitted,
    }
}

/// Terminal renderer for one session.
#[derive(Debug)]
pub struct Renderer<O = Stdout, E = Stderr> {
    out: O,
    diag: E,
    options: RenderOptions,
    state: RenderState,
}

impl Renderer {
    /// Renderer writing the transcript to stdout and notes to stderr.
    #[must_use]
    pub fn stdio(options: RenderOptions) -> Self {
        Self::with_writers(io::stdout(), io::stderr(), options)
    }
}

impl<O: Write, E: Write> Renderer<O, E> {
    /// Renderer over arbitrary writers.
    pub fn with_writers(out: O, diag: E, options: RenderOptions) -> Self {
        Self {
            out,
            diag,
            options,
            state: RenderState::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Transcript writer.
    pub fn output(&self) -> &O {
        &self.out
    }

    /// Diagnostics writer.
    pub fn diagnostics(&self) -> &E {
        &self.diag
    }

    pub fn into_writers(self) -> (O, E) {
        (self.out, self.diag)
    }

    /// Print the startup banner. Only the first call prints.
    pub fn startup_banner(&mut self, mode: &str, session_id: Option<&str>) {
        if self.state.startup_banner_shown {
            return;
        }
        self.state.startup_banner_shown = true;
        let _ = writeln!(
            self.diag,
            "{} mode={} session={}",
            format!("[{RENDERER_NAME}]").blue().bold(),
            mode.cyan(),
            session_id.unwrap_or("new").dimmed()
        );
        let _ = self.diag.flush();
    }

    /// Render one classified line.
    pub fn render_line(&mut self, line: &StreamLine) {
        match line {
            StreamLine::Event(event) => self.render_event(event),
            StreamLine::NonJson { raw, .. } => {
                let _ = writeln!(self.out, "{} {}", "[RAW]".yellow(), raw.dimmed());
            }
        }
        let _ = self.out.flush();
    }

    /// Render one protocol event.
    pub fn render_event(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::ThreadStarted { thread_id } => self.thread_banner(thread_id.as_deref()),
            AgentEvent::TurnStarted => {
                self.state.turn_count = self.state.turn_count.saturating_add(1);
                let _ = writeln!(
                    self.out,
                    "{}",
                    format!("── turn {} ──", self.state.turn_count).dimmed()
                );
            }
            AgentEvent::TurnCompleted { usage } => {
                if let Some(usage) = usage {
                    tracing::debug!(
                        input_tokens = usage.input_tokens,
                        cached_input_tokens = usage.cached_input_tokens,
                        output_tokens = usage.output_tokens,
                        "Turn completed"
                    );
                }
            }
            AgentEvent::TurnFailed { message } => {
                let _ = writeln!(
                    self.out,
                    "{} {}",
                    "[TURN FAILED]".red().bold(),
                    message.as_deref().unwrap_or("no details").red()
                );
            }
            AgentEvent::Error { message } => {
                let _ = writeln!(
                    self.out,
                    "{} {}",
                    "[ERROR]".red().bold(),
                    message.as_deref().unwrap_or("no details").red()
                );
            }
            AgentEvent::ItemStarted(_) | AgentEvent::ItemUpdated(_) => {}
            AgentEvent::ItemCompleted(item) => self.render_item(item),
            AgentEvent::Unknown { event_type } => {
                let _ = writeln!(
                    self.out,
                    "{}",
                    format!("[event:{}]", event_type.as_deref().unwrap_or("unknown")).dimmed()
                );
            }
        }
    }

    /// Render a completed item.
    pub fn render_item(&mut self, item: &ThreadItem) {
        match item {
            ThreadItem::AgentMessage { text } => {
                let _ = writeln!(self.out, "{}", "[AGENT]".green().bold());
                let _ = writeln!(self.out, "{text}");
            }
            ThreadItem::Reasoning { text } => {
                if self.options.show_reasoning {
                    let _ = writeln!(self.out, "{}", "[REASONING]".magenta().bold());
                    let _ = writeln!(self.out, "{}", text.dimmed());
                }
            }
            ThreadItem::FileChange { changes } => self.file_changes(changes),
            ThreadItem::CommandExecution(command) => self.command(command),
            ThreadItem::TodoList { items } => self.todo_list(items),
            ThreadItem::Unknown { item_type } => {
                let _ = writeln!(
                    self.out,
                    "{}",
                    format!("[item:{}]", item_type.as_deref().unwrap_or("unknown")).dimmed()
                );
            }
        }
    }

    fn thread_banner(&mut self, thread_id: Option<&str>) {
        if self.state.thread_banner_shown {
            return;
        }
        let Some(id) = thread_id else {
            return;
        };
        self.state.thread_banner_shown = true;
        let _ = writeln!(self.out, "{} {}", "[THREAD]".blue().bold(), id.cyan());
    }

    fn file_changes(&mut self, changes: &[FileChange]) {
        for change in changes {
            let label = change_label(&change.kind);
            let styled = match change.kind {
                ChangeKind::Add => label.green().to_string(),
                ChangeKind::Update => label.yellow().to_string(),
                ChangeKind::Delete => label.red().to_string(),
                ChangeKind::Other(_) => label.cyan().to_string(),
            };
            let _ = writeln!(self.out, "{} {} {}", "[FILE]".cyan().bold(), styled, change.path);
        }
    }

    fn command(&mut self, command: &CommandExecution) {
        let label = exit_code_label(command.exit_code);
        let status = if command_succeeded(command.exit_code) {
            label.green().to_string()
        } else {
            label.red().to_string()
        };
        let _ = writeln!(
            self.out,
            "{} {} ({status})",
            "[EXEC]".cyan().bold(),
            command.command.bold()
        );

        let Some(output) = command.aggregated_output.as_deref() else {
            return;
        };
        let preview = output_preview(output, OUTPUT_PREVIEW_LINES);
        for line in &preview.lines {
            let _ = writeln!(self.out, "    {}", line.dimmed());
        }
        if preview.omitted > 0 {
            let _ = writeln!(
                self.out,
                "    {}",
                format!("... ({} more lines omitted)", preview.omitted).dimmed()
            );
        }
    }

    fn todo_list(&mut self, items: &[TodoEntry]) {
        let _ = writeln!(self.out, "{}", "[PLAN]".magenta().bold());
        for item in items {
            if item.completed {
                let _ = writeln!(self.out, "  {} {}", "[x]".green(), item.text);
            } else {
                let _ = writeln!(self.out, "  {} {}", "[ ]".dimmed(), item.text);
            }
        }
    }

    /// Note that a cancel key was pressed and termination was requested.
    pub fn cancel_requested(&mut self) {
        let _ = writeln!(self.diag, "{} Stopping codex...", "[CANCEL]".yellow().bold());
        let _ = self.diag.flush();
    }

    /// Report how a turn ended. A clean exit prints nothing.
    pub fn report_exit(&mut self, outcome: &TurnOutcome) {
        match &outcome.status {
            TurnStatus::Failed { message } => {
                let _ = writeln!(
                    self.diag,
                    "{} Failed to run codex: {message}",
                    "[ERROR]".red().bold()
                );
            }
            _ if outcome.aborted => {
                let _ = writeln!(
                    self.diag,
                    "{} Turn cancelled by user",
                    "[CANCELLED]".yellow().bold()
                );
            }
            TurnStatus::Exited {
                signal: Some(signal),
                ..
            } => {
                let _ = writeln!(
                    self.diag,
                    "{} codex terminated by {}",
                    "[EXIT]".red().bold(),
                    crate::cli::signal_name(*signal)
                );
            }
            TurnStatus::Exited {
                code: Some(code), ..
            } if *code != 0 => {
                let _ = writeln!(
                    self.diag,
                    "{} codex exited with code {code}",
                    "[EXIT]".red().bold()
                );
            }
            TurnStatus::Exited { .. } => {}
        }
        let _ = self.diag.flush();
    }

    /// Interactive prompt marker, without a newline.
    pub fn prompt_marker(&mut self) {
        let _ = write!(self.out, "{}", PROMPT_MARKER.bold());
        let _ = self.out.flush();
    }

    /// Answer the interactive "show session" command.
    pub fn show_session(&mut self, session_id: Option<&str>) {
        let _ = writeln!(
            self.out,
            "{} {}",
            "[SESSION]".blue().bold(),
            session_id.unwrap_or("none")
        );
        let _ = self.out.flush();
    }

    /// Final session note when the interactive loop ends.
    pub fn session_summary(&mut self, session_id: Option<&str>) {
        let _ = writeln!(
            self.diag,
            "{} last session: {}",
            "[SESSION]".blue().bold(),
            session_id.unwrap_or("none")
        );
        let _ = self.diag.flush();
    }
}

/// Print an error that ends the program.
pub fn print_error(message: &str) {
    eprintln!("{} {message}", "[ERROR]".red().bold());
}
