//! Interactive multi-turn session loop.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::display::Renderer;

use super::runner::{Supervisor, TurnRequest};

/// One line of user input, interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopCommand {
    /// Nothing typed.
    Blank,
    /// `exit`, `quit`, `/exit` or `/quit`.
    Exit,
    /// `/session`: print the current session id.
    ShowSession,
    /// Anything else is sent to codex.
    Prompt(String),
}

impl LoopCommand {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed {
            "" => Self::Blank,
            "exit" | "quit" | "/exit" | "/quit" => Self::Exit,
            "/session" => Self::ShowSession,
            _ => Self::Prompt(trimmed.to_string()),
        }
    }
}

/// Reads prompts and runs one turn per prompt, keeping the session id.
///
/// The first turn without a known id starts a fresh session; later turns
/// resume whatever id the agent reported.
pub struct SessionLoop<'r, R, O: Write, E: Write> {
    supervisor: Supervisor,
    renderer: &'r mut Renderer<O, E>,
    input: R,
    session_id: Option<String>,
    watch_keys: bool,
    turns: usize,
}

impl<'r, R, O, E> SessionLoop<'r, R, O, E>
where
    R: AsyncBufRead + Unpin,
    O: Write,
    E: Write,
{
    pub fn new(supervisor: Supervisor, renderer: &'r mut Renderer<O, E>, input: R) -> Self {
        Self {
            supervisor,
            renderer,
            input,
            session_id: None,
            watch_keys: false,
            turns: 0,
        }
    }

    /// Start out resuming `session_id`.
    #[must_use]
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Arm the cancel keys for each turn.
    #[must_use]
    pub fn watch_keys(mut self, enabled: bool) -> Self {
        self.watch_keys = enabled;
        self
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Run until the user exits or input ends. Returns the last session id.
    ///
    /// Failed turns are reported and the loop continues.
    ///
    /// # Errors
    ///
    /// Returns an error only if reading input fails.
    pub async fn run(mut self) -> std::io::Result<Option<String>> {
        loop {
            self.renderer.prompt_marker();

            let mut line = String::new();
            if self.input.read_line(&mut line).await? == 0 {
                tracing::debug!("Input closed");
                break;
            }

            match LoopCommand::parse(&line) {
                LoopCommand::Blank => {}
                LoopCommand::Exit => break,
                LoopCommand::ShowSession => {
                    self.renderer.show_session(self.session_id.as_deref());
                }
                LoopCommand::Prompt(prompt) => self.run_prompt(prompt).await,
            }
        }

        self.renderer.session_summary(self.session_id.as_deref());
        tracing::info!(
            turns = self.turns,
            session_id = ?self.session_id,
            "Interactive session ended"
        );
        Ok(self.session_id)
    }

    async fn run_prompt(&mut self, prompt: String) {
        let request = match &self.session_id {
            Some(session_id) => TurnRequest::resume(session_id.clone(), prompt),
            None => TurnRequest::fresh(prompt),
        };

        let outcome = self
            .supervisor
            .run_watched(self.renderer, &request, self.watch_keys)
            .await;
        self.turns += 1;

        if outcome.is_failure() {
            tracing::debug!(exit_code = outcome.exit_code(), "Turn failed, continuing");
        }
        if self.session_id.is_none() {
            self.session_id = outcome.session_id;
        }
    }
}
