//! Top-level orchestration for one program run.

use std::io::{IsTerminal, Write};

use tokio::io::{AsyncBufRead, BufReader};

use crate::args::Invocation;
use crate::config::TranscriptConfig;
use crate::display::{RenderOptions, Renderer};
use crate::supervisor::{SessionLoop, Supervisor, TurnRequest};

/// Errors that end the program with a failure status.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Failed to read input: {0}")]
    Input(#[from] std::io::Error),
}

/// Run the invocation against the real terminal.
///
/// # Errors
///
/// Returns an error if interactive input cannot be read.
pub async fn run(invocation: Invocation, config: &TranscriptConfig) -> Result<i32, AppError> {
    let mut renderer = Renderer::stdio(RenderOptions {
        show_reasoning: config.show_reasoning,
    });
    let supervisor = Supervisor::from_config(config);
    let input = BufReader::new(tokio::io::stdin());
    let watch_keys = std::io::stdin().is_terminal();

    run_with(invocation, supervisor, &mut renderer, input, watch_keys).await
}

/// Run the invocation with explicit collaborators. Returns the exit code.
///
/// A single-shot run exits with the child's code. Interactive mode exits 0
/// once the loop ends; failed turns inside it do not change that.
///
/// # Errors
///
/// Returns an error if interactive input cannot be read.
pub async fn run_with<R, O, E>(
    invocation: Invocation,
    supervisor: Supervisor,
    renderer: &mut Renderer<O, E>,
    input: R,
    watch_keys: bool,
) -> Result<i32, AppError>
where
    R: AsyncBufRead + Unpin,
    O: Write,
    E: Write,
{
    renderer.startup_banner(&invocation.mode(), invocation.thread_id.as_deref());
    tracing::debug!(
        log_dir = %supervisor.log_dir().display(),
        interactive = invocation.interactive,
        "Starting"
    );

    match invocation.prompt {
        Some(prompt) => {
            let request = TurnRequest {
                prompt,
                resume: invocation.thread_id,
            };
            let outcome = supervisor.run_watched(renderer, &request, watch_keys).await;
            Ok(outcome.exit_code())
        }
        None => {
            SessionLoop::new(supervisor, renderer, input)
                .with_session(invocation.thread_id)
                .watch_keys(watch_keys)
                .run()
                .await?;
            Ok(0)
        }
    }
}
