//! Tests for top-level orchestration.

use clap::Parser;
use codex_transcript::app::run_with;
use codex_transcript::args::Cli;

use super::{fake_agent, rendered, test_renderer};

fn invocation(args: &[&str]) -> codex_transcript::args::Invocation {
    Cli::try_parse_from(std::iter::once("codex-transcript").chain(args.iter().copied()))
        .unwrap()
        .invocation()
}

#[tokio::test]
async fn single_shot_exit_code_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = fake_agent(dir.path(), "exit 4\n");
    let mut renderer = test_renderer();
    let input: &[u8] = b"";

    let code = run_with(invocation(&["exec", "do", "it"]), supervisor, &mut renderer, input, false)
        .await
        .unwrap();

    assert_eq!(code, 4);
    let (_, diag) = rendered(&renderer);
    assert!(diag.contains("[codex-transcript]"), "{diag}");
    assert!(diag.contains("mode="), "{diag}");
    assert!(diag.contains("codex exited with code 4"), "{diag}");
}

#[tokio::test]
async fn single_shot_resume_shows_session_in_banner() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = fake_agent(dir.path(), "exit 0\n");
    let mut renderer = test_renderer();
    let input: &[u8] = b"";

    let code = run_with(
        invocation(&["resume", "th-77", "again"]),
        supervisor,
        &mut renderer,
        input,
        false,
    )
    .await
    .unwrap();

    assert_eq!(code, 0);
    let (_, diag) = rendered(&renderer);
    assert!(diag.contains("resume"), "{diag}");
    assert!(diag.contains("th-77"), "{diag}");
}

#[tokio::test]
async fn interactive_mode_exits_zero_despite_failures() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = fake_agent(dir.path(), "exit 5\n");
    let mut renderer = test_renderer();
    let input: &[u8] = b"try this\nquit\n";

    let code = run_with(invocation(&["exec"]), supervisor, &mut renderer, input, false)
        .await
        .unwrap();

    assert_eq!(code, 0);
    let (out, diag) = rendered(&renderer);
    assert!(out.contains("codex> "));
    assert!(diag.contains("interactive"), "{diag}");
    assert!(diag.contains("codex exited with code 5"), "{diag}");
    assert!(diag.contains("last session: none"), "{diag}");
}
