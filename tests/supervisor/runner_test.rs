//! Integration tests for the supervisor runner.

use std::time::{Duration, Instant};

use codex_transcript::session::EVENTS_MARKER;
use codex_transcript::supervisor::{Supervisor, TurnRequest, TurnStatus};
use tokio_util::sync::CancellationToken;

use super::{fake_agent, log_dir, rendered, test_renderer};

const FULL_TURN: &str = r#"
printf '%s\n' '{"type":"thread.started","thread_id":"th-123"}'
printf '%s\n' '{"type":"turn.started"}'
printf '%s\n' '{"type":"item.completed","item":{"id":"i0","type":"agent_message","text":"Hello from codex"}}'
printf '%s\n' 'warning: not json'
printf '%s\n' '{"type":"item.completed","item":{"id":"i1","type":"command_execution","command":"ls","aggregated_output":"a\nb\n","exit_code":0,"status":"completed"}}'
printf '%s\n' '{"type":"turn.completed","usage":{"input_tokens":5,"cached_input_tokens":0,"output_tokens":7}}'
"#;

#[tokio::test]
async fn full_turn_renders_and_logs() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = fake_agent(dir.path(), FULL_TURN);
    let mut renderer = test_renderer();

    let outcome = supervisor
        .run_turn(&mut renderer, &TurnRequest::fresh("say hi"), &CancellationToken::new())
        .await;

    assert_eq!(
        outcome.status,
        TurnStatus::Exited {
            code: Some(0),
            signal: None
        }
    );
    assert_eq!(outcome.session_id.as_deref(), Some("th-123"));
    assert!(!outcome.aborted);
    assert_eq!(outcome.exit_code(), 0);

    let (out, diag) = rendered(&renderer);
    assert!(out.contains("[THREAD]"));
    assert!(out.contains("th-123"));
    assert!(out.contains("── turn 1 ──"));
    assert!(out.contains("[AGENT]"));
    assert!(out.contains("Hello from codex"));
    assert!(out.contains("[RAW]"));
    assert!(out.contains("warning: not json"));
    assert!(out.contains("[EXEC]"));
    assert!(out.contains("exit 0"));
    assert!(diag.is_empty(), "clean exit reports nothing: {diag}");
}

#[tokio::test]
async fn log_renamed_to_thread_id_with_verbatim_lines() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = fake_agent(dir.path(), FULL_TURN);
    let mut renderer = test_renderer();

    let outcome = supervisor
        .run_turn(&mut renderer, &TurnRequest::fresh("say hi"), &CancellationToken::new())
        .await;

    let log_path = outcome.log_path.unwrap();
    assert_eq!(log_path, log_dir(dir.path()).join("th-123.jsonl"));

    let entries: Vec<_> = std::fs::read_dir(log_dir(dir.path())).unwrap().collect();
    assert_eq!(entries.len(), 1, "fallback file should be gone");

    let content = std::fs::read_to_string(&log_path).unwrap();
    assert!(content.starts_with("# prompt: say hi\n"));

    let events: Vec<&str> = content
        .split_once(&format!("{EVENTS_MARKER}\n"))
        .unwrap()
        .1
        .lines()
        .filter(|line| !line.starts_with("# "))
        .collect();
    assert_eq!(
        events,
        vec![
            r#"{"type":"thread.started","thread_id":"th-123"}"#,
            r#"{"type":"turn.started"}"#,
            r#"{"type":"item.completed","item":{"id":"i0","type":"agent_message","text":"Hello from codex"}}"#,
            "warning: not json",
            r#"{"type":"item.completed","item":{"id":"i1","type":"command_execution","command":"ls","aggregated_output":"a\nb\n","exit_code":0,"status":"completed"}}"#,
            r#"{"type":"turn.completed","usage":{"input_tokens":5,"cached_input_tokens":0,"output_tokens":7}}"#,
        ]
    );
    assert!(content.contains("# session: th-123\n"));
}

#[tokio::test]
async fn nonzero_exit_reported() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = fake_agent(dir.path(), "echo '{\"type\":\"turn.started\"}'\nexit 3\n");
    let mut renderer = test_renderer();

    let outcome = supervisor
        .run_turn(&mut renderer, &TurnRequest::fresh("p"), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code(), 3);
    assert!(outcome.is_failure());
    assert_eq!(outcome.session_id, None);

    let (_, diag) = rendered(&renderer);
    assert!(diag.contains("codex exited with code 3"), "{diag}");

    let log_path = outcome.log_path.unwrap();
    let name = log_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.ends_with("-exec.jsonl"), "{name}");
}

#[tokio::test]
async fn resume_passes_session_and_keeps_log_name() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = fake_agent(
        dir.path(),
        r#"
printf '%s\n' "$@" > "$(dirname "$0")/args.txt"
echo '{"type":"thread.started","thread_id":"th-9"}'
"#,
    );
    let mut renderer = test_renderer();

    let outcome = supervisor
        .run_turn(
            &mut renderer,
            &TurnRequest::resume("th-9", "next step"),
            &CancellationToken::new(),
        )
        .await;

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    assert_eq!(
        args.lines().collect::<Vec<_>>(),
        vec!["exec", "--json", "--skip-git-repo-check", "resume", "th-9", "next step"]
    );
    assert_eq!(outcome.session_id.as_deref(), Some("th-9"));

    let log_path = outcome.log_path.unwrap();
    assert_eq!(log_path, log_dir(dir.path()).join("th-9.jsonl"));
    let content = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(content.matches("# session: th-9").count(), 1);
}

#[tokio::test]
async fn resume_appends_to_existing_log() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = fake_agent(dir.path(), "echo '{\"type\":\"turn.started\"}'\n");
    let mut renderer = test_renderer();
    let cancel = CancellationToken::new();

    supervisor
        .run_turn(&mut renderer, &TurnRequest::resume("th-a", "one"), &cancel)
        .await;
    supervisor
        .run_turn(&mut renderer, &TurnRequest::resume("th-a", "two"), &cancel)
        .await;

    let content = std::fs::read_to_string(log_dir(dir.path()).join("th-a.jsonl")).unwrap();
    assert!(content.contains("# prompt: one\n"));
    assert!(content.contains("\n\n# prompt: two\n"));
    assert_eq!(content.matches(EVENTS_MARKER).count(), 2);
}

#[tokio::test]
async fn first_thread_id_wins() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = fake_agent(
        dir.path(),
        r#"
echo '{"type":"thread.started","thread_id":"first"}'
echo '{"type":"thread.started","thread_id":"second"}'
"#,
    );
    let mut renderer = test_renderer();

    let outcome = supervisor
        .run_turn(&mut renderer, &TurnRequest::fresh("p"), &CancellationToken::new())
        .await;

    assert_eq!(outcome.session_id.as_deref(), Some("first"));
    assert_eq!(
        outcome.log_path.unwrap(),
        log_dir(dir.path()).join("first.jsonl")
    );
    let (out, _) = rendered(&renderer);
    assert_eq!(out.matches("[THREAD]").count(), 1);
}

#[tokio::test]
async fn cancel_terminates_child() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = fake_agent(
        dir.path(),
        "echo '{\"type\":\"thread.started\",\"thread_id\":\"th-c\"}'\nexec sleep 30\n",
    );
    let mut renderer = test_renderer();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        supervisor.run_turn(&mut renderer, &TurnRequest::fresh("p"), &cancel),
    )
    .await
    .expect("cancelled turn should end promptly");

    assert!(outcome.aborted);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(
        outcome.status,
        TurnStatus::Exited {
            code: None,
            signal: Some(15)
        }
    );
    assert_eq!(outcome.session_id.as_deref(), Some("th-c"));
    assert_eq!(
        outcome.log_path.unwrap(),
        log_dir(dir.path()).join("th-c.jsonl")
    );

    let (_, diag) = rendered(&renderer);
    assert!(diag.contains("[CANCEL]"), "{diag}");
    assert!(diag.contains("Turn cancelled by user"), "{diag}");
}

#[tokio::test]
async fn ignored_sigterm_escalates_to_kill() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = fake_agent(dir.path(), "trap '' TERM\necho started\nexec sleep 30\n")
        .terminate_timeout(Duration::from_millis(200));
    let mut renderer = test_renderer();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        supervisor.run_turn(&mut renderer, &TurnRequest::fresh("p"), &cancel),
    )
    .await
    .expect("kill should follow the terminate timeout");

    assert!(outcome.aborted);
    assert_eq!(
        outcome.status,
        TurnStatus::Exited {
            code: None,
            signal: Some(9)
        }
    );
}

#[tokio::test]
async fn cancel_not_held_up_by_background_process() {
    let dir = tempfile::tempdir().unwrap();
    let script = r#"
sleep 8 &
trap '' TERM
printf '%s\n' '{"type":"thread.started","thread_id":"th-bg"}'
exec sleep 30
"#;
    let supervisor = fake_agent(dir.path(), script).terminate_timeout(Duration::from_millis(200));
    let mut renderer = test_renderer();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = supervisor
        .run_turn(&mut renderer, &TurnRequest::fresh("p"), &cancel)
        .await;

    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    assert!(outcome.aborted);
    assert_eq!(outcome.session_id.as_deref(), Some("th-bg"));
    assert_eq!(
        outcome.status,
        TurnStatus::Exited {
            code: None,
            signal: Some(9)
        }
    );
}

#[tokio::test]
async fn exited_agent_with_background_process_finishes_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let script = r#"
sleep 8 &
printf '%s\n' '{"type":"thread.started","thread_id":"th-quick"}'
printf '%s\n' '{"type":"item.completed","item":{"type":"agent_message","text":"done"}}'
"#;
    let supervisor = fake_agent(dir.path(), script);
    let mut renderer = test_renderer();

    let started = Instant::now();
    let outcome = supervisor
        .run_turn(&mut renderer, &TurnRequest::fresh("p"), &CancellationToken::new())
        .await;

    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.session_id.as_deref(), Some("th-quick"));
    let (out, _) = rendered(&renderer);
    assert!(out.contains("done"), "{out}");
}

#[tokio::test]
async fn log_keeps_received_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let script = r#"
printf '{"type":"thread.started","thread_id":"th-raw"}\r\n'
printf 'caf\351 au lait\n'
"#;
    let supervisor = fake_agent(dir.path(), script);
    let mut renderer = test_renderer();

    let outcome = supervisor
        .run_turn(&mut renderer, &TurnRequest::fresh("p"), &CancellationToken::new())
        .await;

    assert_eq!(outcome.session_id.as_deref(), Some("th-raw"));
    let log = std::fs::read(log_dir(dir.path()).join("th-raw.jsonl")).unwrap();
    let contains = |needle: &[u8]| log.windows(needle.len()).any(|w| w == needle);
    assert!(contains(b"{\"type\":\"thread.started\",\"thread_id\":\"th-raw\"}\r\n"));
    assert!(log.ends_with(b"caf\xE9 au lait\n"));
    let (out, _) = rendered(&renderer);
    assert!(out.contains("caf\u{FFFD} au lait"), "{out}");
}

#[tokio::test]
async fn spawn_failure_reported() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor =
        Supervisor::new(log_dir(dir.path())).program("/nonexistent/codex-transcript-missing");
    let mut renderer = test_renderer();

    let outcome = supervisor
        .run_turn(&mut renderer, &TurnRequest::fresh("p"), &CancellationToken::new())
        .await;

    assert!(matches!(outcome.status, TurnStatus::Failed { .. }));
    assert_eq!(outcome.exit_code(), 1);
    assert!(!outcome.aborted);

    let (out, diag) = rendered(&renderer);
    assert!(out.is_empty());
    assert!(diag.contains("Failed to run codex"), "{diag}");
    assert!(diag.contains("not found"), "{diag}");

    let log_path = outcome.log_path.unwrap();
    let content = std::fs::read_to_string(log_path).unwrap();
    assert!(content.starts_with("# prompt: p\n"));
}

#[tokio::test]
async fn unwritable_log_dir_does_not_stop_turn() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("logs");
    std::fs::write(&blocker, "a file where the log dir should be").unwrap();

    let supervisor = fake_agent(dir.path(), FULL_TURN);
    let mut renderer = test_renderer();

    let outcome = supervisor
        .run_turn(&mut renderer, &TurnRequest::fresh("p"), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.log_path, None);
    assert_eq!(outcome.session_id.as_deref(), Some("th-123"));
    let (out, _) = rendered(&renderer);
    assert!(out.contains("Hello from codex"));
}
