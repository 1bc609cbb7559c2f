//! Tests for codex process building and spawning.

use codex_transcript::cli::{
    exit_parts, CodexProcess, CodexProcessBuilder, LineReader, SpawnError, DEFAULT_BINARY,
};

#[test]
fn fresh_args() {
    let builder = CodexProcessBuilder::new("fix the failing test");
    assert_eq!(builder.get_program(), DEFAULT_BINARY);
    assert_eq!(builder.prompt(), "fix the failing test");
    assert_eq!(
        builder.build_args(),
        vec!["exec", "--json", "--skip-git-repo-check", "fix the failing test"]
    );
}

#[test]
fn resume_args() {
    let builder = CodexProcessBuilder::new("and now the docs").resume("th-1");
    assert_eq!(
        builder.build_args(),
        vec![
            "exec",
            "--json",
            "--skip-git-repo-check",
            "resume",
            "th-1",
            "and now the docs"
        ]
    );
}

#[test]
fn prompt_passed_as_single_argument() {
    let builder = CodexProcessBuilder::new("--help; rm -rf /");
    let args = builder.build_args();
    assert_eq!(args.last().map(String::as_str), Some("--help; rm -rf /"));
    assert!(builder.display_command().ends_with("'--help; rm -rf /'"));
}

#[tokio::test]
async fn spawned_child_receives_exact_argv() {
    let builder = CodexProcessBuilder::new("two words")
        .program("sh")
        .leading_args(["-c", "printf '%s\\n' \"$@\"", "sh"])
        .resume("th-5");
    let mut process = CodexProcess::spawn(&builder).unwrap();
    let mut lines = LineReader::new(process.take_stdout().unwrap());

    let mut argv = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        argv.push(line.text().into_owned());
    }
    let status = process.wait().await.unwrap();

    assert_eq!(
        argv,
        vec![
            "exec",
            "--json",
            "--skip-git-repo-check",
            "resume",
            "th-5",
            "two words"
        ]
    );
    assert_eq!(exit_parts(status), (Some(0), None));
    assert!(process.take_stdout().is_none());
}

#[tokio::test]
async fn spawn_missing_program_is_not_found() {
    let builder = CodexProcessBuilder::new("x").program("/nonexistent/bin/codex");
    let err = CodexProcess::spawn(&builder).unwrap_err();
    assert!(matches!(err, SpawnError::NotFound(ref p) if p == "/nonexistent/bin/codex"));
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn terminate_request_stops_child() {
    let builder = CodexProcessBuilder::new("x")
        .program("sh")
        .leading_args(["-c", "exec sleep 30", "sh"]);
    let mut process = CodexProcess::spawn(&builder).unwrap();
    assert!(process.id().is_some());

    process.request_terminate().unwrap();
    let status = process.wait().await.unwrap();

    assert_eq!(exit_parts(status), (None, Some(15)));
}
