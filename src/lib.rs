//! Codex Transcript - readable transcripts and session logs for `codex exec --json`.

pub mod app;
pub mod args;
pub mod cli;
pub mod config;
pub mod display;
pub mod session;
pub mod supervisor;
