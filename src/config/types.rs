//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::DEFAULT_BINARY;

/// Environment variables that switch reasoning output on. Either works.
pub const SHOW_REASONING_ENV: [&str; 2] =
    ["CODEX_TRANSCRIPT_SHOW_REASONING", "CODEX_SHOW_REASONING"];

/// Environment variable overriding the codex binary.
pub const BINARY_ENV: &str = "CODEX_TRANSCRIPT_BIN";

/// Settings for the transcript wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Program to run as the agent.
    pub binary: String,
    /// Directory for session logs. Defaults to the user data dir.
    pub log_dir: Option<PathBuf>,
    /// Render `reasoning` items.
    pub show_reasoning: bool,
    /// Seconds to wait after SIGTERM before force-killing a cancelled run.
    pub terminate_timeout_secs: u64,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            log_dir: None,
            show_reasoning: false,
            terminate_timeout_secs: 5,
        }
    }
}

impl TranscriptConfig {
    /// Apply environment overrides using the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides from an arbitrary lookup.
    #[must_use]
    pub fn with_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(enabled) = SHOW_REASONING_ENV
            .iter()
            .find_map(|key| lookup(key))
            .map(|value| env_truthy(&value))
        {
            self.show_reasoning = enabled;
        }
        if let Some(binary) = lookup(BINARY_ENV).filter(|b| !b.trim().is_empty()) {
            self.binary = binary;
        }
        self
    }

    /// Resolved log directory.
    #[must_use]
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(default_log_dir)
    }

    #[must_use]
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }
}

/// `~/.local/share/codex-transcript/sessions` on Linux.
#[must_use]
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("codex-transcript")
        .join("sessions")
}

/// Interpret an environment value as a boolean switch.
#[must_use]
pub fn env_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
