//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{ConfigError, ConfigLoader, TranscriptConfig};

#[derive(Parser, Debug)]
#[command(
    name = "codex-transcript",
    about = "Run codex and render its JSON event stream as a transcript",
    version
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Show the agent's reasoning items.
    #[arg(long, global = true)]
    pub show_reasoning: bool,

    /// Directory for session logs.
    #[arg(long, value_name = "DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Config file to use instead of the default search paths.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start a new session.
    Exec {
        /// Prompt text. Omit to start an interactive session.
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Continue an existing session.
    Resume {
        /// Session id reported by codex.
        session_id: String,
        /// Prompt text. Omit to continue interactively.
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
}

/// Which codex subcommand an invocation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubcommandKind {
    Exec,
    Resume,
}

impl SubcommandKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exec => "exec",
            Self::Resume => "resume",
        }
    }
}

/// What the user asked for, after argument parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub subcommand: SubcommandKind,
    /// `None` means interactive mode.
    pub prompt: Option<String>,
    pub thread_id: Option<String>,
    pub interactive: bool,
}

impl Invocation {
    fn new(subcommand: SubcommandKind, words: &[String], thread_id: Option<String>) -> Self {
        let joined = words.join(" ");
        let prompt = (!joined.trim().is_empty()).then_some(joined);
        Self {
            subcommand,
            interactive: prompt.is_none(),
            prompt,
            thread_id,
        }
    }

    /// Mode name shown in the startup banner.
    #[must_use]
    pub fn mode(&self) -> String {
        if self.interactive {
            format!("{} (interactive)", self.subcommand.as_str())
        } else {
            self.subcommand.as_str().to_string()
        }
    }
}

impl Cli {
    #[must_use]
    pub fn invocation(&self) -> Invocation {
        match &self.command {
            Commands::Exec { prompt } => Invocation::new(SubcommandKind::Exec, prompt, None),
            Commands::Resume { session_id, prompt } => {
                Invocation::new(SubcommandKind::Resume, prompt, Some(session_id.clone()))
            }
        }
    }

    /// Load the config file, then apply environment and flag overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn load_config(&self) -> Result<TranscriptConfig, ConfigError> {
        let loader = match &self.config {
            Some(path) => ConfigLoader::with_path(path.clone()),
            None => ConfigLoader::new(),
        };
        let config = loader.load()?.with_env_overrides();
        Ok(self.apply_flags(config))
    }

    /// Flags win over file and environment.
    #[must_use]
    pub fn apply_flags(&self, mut config: TranscriptConfig) -> TranscriptConfig {
        if self.show_reasoning {
            config.show_reasoning = true;
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }
        config
    }
}
