//! Per-session raw event log.
//!
//! Each session gets one `.jsonl` file holding a short `#`-prefixed header
//! followed by every line codex printed, byte for byte. When the session id
//! is not known at open time the file starts under a timestamp name and is
//! renamed to `{session_id}.jsonl` once, on [`SessionLog::finalize`].

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use super::identity::sanitize_for_filename;

/// Extension of session log files.
pub const LOG_EXTENSION: &str = "jsonl";

/// Marker line separating the header from raw events.
pub const EVENTS_MARKER: &str = "# --- events ---";

/// Errors that can occur while writing a session log.
#[derive(thiserror::Error, Debug)]
pub enum SessionLogError {
    /// Failed to create the log directory.
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to open the log file.
    #[error("Failed to open session log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to write to the log file.
    #[error("Failed to write session log {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Path a session's log lives at once its id is known.
#[must_use]
pub fn canonical_log_path(dir: &Path, session_id: &str) -> PathBuf {
    dir.join(format!(
        "{}.{LOG_EXTENSION}",
        sanitize_for_filename(session_id)
    ))
}

/// Timestamp-based name used while the session id is unknown.
#[must_use]
pub fn fallback_log_path(dir: &Path, subcommand: &str) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    dir.join(format!(
        "{stamp}-{}.{LOG_EXTENSION}",
        sanitize_for_filename(subcommand)
    ))
}

/// Append-only log sink for one invocation.
#[derive(Debug)]
pub struct SessionLog {
    dir: PathBuf,
    path: PathBuf,
    writer: BufWriter<File>,
    session_id: Option<String>,
    /// Canonical path to move to on finalize, set when the id is learned late.
    pending_rename: Option<PathBuf>,
}

impl SessionLog {
    /// Open the log for one invocation and write its header.
    ///
    /// With a known `session_id` the file is `{session_id}.jsonl`, appended
    /// to (after a blank separator line) if it already exists. Otherwise a
    /// fresh timestamp-named file is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created, or the
    /// header cannot be written.
    pub async fn open(
        dir: &Path,
        subcommand: &str,
        prompt: &str,
        session_id: Option<&str>,
    ) -> Result<Self, SessionLogError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| SessionLogError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;

        let (path, existed) = match session_id {
            Some(id) => {
                let path = canonical_log_path(dir, id);
                let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
                (path, existed)
            }
            None => (fallback_log_path(dir, subcommand), false),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| SessionLogError::Open {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), append = existed, "Opened session log");

        let mut log = Self {
            dir: dir.to_path_buf(),
            path,
            writer: BufWriter::new(file),
            session_id: session_id.map(str::to_string),
            pending_rename: None,
        };

        let mut header = String::new();
        if existed {
            header.push('\n');
        }
        let _ = writeln!(header, "# prompt: {}", prompt.replace('\n', "\n#   "));
        if let Some(id) = session_id {
            let _ = writeln!(header, "# session: {id}");
        }
        let _ = writeln!(
            header,
            "# started: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        let _ = writeln!(header, "{EVENTS_MARKER}");
        log.write_raw(header.as_bytes()).await?;

        Ok(log)
    }

    /// Current file path (before any rename).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Session id recorded so far.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Note the session id once it appears in the stream.
    ///
    /// Only the first call on a log opened without an id has any effect; it
    /// appends a `# session:` line and schedules the rename. Returns whether
    /// the id was recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the header line cannot be written.
    pub async fn record_thread(&mut self, session_id: &str) -> Result<bool, SessionLogError> {
        if self.session_id.is_some() {
            return Ok(false);
        }
        self.session_id = Some(session_id.to_string());

        let canonical = canonical_log_path(&self.dir, session_id);
        if canonical != self.path {
            self.pending_rename = Some(canonical);
        }

        self.write_raw(format!("# session: {session_id}\n").as_bytes()).await?;
        Ok(true)
    }

    /// Append one raw line exactly as received, plus a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_line(&mut self, raw: &[u8]) -> Result<(), SessionLogError> {
        self.write_raw(raw).await?;
        self.write_raw(b"\n").await
    }

    /// Flush and close the log, renaming it to its canonical name if the id
    /// became known after open.
    ///
    /// A failed rename is logged and ignored; the content stays valid under
    /// the original name. Returns the path the log ends up at.
    ///
    /// # Errors
    ///
    /// Returns an error if recording the id or flushing fails.
    pub async fn finalize(mut self, session_id: Option<&str>) -> Result<PathBuf, SessionLogError> {
        if let Some(id) = session_id {
            self.record_thread(id).await?;
        }

        self.writer
            .flush()
            .await
            .map_err(|source| SessionLogError::Write {
                path: self.path.clone(),
                source,
            })?;
        let Self {
            path,
            writer,
            pending_rename,
            ..
        } = self;
        drop(writer);

        let Some(target) = pending_rename else {
            return Ok(path);
        };

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            tracing::warn!(
                from = %path.display(),
                to = %target.display(),
                "Session log already exists, keeping timestamped name"
            );
            return Ok(path);
        }

        match tokio::fs::rename(&path, &target).await {
            Ok(()) => {
                tracing::debug!(
                    from = %path.display(),
                    to = %target.display(),
                    "Renamed session log"
                );
                Ok(target)
            }
            Err(e) => {
                tracing::warn!(
                    from = %path.display(),
                    to = %target.display(),
                    error = %e,
                    "Failed to rename session log"
                );
                Ok(path)
            }
        }
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), SessionLogError> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|source| SessionLogError::Write {
                path: self.path.clone(),
                source,
            })
    }
}
