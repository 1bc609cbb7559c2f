//! Cancel keys while a child is running.
//!
//! The terminal is switched to a non-canonical, no-echo mode so single
//! keypresses arrive without Enter. Output processing is left on so the
//! transcript keeps its line layout.

use std::io::{self, IsTerminal};

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use std::os::fd::{AsFd, OwnedFd};

#[cfg(unix)]
use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};

/// Scoped keypress mode on a terminal.
///
/// Restores the saved terminal settings on [`KeypressMode::restore`] or on
/// drop, whichever comes first. Restoring twice is a no-op.
#[derive(Debug)]
pub struct KeypressMode {
    #[cfg(unix)]
    saved: Option<(OwnedFd, Termios)>,
    active: bool,
}

impl KeypressMode {
    /// Switch stdin into keypress mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal attributes cannot be read or set.
    #[cfg(unix)]
    pub fn enter() -> io::Result<Self> {
        Self::enter_on(io::stdin())
    }

    /// Keypress mode is a no-op off unix.
    #[cfg(not(unix))]
    pub fn enter() -> io::Result<Self> {
        Ok(Self { active: true })
    }

    /// Switch the terminal behind `fd` into keypress mode.
    ///
    /// The descriptor is duplicated so the settings can be put back later.
    ///
    /// # Errors
    ///
    /// Returns an error if `fd` is not a terminal or its attributes cannot
    /// be set.
    #[cfg(unix)]
    pub fn enter_on(fd: impl AsFd) -> io::Result<Self> {
        let fd = fd.as_fd().try_clone_to_owned()?;
        let original = termios::tcgetattr(&fd)?;

        let mut keypress = original.clone();
        keypress
            .local_flags
            .remove(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ISIG);
        keypress.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        keypress.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(&fd, SetArg::TCSANOW, &keypress)?;

        tracing::trace!("Entered keypress mode");
        Ok(Self {
            saved: Some((fd, original)),
            active: true,
        })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Put the terminal back the way it was.
    pub fn restore(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        #[cfg(unix)]
        {
            if let Some((fd, original)) = self.saved.take() {
                if let Err(e) = termios::tcsetattr(&fd, SetArg::TCSANOW, &original) {
                    tracing::warn!(error = %e, "Failed to restore terminal settings");
                }
            }
        }
        tracing::trace!("Left keypress mode");
    }
}

impl Drop for KeypressMode {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Whether a key event should cancel the running turn.
///
/// Escape and Ctrl+C both cancel. Ctrl+C arrives as a key because ISIG is
/// off while keypress mode is active.
#[must_use]
pub fn is_cancel_key(key: &KeyEvent) -> bool {
    if key.kind == KeyEventKind::Release {
        return false;
    }
    match key.code {
        KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Background task watching stdin for cancel keys during one turn.
#[derive(Debug)]
pub struct EscapeWatcher {
    mode: KeypressMode,
    task: JoinHandle<()>,
}

impl EscapeWatcher {
    /// Enter keypress mode and start watching, cancelling `cancel` on a
    /// cancel key.
    ///
    /// Returns `None` when stdin is not a terminal or keypress mode cannot be
    /// entered. The turn then runs without key cancellation.
    #[must_use]
    pub fn arm(cancel: CancellationToken) -> Option<Self> {
        if !io::stdin().is_terminal() {
            tracing::debug!("stdin is not a terminal, cancel keys disabled");
            return None;
        }

        let mode = match KeypressMode::enter() {
            Ok(mode) => mode,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot enter keypress mode, cancel keys disabled");
                return None;
            }
        };

        let task = tokio::spawn(watch_keys(cancel));
        Some(Self { mode, task })
    }

    /// Stop watching and restore the terminal.
    pub fn disarm(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.task.abort();
        if self.mode.is_active() {
            self.mode.restore();
            tracing::debug!("Cancel keys disarmed");
        }
    }
}

impl Drop for EscapeWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn watch_keys(cancel: CancellationToken) {
    let mut events = EventStream::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if is_cancel_key(&key) => {
                    tracing::debug!(code = ?key.code, "Cancel key pressed");
                    cancel.cancel();
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Failed to read key events");
                    break;
                }
                None => break,
            },
        }
    }
}
