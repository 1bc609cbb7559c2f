//! Supervisor module: runs codex turns and the interactive loop.

mod interactive;
mod keys;
mod runner;

pub use interactive::*;
pub use keys::*;
pub use runner::*;
