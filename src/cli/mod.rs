//! CLI module for codex process spawning and stream parsing.

mod events;
mod process;
mod stream;

pub use events::*;
pub use process::*;
pub use stream::*;
