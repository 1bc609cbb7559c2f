//! Session identity and on-disk session logs.

mod identity;
mod log;

pub use identity::*;
pub use log::*;
