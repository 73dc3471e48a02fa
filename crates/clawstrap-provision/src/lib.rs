pub mod archive;
pub mod commands;
pub mod context;
pub mod fetch;
pub mod health;
pub mod host;
pub mod identity;
pub mod lock;
pub mod phase;
pub mod phases;
pub mod pipeline;
pub mod preflight;
pub mod update;

#[cfg(test)]
mod testing;

pub use context::InstallContext;
pub use host::{Cmd, Host, SystemHost};
pub use phase::{Phase, Sequencer};
