//! Command execution for build requests
//!
//! This module handles:
//! - Spawning the requested command with piped output
//! - Mirroring stdout/stderr to the console and the client connection
//! - Waiting for exit (optionally under a deadline) and draining both pipes

mod executor;
mod multiplexer;

pub use executor::CommandExecutor;
pub use multiplexer::SessionWriter;
