//! Command-line interface for debate-forge.
//!
//! Runs debates and inspects the conversation log.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
