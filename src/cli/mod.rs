//! Command-line interface for loraforge.
//!
//! Provides commands for running the full pipeline, rewriting captions on
//! their own, and patching the workflow/config files individually.

mod commands;
mod overrides;

pub use commands::{parse_cli, run_with_cli, Cli};
pub use overrides::apply_overrides;
