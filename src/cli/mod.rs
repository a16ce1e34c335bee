//! Command-line interface for fluxbatch.
//!
//! Provides the `run` (level-sequence) and `sites` (per-site fan-out)
//! batch commands plus a `levels` listing.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
