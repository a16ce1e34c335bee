//! Error types for batch orchestration.
//!
//! Defines error types for the major subsystems:
//! - Batch configuration loading and validation
//! - Control file (manifest) loading
//! - Level handler invocation
//!
//! Per-manifest handler failures are deliberately *not* propagated past the
//! level runner; they are caught, logged, and recorded as unit outcomes so
//! that one bad unit never aborts a multi-hour batch.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or validating the batch configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("No 'levels' entry found in the options section")]
    MissingLevels,

    #[error("Handler for unrecognised level '{0}' in handlers section")]
    UnknownHandlerLevel(String),

    #[error("Empty command line for handler '{0}'")]
    EmptyHandlerCommand(String),

    #[error("Worker pool size must be at least 1")]
    InvalidPoolSize,

    #[error("No sites declared in the configuration")]
    NoSites,
}

/// Errors that can occur while loading a control file (manifest).
#[derive(Debug, Error)]
pub enum ControlFileError {
    #[error("Failed to read control file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse control file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Duplicate ordinal key '{0}' in control file set")]
    DuplicateKey(String),
}

/// Errors raised by a level handler invocation.
///
/// The orchestrator treats handlers as opaque: any of these is caught at
/// the per-manifest boundary, logged with full detail, and the run
/// continues with the next manifest.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' exited with status {code:?}")]
    NonZeroExit { program: String, code: Option<i32> },

    #[error("Manifest has no '{field}' entry in its files section")]
    MissingFileEntry { field: String },

    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
