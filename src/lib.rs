//! fluxbatch: batch orchestrator for multi-level flux data processing.
//!
//! This library runs a declared sequence of named processing levels over
//! one or many per-site control files, isolating per-unit failures and
//! honouring cooperative mid-run cancellation. The science of each level
//! lives behind the [`handler::LevelHandler`] seam; the orchestrator owns
//! ordering, containment, cancellation and the bounded per-site fan-out.

// Core modules
pub mod cli;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod levels;
pub mod runner;
pub mod session;

// Re-export the types most callers need
pub use config::BatchConfig;
pub use control::{ControlFile, ControlFileSet, SiteManifest};
pub use dispatch::{SiteCollaborators, SiteDispatcher, SiteReport, SiteStatus};
pub use error::{ConfigError, ControlFileError, HandlerError};
pub use levels::{KeyOrdering, Level, LevelRegistry};
pub use runner::{LevelReport, LevelRunner, UnitOutcome, UnitStatus};
pub use session::{BatchSession, CancelToken, RunMode, SessionContext, SessionState};
