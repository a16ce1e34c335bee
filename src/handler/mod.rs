//! Collaborator contracts invoked by the orchestrator.
//!
//! The orchestrator never computes a level's output itself. Three seams
//! connect it to the rest of the system:
//!
//! - [`LevelHandler`] performs all level-specific computation and I/O for
//!   one validated manifest. It may fail; the runner catches and logs.
//! - [`ComplianceUpdate`] normalizes a manifest and reports whether it is
//!   usable; unusable manifests are skipped without a handler call.
//! - [`FingerprintPlotter`] is a best-effort visualization side effect
//!   after successful completion of levels that declare one.

mod command;
mod compliance;

pub use command::{CommandHandler, CommandPlotter, NoopPlotter};
pub use compliance::StandardCompliance;

use async_trait::async_trait;

use crate::control::ControlFile;
use crate::error::HandlerError;
use crate::levels::Level;
use crate::session::SessionContext;

/// Handler for one processing level.
///
/// Receives a validated manifest with batch-mode display settings already
/// injected. Any error raised here is caught at the per-manifest boundary
/// and never aborts the level run.
#[async_trait]
pub trait LevelHandler: Send + Sync {
    /// Processes one manifest.
    async fn run(&self, ctx: &SessionContext, manifest: &ControlFile) -> Result<(), HandlerError>;
}

/// Manifest validation and normalization collaborator.
///
/// Mutates the manifest to fill defaults and returns whether it is usable.
/// Rejection messaging is the collaborator's own responsibility; the
/// orchestrator only skips the manifest.
#[async_trait]
pub trait ComplianceUpdate: Send + Sync {
    /// Updates `manifest` for `level`, returning `false` if it is unusable.
    async fn update(&self, level: Level, manifest: &mut ControlFile) -> bool;
}

/// Best-effort fingerprint visualization collaborator.
///
/// Runs inside the same per-manifest catch block as the handler, so a
/// plotting failure is indistinguishable from a handler failure.
#[async_trait]
pub trait FingerprintPlotter: Send + Sync {
    /// Plots fingerprints for the output of a completed manifest.
    async fn plot(&self, manifest: &ControlFile) -> Result<(), HandlerError>;
}
