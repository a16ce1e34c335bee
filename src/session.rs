//! Batch session and cooperative cancellation.
//!
//! A session is created once per invocation and owns the cancellation
//! token and the declared level sequence. Cancellation is cooperative and
//! coarse-grained: the token is set externally (Ctrl-C, a UI thread) and
//! polled at manifest and level boundaries only, never mid-unit.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use crate::config::BatchConfig;
use crate::handler::{ComplianceUpdate, FingerprintPlotter};
use crate::levels::{Level, LevelRegistry};
use crate::runner::{LevelReport, LevelRunner};

/// Timestamp format used in the batch start/end banner.
const BANNER_TIME_FORMAT: &str = "%Y%m%d%H%M";

/// How a session was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Driven from an interactive front end.
    Interactive,
    /// Unattended batch run.
    Batch,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Interactive => write!(f, "interactive"),
            RunMode::Batch => write!(f, "batch"),
        }
    }
}

/// Per-invocation context passed to level handlers.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Invocation mode; handlers must not block on displays in batch mode.
    pub mode: RunMode,
    /// Site name when running under the per-site dispatcher.
    pub site: Option<String>,
}

/// Lifecycle of a batch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Work is proceeding.
    Running,
    /// A stop has been requested but runner loops have not yet exited.
    StopRequested,
    /// All runner loops observed the stop request and exited.
    Stopped,
}

/// Cooperative cancellation token.
///
/// Clones share the underlying flag. Setting the token never preempts an
/// in-progress unit; runners check it once per manifest boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    stopped: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a cooperative stop. Idempotent.
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Returns whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Top-level object for one batch invocation.
///
/// Owns the cancellation token and the declared level sequence. The
/// sequence is taken verbatim from the operator's configuration; unknown
/// names are logged and skipped at run time, never inferred or reordered.
pub struct BatchSession {
    token: CancelToken,
    mode: RunMode,
    levels: Vec<String>,
    finished: AtomicBool,
}

impl BatchSession {
    /// Creates a session for the given declared level sequence.
    pub fn new(mode: RunMode, levels: Vec<String>) -> Self {
        Self {
            token: CancelToken::new(),
            mode,
            levels,
            finished: AtomicBool::new(false),
        }
    }

    /// Returns a clone of the session's cancellation token.
    ///
    /// External actors (signal handlers, a UI thread) hold this clone and
    /// call [`CancelToken::request_stop`] on it.
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Returns the declared level sequence.
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Returns the session's lifecycle state.
    pub fn state(&self) -> SessionState {
        if !self.token.is_stopped() {
            SessionState::Running
        } else if self.finished.load(Ordering::SeqCst) {
            SessionState::Stopped
        } else {
            SessionState::StopRequested
        }
    }

    /// Runs the declared level sequence to completion.
    ///
    /// For each declared level, in order: checks the cancellation token,
    /// skips unrecognized names with a warning, skips levels with no
    /// control file set, and otherwise hands the set to the sequential
    /// level runner. Individual unit failures never abort the run; the
    /// only early exit is cancellation.
    pub async fn run_levels(
        &self,
        config: &BatchConfig,
        registry: &LevelRegistry,
        compliance: &dyn ComplianceUpdate,
        plotter: &dyn FingerprintPlotter,
    ) -> Vec<LevelReport> {
        let start = Local::now();
        info!(
            "Started batch processing at {}",
            start.format(BANNER_TIME_FORMAT)
        );

        let ctx = SessionContext {
            mode: self.mode,
            site: None,
        };
        let runner = LevelRunner::new(registry, compliance, plotter);
        let mut reports = Vec::new();

        for declared in &self.levels {
            if self.token.is_stopped() {
                info!("Stop requested, ending batch run");
                break;
            }

            let level = match declared.parse::<Level>() {
                Ok(level) => level,
                Err(err) => {
                    warn!("{err}");
                    continue;
                }
            };

            let Some(set) = config.control_set(declared, level) else {
                warn!(level = %level, "No control files declared for level, skipping");
                continue;
            };

            reports.push(runner.run_level(&ctx, &self.token, level, set).await);
        }

        self.finished.store(true, Ordering::SeqCst);

        let end = Local::now();
        info!(
            "Finished batch processing at {}",
            end.format(BANNER_TIME_FORMAT)
        );

        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_stopped());

        clone.request_stop();
        assert!(token.is_stopped());

        // Idempotent.
        token.request_stop();
        assert!(token.is_stopped());
    }

    #[test]
    fn test_session_state_transitions() {
        let session = BatchSession::new(RunMode::Batch, vec!["l1".to_string()]);
        assert_eq!(session.state(), SessionState::Running);

        session.token().request_stop();
        assert_eq!(session.state(), SessionState::StopRequested);

        session.finished.store(true, Ordering::SeqCst);
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_run_mode_display() {
        assert_eq!(RunMode::Interactive.to_string(), "interactive");
        assert_eq!(RunMode::Batch.to_string(), "batch");
    }
}
