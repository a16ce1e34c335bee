//! Sequential level runner with per-manifest failure isolation.
//!
//! Runs one level's control file set to completion. The loop guarantees:
//!
//! - Iteration order follows the level's declared policy (numeric
//!   ascending for output-chained stages, declaration order otherwise).
//! - The cancellation token is checked once per manifest boundary, never
//!   mid-unit.
//! - No per-unit failure propagates past the runner: missing files,
//!   compliance rejections, handler errors and fingerprint errors are
//!   logged, recorded as unit outcomes, and the loop continues.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::control::{ControlFile, ControlFileSet};
use crate::handler::{ComplianceUpdate, FingerprintPlotter, LevelHandler};
use crate::levels::{Level, LevelRegistry};
use crate::session::{CancelToken, SessionContext};

/// Outcome of processing one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    /// Handler (and any fingerprint side effect) completed.
    Completed,
    /// The manifest locator did not resolve to an existing file.
    MissingFile,
    /// The compliance update reported the manifest unusable.
    Rejected,
    /// The handler or its side effect raised an error.
    Failed(String),
}

/// Per-manifest result record.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    /// Ordinal key of the manifest within its set.
    pub key: String,
    /// Manifest locator.
    pub path: PathBuf,
    /// What happened.
    pub status: UnitStatus,
}

/// Result of one level run.
///
/// Outcomes are collected for observability and tests; nothing persists
/// them beyond the log stream.
#[derive(Debug)]
pub struct LevelReport {
    /// The level that ran.
    pub level: Level,
    /// Per-manifest outcomes, in processing order.
    pub outcomes: Vec<UnitOutcome>,
    /// Whether iteration stopped early on a cancellation request.
    pub cancelled: bool,
}

impl LevelReport {
    fn new(level: Level) -> Self {
        Self {
            level,
            outcomes: Vec::new(),
            cancelled: false,
        }
    }

    /// Number of manifests whose handler completed.
    pub fn completed(&self) -> usize {
        self.count(|status| matches!(status, UnitStatus::Completed))
    }

    /// Number of manifests skipped or failed, for any reason.
    pub fn skipped_or_failed(&self) -> usize {
        self.outcomes.len() - self.completed()
    }

    /// Number of manifests with a specific failure kind.
    fn count(&self, pred: impl Fn(&UnitStatus) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| pred(&outcome.status))
            .count()
    }
}

/// Executes one level's control file set with catch-log-continue semantics.
pub struct LevelRunner<'a> {
    registry: &'a LevelRegistry,
    compliance: &'a dyn ComplianceUpdate,
    plotter: &'a dyn FingerprintPlotter,
}

impl<'a> LevelRunner<'a> {
    /// Creates a runner over the given registry and collaborators.
    pub fn new(
        registry: &'a LevelRegistry,
        compliance: &'a dyn ComplianceUpdate,
        plotter: &'a dyn FingerprintPlotter,
    ) -> Self {
        Self {
            registry,
            compliance,
            plotter,
        }
    }

    /// Runs `level` over every manifest in `set`.
    ///
    /// Always returns normally: an empty set is a no-op, every per-unit
    /// error is contained, and a cancellation request stops iteration at
    /// the next manifest boundary with already-completed units unaffected.
    pub async fn run_level(
        &self,
        ctx: &SessionContext,
        token: &CancelToken,
        level: Level,
        set: &ControlFileSet,
    ) -> LevelReport {
        let mut report = LevelReport::new(level);

        let Some(handler) = self.registry.handler(level) else {
            warn!(level = %level, "No handler registered for level, skipping");
            return report;
        };

        for (key, path) in set.iter_ordered(level.ordering()) {
            if token.is_stopped() {
                info!(level = %level, "Stop requested, ending level run");
                report.cancelled = true;
                break;
            }

            if !path.is_file() {
                error!(level = %level, path = %path.display(), "Control file not found");
                report.outcomes.push(UnitOutcome {
                    key: key.to_string(),
                    path: path.to_path_buf(),
                    status: UnitStatus::MissingFile,
                });
                continue;
            }

            let status = self.process_unit(ctx, level, handler.as_ref(), path).await;
            report.outcomes.push(UnitOutcome {
                key: key.to_string(),
                path: path.to_path_buf(),
                status,
            });
        }

        info!(
            level = %level,
            completed = report.completed(),
            skipped = report.skipped_or_failed(),
            "Level run finished"
        );

        report
    }

    /// Processes a single manifest: load, validate, inject batch mode,
    /// invoke the handler, and plot fingerprints where the level declares
    /// one. Any error is caught here and reported as the unit's status.
    async fn process_unit(
        &self,
        ctx: &SessionContext,
        level: Level,
        handler: &dyn LevelHandler,
        path: &Path,
    ) -> UnitStatus {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        info!("Starting {} with {}", level.describe(), file_name);

        let mut manifest = match ControlFile::load(path) {
            Ok(manifest) => manifest,
            Err(err) => {
                error!(
                    "Error occurred during {} with {}: {err}",
                    level.describe(),
                    file_name
                );
                return UnitStatus::Failed(err.to_string());
            }
        };

        if !self.compliance.update(level, &mut manifest).await {
            return UnitStatus::Rejected;
        }

        manifest.apply_batch_mode();

        if let Err(err) = handler.run(ctx, &manifest).await {
            error!(
                "Error occurred during {} with {}: {err}",
                level.describe(),
                file_name
            );
            error!("{err:?}");
            return UnitStatus::Failed(err.to_string());
        }

        // The fingerprint side effect shares the handler's containment:
        // its failure marks this unit failed but never stops the loop.
        if level.plots_fingerprint() {
            if let Err(err) = self.plotter.plot(&manifest).await {
                error!(
                    "Error occurred during {} with {}: {err}",
                    level.describe(),
                    file_name
                );
                error!("{err:?}");
                return UnitStatus::Failed(err.to_string());
            }
        }

        info!("Finished {} with {}", level.describe(), file_name);
        UnitStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handler::{NoopPlotter, StandardCompliance};
    use crate::session::RunMode;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Handler that records which manifests it ran and fails on request.
    struct RecordingHandler {
        seen: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
    }

    impl RecordingHandler {
        fn new(seen: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                seen,
                fail_on: None,
            }
        }

        fn failing_on(seen: Arc<Mutex<Vec<String>>>, name: &str) -> Self {
            Self {
                seen,
                fail_on: Some(name.to_string()),
            }
        }
    }

    #[async_trait]
    impl LevelHandler for RecordingHandler {
        async fn run(
            &self,
            _ctx: &SessionContext,
            manifest: &ControlFile,
        ) -> Result<(), HandlerError> {
            let name = manifest.file_name();
            self.seen.lock().unwrap().push(name.clone());
            if self.fail_on.as_deref() == Some(name.as_str()) {
                return Err(HandlerError::Failed("synthetic failure".to_string()));
            }
            Ok(())
        }
    }

    fn ctx() -> SessionContext {
        SessionContext {
            mode: RunMode::Batch,
            site: None,
        }
    }

    fn write_manifest(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, "files:\n  out_filename: out.nc\n").unwrap();
        path
    }

    fn registry_with(level: Level, handler: RecordingHandler) -> LevelRegistry {
        LevelRegistry::builder()
            .register(level, Arc::new(handler))
            .build()
    }

    #[tokio::test]
    async fn test_empty_set_is_noop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with(Level::L1, RecordingHandler::new(Arc::clone(&seen)));
        let runner = LevelRunner::new(&registry, &StandardCompliance, &NoopPlotter);

        let report = runner
            .run_level(&ctx(), &CancelToken::new(), Level::L1, &ControlFileSet::new())
            .await;

        assert!(report.outcomes.is_empty());
        assert!(!report.cancelled);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_first_manifest() {
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with(Level::L1, RecordingHandler::new(Arc::clone(&seen)));
        let runner = LevelRunner::new(&registry, &StandardCompliance, &NoopPlotter);

        let mut set = ControlFileSet::new();
        set.insert("1", write_manifest(&dir, "a.yaml")).unwrap();
        set.insert("2", write_manifest(&dir, "b.yaml")).unwrap();

        let token = CancelToken::new();
        token.request_stop();

        let report = runner.run_level(&ctx(), &token, Level::L1, &set).await;
        assert!(report.cancelled);
        assert!(report.outcomes.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with(
            Level::L2,
            RecordingHandler::failing_on(Arc::clone(&seen), "b.yaml"),
        );
        let runner = LevelRunner::new(&registry, &StandardCompliance, &NoopPlotter);

        let mut set = ControlFileSet::new();
        set.insert("1", write_manifest(&dir, "a.yaml")).unwrap();
        set.insert("2", write_manifest(&dir, "b.yaml")).unwrap();
        set.insert("3", write_manifest(&dir, "c.yaml")).unwrap();

        let report = runner
            .run_level(&ctx(), &CancelToken::new(), Level::L2, &set)
            .await;

        // The failing unit never stops its neighbours.
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a.yaml", "b.yaml", "c.yaml"]
        );
        assert_eq!(report.completed(), 2);
        assert!(matches!(report.outcomes[1].status, UnitStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_missing_manifest_skipped() {
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with(Level::L1, RecordingHandler::new(Arc::clone(&seen)));
        let runner = LevelRunner::new(&registry, &StandardCompliance, &NoopPlotter);

        let mut set = ControlFileSet::new();
        set.insert("1", write_manifest(&dir, "a.yaml")).unwrap();
        set.insert("2", dir.path().join("missing.yaml")).unwrap();
        set.insert("3", write_manifest(&dir, "c.yaml")).unwrap();

        let report = runner
            .run_level(&ctx(), &CancelToken::new(), Level::L1, &set)
            .await;

        assert_eq!(*seen.lock().unwrap(), vec!["a.yaml", "c.yaml"]);
        assert_eq!(report.outcomes[1].status, UnitStatus::MissingFile);
        assert_eq!(report.completed(), 2);
    }

    #[tokio::test]
    async fn test_rejected_manifest_never_reaches_handler() {
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with(Level::L1, RecordingHandler::new(Arc::clone(&seen)));
        let runner = LevelRunner::new(&registry, &StandardCompliance, &NoopPlotter);

        // No files section at all, so compliance rejects it.
        let path = dir.path().join("bare.yaml");
        std::fs::write(&path, "options:\n  irga_type: Li-7500\n").unwrap();

        let mut set = ControlFileSet::new();
        set.insert("1", path).unwrap();

        let report = runner
            .run_level(&ctx(), &CancelToken::new(), Level::L1, &set)
            .await;

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(report.outcomes[0].status, UnitStatus::Rejected);
    }

    #[tokio::test]
    async fn test_numeric_ordering_applied() {
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with(Level::Concatenate, RecordingHandler::new(Arc::clone(&seen)));
        let runner = LevelRunner::new(&registry, &StandardCompliance, &NoopPlotter);

        let mut set = ControlFileSet::new();
        set.insert("10", write_manifest(&dir, "ten.yaml")).unwrap();
        set.insert("2", write_manifest(&dir, "two.yaml")).unwrap();
        set.insert("1", write_manifest(&dir, "one.yaml")).unwrap();

        runner
            .run_level(&ctx(), &CancelToken::new(), Level::Concatenate, &set)
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["one.yaml", "two.yaml", "ten.yaml"]
        );
    }

    #[tokio::test]
    async fn test_cancel_between_manifests() {
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let token = CancelToken::new();

        /// Stops the batch as soon as the first unit completes.
        struct CancellingHandler {
            inner: RecordingHandler,
            token: CancelToken,
        }

        #[async_trait]
        impl LevelHandler for CancellingHandler {
            async fn run(
                &self,
                ctx: &SessionContext,
                manifest: &ControlFile,
            ) -> Result<(), HandlerError> {
                self.inner.run(ctx, manifest).await?;
                self.token.request_stop();
                Ok(())
            }
        }

        let registry = LevelRegistry::builder()
            .register(
                Level::L1,
                Arc::new(CancellingHandler {
                    inner: RecordingHandler::new(Arc::clone(&seen)),
                    token: token.clone(),
                }),
            )
            .build();
        let runner = LevelRunner::new(&registry, &StandardCompliance, &NoopPlotter);

        let mut set = ControlFileSet::new();
        set.insert("1", write_manifest(&dir, "a.yaml")).unwrap();
        set.insert("2", write_manifest(&dir, "b.yaml")).unwrap();

        let report = runner.run_level(&ctx(), &token, Level::L1, &set).await;

        assert_eq!(*seen.lock().unwrap(), vec!["a.yaml"]);
        assert!(report.cancelled);
        assert_eq!(report.completed(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_level_runs_nothing() {
        let dir = TempDir::new().unwrap();
        let registry = LevelRegistry::builder().build();
        let runner = LevelRunner::new(&registry, &StandardCompliance, &NoopPlotter);

        let mut set = ControlFileSet::new();
        set.insert("1", write_manifest(&dir, "a.yaml")).unwrap();

        let report = runner
            .run_level(&ctx(), &CancelToken::new(), Level::L6, &set)
            .await;
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_fingerprint_failure_contained() {
        struct FailingPlotter;

        #[async_trait]
        impl FingerprintPlotter for FailingPlotter {
            async fn plot(&self, _manifest: &ControlFile) -> Result<(), HandlerError> {
                Err(HandlerError::Failed("no display".to_string()))
            }
        }

        let dir = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with(Level::L4, RecordingHandler::new(Arc::clone(&seen)));
        let runner = LevelRunner::new(&registry, &StandardCompliance, &FailingPlotter);

        let mut set = ControlFileSet::new();
        set.insert("1", write_manifest(&dir, "a.yaml")).unwrap();
        set.insert("2", write_manifest(&dir, "b.yaml")).unwrap();

        let report = runner
            .run_level(&ctx(), &CancelToken::new(), Level::L4, &set)
            .await;

        // Both handlers still ran; both units are marked failed by the
        // plotting side effect.
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(report.completed(), 0);
        assert!(report
            .outcomes
            .iter()
            .all(|outcome| matches!(outcome.status, UnitStatus::Failed(_))));
    }
}
