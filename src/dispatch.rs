//! Parallel per-site dispatcher with a bounded worker pool.
//!
//! Fans the full pipeline out across independent sites. Each site is one
//! task gated by a semaphore of fixed size; workers share nothing mutable
//! and a site's total failure (including a panic) never cancels or affects
//! the others. Cancellation in this mode is deliberately weaker than in
//! the sequential runner: the batch token is consulted only before a
//! site's pipeline begins, so a stop request takes effect at the next
//! yet-unscheduled site.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::control::{ControlFile, ControlFileSet, SiteManifest};
use crate::handler::{ComplianceUpdate, FingerprintPlotter};
use crate::levels::{Level, LevelRegistry};
use crate::runner::{LevelReport, LevelRunner};
use crate::session::{CancelToken, RunMode, SessionContext};

/// Default number of concurrent site workers.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Final status of one site's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteStatus {
    /// The site's entries were all driven through the runner.
    Completed,
    /// The site was never started because a stop was requested first.
    Skipped,
    /// The site's worker panicked; other sites are unaffected.
    Panicked,
}

/// Result of one site's pipeline run.
#[derive(Debug)]
pub struct SiteReport {
    /// Site name.
    pub site: String,
    /// How the site ended.
    pub status: SiteStatus,
    /// Per-entry level reports, in processing order.
    pub reports: Vec<LevelReport>,
}

impl SiteReport {
    fn skipped(site: String) -> Self {
        Self {
            site,
            status: SiteStatus::Skipped,
            reports: Vec::new(),
        }
    }

    fn panicked(site: String) -> Self {
        Self {
            site,
            status: SiteStatus::Panicked,
            reports: Vec::new(),
        }
    }
}

/// Shared read-only collaborators handed to every site worker.
#[derive(Clone)]
pub struct SiteCollaborators {
    /// Level handler registry.
    pub registry: Arc<LevelRegistry>,
    /// Manifest validator.
    pub compliance: Arc<dyn ComplianceUpdate>,
    /// Fingerprint side-effect collaborator.
    pub plotter: Arc<dyn FingerprintPlotter>,
}

/// Bounded-concurrency dispatcher over independent sites.
///
/// Pool concurrency is fixed at construction and does not vary with site
/// count; excess sites queue for the next available worker slot.
pub struct SiteDispatcher {
    pool_size: usize,
}

impl SiteDispatcher {
    /// Creates a dispatcher with the given pool size.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size: pool_size.max(1),
        }
    }

    /// Returns the configured pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Runs every site's pipeline, at most `pool_size` concurrently.
    ///
    /// Every submitted site yields exactly one report; sites complete in
    /// whatever order their workers finish. No ordering guarantee exists
    /// across sites, only within one site's entries.
    pub async fn run_sites(
        &self,
        token: &CancelToken,
        sites: &BTreeMap<String, SiteManifest>,
        collaborators: SiteCollaborators,
    ) -> Vec<SiteReport> {
        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut join_set = JoinSet::new();

        for (site, manifest) in sites {
            let site = site.clone();
            let manifest = manifest.clone();
            let token = token.clone();
            let semaphore = Arc::clone(&semaphore);
            let collaborators = collaborators.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return SiteReport::skipped(site),
                };

                if token.is_stopped() {
                    info!(site = %site, "Stop requested before site started, skipping");
                    return SiteReport::skipped(site);
                }

                // The site pipeline runs in its own task so a panic inside
                // a handler is contained to this site.
                let worker = tokio::spawn(run_site(site.clone(), manifest, collaborators));
                match worker.await {
                    Ok(report) => report,
                    Err(err) => {
                        error!(site = %site, error = %err, "Site worker panicked");
                        SiteReport::panicked(site)
                    }
                }
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                // The outer task body cannot panic; log and account for the
                // site anyway rather than losing it silently.
                Err(err) => {
                    error!(error = %err, "Site task failed to join");
                    reports.push(SiteReport::panicked("<unknown>".to_string()));
                }
            }
        }

        reports
    }
}

impl Default for SiteDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

/// Drives one site's ordinal-ordered entries through the level runner.
///
/// Each entry's manifest declares its own level; an unrecognized or
/// missing declaration is fatal to that entry only, and the site's later
/// entries still run. The worker runs under its own fresh token, so a
/// batch-level stop does not interrupt a site already in progress.
async fn run_site(
    site: String,
    manifest: SiteManifest,
    collaborators: SiteCollaborators,
) -> SiteReport {
    info!(site = %site, entries = manifest.len(), "Starting site pipeline");

    let ctx = SessionContext {
        mode: RunMode::Batch,
        site: Some(site.clone()),
    };
    let site_token = CancelToken::new();
    let runner = LevelRunner::new(
        collaborators.registry.as_ref(),
        collaborators.compliance.as_ref(),
        collaborators.plotter.as_ref(),
    );

    let mut reports = Vec::new();
    for (key, path) in manifest.iter_ordered() {
        let declared = match ControlFile::load(path) {
            Ok(entry_manifest) => entry_manifest.level,
            Err(err) => {
                error!(site = %site, key, "{err}");
                continue;
            }
        };

        let Some(declared) = declared else {
            error!(site = %site, key, path = %path.display(), "Control file declares no level");
            continue;
        };

        let level = match Level::from_str(&declared) {
            Ok(level) => level,
            Err(err) => {
                error!(site = %site, key, "{err}");
                continue;
            }
        };

        let set = ControlFileSet::single(key, path);
        reports.push(runner.run_level(&ctx, &site_token, level, &set).await);
    }

    info!(site = %site, "Finished site pipeline");

    SiteReport {
        site,
        status: SiteStatus::Completed,
        reports,
    }
}
