//! Batch configuration loading.
//!
//! One YAML file drives a whole batch run: the declared level sequence,
//! the per-level control file sets, the per-site manifests for fan-out
//! mode, and the external handler command for each level.
//!
//! ```yaml
//! options:
//!   levels: [l1, l2, concatenate]
//! pool_size: 5
//! handlers:
//!   l1: [pfp-run, l1]
//!   l2: [pfp-run, l2]
//!   concatenate: [pfp-concat]
//! fingerprint: [pfp-fingerprint]
//! levels:
//!   l1:
//!     "1": controlfiles/site_a/L1.yaml
//!     "2": controlfiles/site_b/L1.yaml
//! sites:
//!   site_a:
//!     "1": controlfiles/site_a/L1.yaml
//!     "2": controlfiles/site_a/L2.yaml
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::control::{ControlFileSet, SiteManifest};
use crate::dispatch::DEFAULT_POOL_SIZE;
use crate::error::ConfigError;
use crate::handler::{CommandHandler, CommandPlotter, FingerprintPlotter, NoopPlotter};
use crate::levels::{Level, LevelRegistry};

/// Top-level options section of the batch configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchOptions {
    /// Declared level sequence for a `run` invocation.
    #[serde(default)]
    pub levels: Vec<String>,
}

/// Parsed batch configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Run options, including the declared level sequence.
    #[serde(default)]
    pub options: BatchOptions,

    /// Per-level control file sets, keyed by level name.
    #[serde(default)]
    pub levels: BTreeMap<String, ControlFileSet>,

    /// Per-site manifests for fan-out mode.
    #[serde(default)]
    pub sites: BTreeMap<String, SiteManifest>,

    /// External handler command line per level name.
    #[serde(default)]
    pub handlers: BTreeMap<String, Vec<String>>,

    /// Optional fingerprint plotting command line.
    #[serde(default)]
    pub fingerprint: Option<Vec<String>>,

    /// Worker pool size for fan-out mode.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

impl BatchConfig {
    /// Loads and parses a batch configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validates the configuration for a level-sequence (`run`) invocation.
    ///
    /// The declared sequence must be present and the pool size sane.
    /// Unknown level names in the sequence are *not* rejected here; they
    /// are logged and skipped at run time, matching the non-fatal contract
    /// for unrecognized levels. Handler entries, in contrast, must name
    /// known levels: a typo there would silently disable a whole level.
    pub fn validate_for_run(&self) -> Result<(), ConfigError> {
        if self.options.levels.is_empty() {
            return Err(ConfigError::MissingLevels);
        }
        self.validate_common()
    }

    /// Validates the configuration for a per-site (`sites`) invocation.
    pub fn validate_for_sites(&self) -> Result<(), ConfigError> {
        if self.sites.is_empty() {
            return Err(ConfigError::NoSites);
        }
        self.validate_common()
    }

    fn validate_common(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }
        for (name, command_line) in &self.handlers {
            Level::from_str(name)
                .map_err(|_| ConfigError::UnknownHandlerLevel(name.clone()))?;
            if command_line.is_empty() {
                return Err(ConfigError::EmptyHandlerCommand(name.clone()));
            }
        }
        Ok(())
    }

    /// Returns the control file set declared for a level, looking up the
    /// declared name verbatim first and the canonical name second.
    pub fn control_set(&self, declared: &str, level: Level) -> Option<&ControlFileSet> {
        self.levels
            .get(declared)
            .or_else(|| self.levels.get(level.as_str()))
    }

    /// Builds the level registry from the configured handler commands.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a handler names an unknown level or has an
    /// empty command line.
    pub fn build_registry(&self) -> Result<LevelRegistry, ConfigError> {
        let mut builder = LevelRegistry::builder();
        for (name, command_line) in &self.handlers {
            let level = Level::from_str(name)
                .map_err(|_| ConfigError::UnknownHandlerLevel(name.clone()))?;
            let handler = CommandHandler::from_command_line(name, command_line)?;
            builder = builder.register(level, Arc::new(handler));
        }
        Ok(builder.build())
    }

    /// Builds the fingerprint plotter, a no-op when none is configured.
    pub fn build_plotter(&self) -> Result<Arc<dyn FingerprintPlotter>, ConfigError> {
        match &self.fingerprint {
            Some(command_line) => Ok(Arc::new(CommandPlotter::from_command_line(command_line)?)),
            None => Ok(Arc::new(NoopPlotter)),
        }
    }
}
