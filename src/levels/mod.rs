//! Processing level identifiers and the handler registry.
//!
//! A "level" is one named stage of the flux data pipeline, from raw quality
//! control (`l1`) through multi-year derived products (`l6`), plus the
//! concatenation, climatology, u-star threshold and export stages. The set
//! of known levels is closed: extending it is a construction-time operation
//! on the registry, never a run-time one.

mod registry;

pub use registry::{LevelRegistry, RegistryBuilder};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a level name is not a member of the known set.
#[derive(Debug, Error)]
#[error("Unrecognised processing level '{0}'")]
pub struct UnknownLevel(pub String);

/// Iteration order applied to a level's control file set.
///
/// Stages whose outputs chain across files (concatenation and the
/// multi-year derived levels) must process their manifests in ascending
/// numeric key order. All other stages run in the order the manifests were
/// declared. This asymmetry is inherited from the operational tooling this
/// orchestrator replaces and is deliberately preserved rather than
/// normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrdering {
    /// Ascending numeric key order ("1", "2", "10").
    Numeric,
    /// The order the manifests were declared in the configuration.
    Declaration,
}

/// One named stage of the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Raw data ingest and first quality control pass.
    L1,
    /// Range and diagnostic quality control.
    L2,
    /// Corrected fluxes.
    L3,
    /// ECOSTRESS CSV export.
    Ecostress,
    /// FluxNet CSV export.
    Fluxnet,
    /// REddyProc TSV export.
    Reddyproc,
    /// Concatenation of per-year files into a single record.
    Concatenate,
    /// Long-term climatology summary.
    Climatology,
    /// u-star threshold by change point detection (Barr).
    CpdBarr,
    /// u-star threshold by change point detection (McHugh).
    CpdMchugh,
    /// u-star threshold by change point detection (McNew).
    CpdMcnew,
    /// u-star threshold by moving point threshold, delegated to an
    /// external executable.
    Mpt,
    /// Gap-filled meteorological drivers.
    L4,
    /// Gap-filled fluxes.
    L5,
    /// Partitioned fluxes.
    L6,
}

impl Level {
    /// All known levels, in canonical pipeline order.
    pub const ALL: [Level; 15] = [
        Level::L1,
        Level::L2,
        Level::L3,
        Level::Ecostress,
        Level::Fluxnet,
        Level::Reddyproc,
        Level::Concatenate,
        Level::Climatology,
        Level::CpdBarr,
        Level::CpdMchugh,
        Level::CpdMcnew,
        Level::Mpt,
        Level::L4,
        Level::L5,
        Level::L6,
    ];

    /// Returns the canonical lowercase name of this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::L1 => "l1",
            Level::L2 => "l2",
            Level::L3 => "l3",
            Level::Ecostress => "ecostress",
            Level::Fluxnet => "fluxnet",
            Level::Reddyproc => "reddyproc",
            Level::Concatenate => "concatenate",
            Level::Climatology => "climatology",
            Level::CpdBarr => "cpd_barr",
            Level::CpdMchugh => "cpd_mchugh",
            Level::CpdMcnew => "cpd_mcnew",
            Level::Mpt => "mpt",
            Level::L4 => "l4",
            Level::L5 => "l5",
            Level::L6 => "l6",
        }
    }

    /// Returns the iteration order policy for this level's control file set.
    ///
    /// Concatenation and the multi-year derived levels (`l4`, `l5`) chain
    /// output across files and require ascending numeric order; every other
    /// level runs in declaration order.
    pub fn ordering(&self) -> KeyOrdering {
        match self {
            Level::Concatenate | Level::L4 | Level::L5 => KeyOrdering::Numeric,
            _ => KeyOrdering::Declaration,
        }
    }

    /// Returns whether a fingerprint plot is produced as a side effect
    /// after a manifest of this level completes successfully.
    pub fn plots_fingerprint(&self) -> bool {
        matches!(self, Level::Concatenate | Level::L4 | Level::L5)
    }

    /// Returns a short human-readable description used in log messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Level::L1 => "L1 processing",
            Level::L2 => "L2 processing",
            Level::L3 => "L3 processing",
            Level::Ecostress => "ECOSTRESS output",
            Level::Fluxnet => "FluxNet output",
            Level::Reddyproc => "REddyProc output",
            Level::Concatenate => "concatenation",
            Level::Climatology => "climatology",
            Level::CpdBarr => "CPD (Barr)",
            Level::CpdMchugh => "CPD (McHugh)",
            Level::CpdMcnew => "CPD (McNew)",
            Level::Mpt => "MPT",
            Level::L4 => "L4 processing",
            Level::L5 => "L5 processing",
            Level::L6 => "L6 processing",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = UnknownLevel;

    /// Parses a level name case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Level::ALL
            .iter()
            .find(|level| level.as_str() == lower)
            .copied()
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}
