//! Control files (manifests) and ordered control file sets.
//!
//! A control file describes one unit of work for one level: input and
//! output locations plus level-specific options. A control file set is the
//! collection of manifests queued for one level within one run, keyed by a
//! string-encoded ordinal.

mod file;
mod set;

pub use file::ControlFile;
pub use set::{ControlFileSet, SiteManifest};
