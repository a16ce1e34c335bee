//! Ordered collections of manifest locators.
//!
//! Control file sets preserve declaration order so that levels running
//! under the declaration-order policy match the configuration as written,
//! while numeric-ordered levels sort their keys ascending at iteration
//! time. Site manifests always iterate numerically regardless of the
//! level each entry declares.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::error::ControlFileError;
use crate::levels::KeyOrdering;

/// The collection of manifests queued for one level within one run.
///
/// Keys are string-encoded ordinals ("1", "2", ...). Keys are unique;
/// insertion order is preserved so declaration-order iteration reproduces
/// the configuration file exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlFileSet {
    entries: Vec<(String, PathBuf)>,
}

impl ControlFileSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set containing a single entry.
    ///
    /// The per-site dispatcher routes each site entry through the level
    /// runner as its own single-entry set.
    pub fn single(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            entries: vec![(key.into(), path.into())],
        }
    }

    /// Appends an entry, rejecting duplicate keys.
    ///
    /// # Errors
    ///
    /// Returns `ControlFileError::DuplicateKey` if `key` is already present.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<(), ControlFileError> {
        let key = key.into();
        if self.entries.iter().any(|(existing, _)| *existing == key) {
            return Err(ControlFileError::DuplicateKey(key));
        }
        self.entries.push((key, path.into()));
        Ok(())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entries in the order dictated by `ordering`.
    ///
    /// Under [`KeyOrdering::Numeric`], keys that parse as integers sort
    /// first in ascending numeric order; any non-numeric keys follow in
    /// lexical order with a warning, rather than aborting the level run.
    pub fn iter_ordered(&self, ordering: KeyOrdering) -> Vec<(&str, &Path)> {
        let mut entries: Vec<(&str, &Path)> = self
            .entries
            .iter()
            .map(|(key, path)| (key.as_str(), path.as_path()))
            .collect();

        if ordering == KeyOrdering::Numeric {
            for (key, _) in &entries {
                if key.parse::<u64>().is_err() {
                    warn!(key, "Non-numeric ordinal key under numeric ordering");
                }
            }
            entries.sort_by(|(a, _), (b, _)| match (a.parse::<u64>(), b.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                (Err(_), Err(_)) => a.cmp(b),
            });
        }

        entries
    }
}

impl Serialize for ControlFileSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, path) in &self.entries {
            map.serialize_entry(key, path)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ControlFileSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = ControlFileSet;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a mapping of ordinal keys to control file paths")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut set = ControlFileSet::new();
                while let Some((key, path)) = access.next_entry::<String, PathBuf>()? {
                    set.insert(key, path).map_err(serde::de::Error::custom)?;
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(SetVisitor)
    }
}

/// Per-site ordered list of manifest locators.
///
/// Each entry is independently dispatched to the handler for the level its
/// manifest declares; iteration is always ascending numeric, regardless of
/// level type, because a site's entries form one output-chained pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteManifest {
    entries: ControlFileSet,
}

impl SiteManifest {
    /// Creates an empty site manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, rejecting duplicate keys.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<(), ControlFileError> {
        self.entries.insert(key, path)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entries in ascending numeric key order.
    pub fn iter_ordered(&self) -> Vec<(&str, &Path)> {
        self.entries.iter_ordered(KeyOrdering::Numeric)
    }
}
