//! In-memory control file (manifest) representation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ControlFileError;

/// A parsed per-unit configuration manifest.
///
/// Control files are YAML documents with a `files` section (input/output
/// locations), an `options` section, an optional `level` tag used by the
/// per-site dispatcher, and any number of level-specific extra sections
/// the orchestrator carries through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlFile {
    /// Declared level tag, used in per-site manifests to route each entry
    /// to the right handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// File locations (`in_filename`, `out_filename`, `plot_path`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,

    /// Level options (`call_mode`, `show_plots`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,

    /// Level-specific sections the orchestrator does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,

    /// Path this manifest was loaded from, if any.
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl ControlFile {
    /// Loads a control file from disk.
    ///
    /// Loading either yields a usable structure or fails loudly; there is
    /// no partial success.
    ///
    /// # Errors
    ///
    /// Returns `ControlFileError` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ControlFileError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ControlFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut manifest: ControlFile =
            serde_yaml::from_str(&contents).map_err(|source| ControlFileError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        manifest.path = Some(path.to_path_buf());

        Ok(manifest)
    }

    /// Returns the path this manifest was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the file name component of the source path, for log messages.
    pub fn file_name(&self) -> String {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<unnamed>".to_string())
    }

    /// Returns an entry from the files section.
    pub fn file_entry(&self, key: &str) -> Option<&str> {
        self.files.get(key).map(String::as_str)
    }

    /// Returns an option value.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Sets an option value.
    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    /// Injects the non-interactive display settings used for batch runs.
    ///
    /// Handlers receive `call_mode=batch` and `show_plots=no` so that no
    /// level ever blocks on an interactive display.
    pub fn apply_batch_mode(&mut self) {
        self.set_option("call_mode", "batch");
        self.set_option("show_plots", "no");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_manifest(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write manifest");
        file
    }

    #[test]
    fn test_load_manifest() {
        let file = write_manifest(
            "level: l3\n\
             files:\n  in_filename: site_L2.nc\n  out_filename: site_L3.nc\n\
             options:\n  zms: \"2.0\"\n",
        );

        let manifest = ControlFile::load(file.path()).unwrap();
        assert_eq!(manifest.level.as_deref(), Some("l3"));
        assert_eq!(manifest.file_entry("in_filename"), Some("site_L2.nc"));
        assert_eq!(manifest.option("zms"), Some("2.0"));
        assert_eq!(manifest.path(), Some(file.path()));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ControlFile::load(Path::new("/nonexistent/manifest.yaml")).unwrap_err();
        assert!(err.to_string().contains("manifest.yaml"));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let file = write_manifest("files: [not, a, mapping\n");
        assert!(ControlFile::load(file.path()).is_err());
    }

    #[test]
    fn test_extra_sections_preserved() {
        let file = write_manifest(
            "files:\n  out_filename: out.nc\n\
             variables:\n  Fco2:\n    units: umol/m/s\n",
        );

        let manifest = ControlFile::load(file.path()).unwrap();
        assert!(manifest.extra.contains_key("variables"));
    }

    #[test]
    fn test_apply_batch_mode() {
        let mut manifest = ControlFile::default();
        manifest.set_option("show_plots", "yes");

        manifest.apply_batch_mode();
        assert_eq!(manifest.option("call_mode"), Some("batch"));
        assert_eq!(manifest.option("show_plots"), Some("no"));
    }

    #[test]
    fn test_file_name_fallback() {
        let manifest = ControlFile::default();
        assert_eq!(manifest.file_name(), "<unnamed>");
    }
}
