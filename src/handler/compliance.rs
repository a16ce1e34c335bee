//! Standard compliance update for control files.

use async_trait::async_trait;
use tracing::warn;

use crate::control::ControlFile;
use crate::levels::Level;

use super::ComplianceUpdate;

/// Default plot output directory filled in when a manifest omits one.
const DEFAULT_PLOT_PATH: &str = "plots/";

/// Default manifest validation and normalization.
///
/// A manifest is usable when its files section names the artifact the level
/// consumes or produces: export levels read an `in_filename`, every other
/// level writes an `out_filename`. A declared `level` tag that contradicts
/// the running level is also a rejection, since it means the manifest was
/// queued under the wrong stage. Usable manifests get a default `plot_path`
/// filled in.
#[derive(Debug, Clone, Default)]
pub struct StandardCompliance;

impl StandardCompliance {
    fn required_file_entry(level: Level) -> &'static str {
        match level {
            Level::Ecostress | Level::Fluxnet | Level::Reddyproc => "in_filename",
            _ => "out_filename",
        }
    }
}

#[async_trait]
impl ComplianceUpdate for StandardCompliance {
    async fn update(&self, level: Level, manifest: &mut ControlFile) -> bool {
        let name = manifest.file_name();

        if let Some(declared) = manifest.level.as_deref() {
            if !declared.eq_ignore_ascii_case(level.as_str()) {
                warn!(
                    manifest = %name,
                    declared,
                    running = %level,
                    "Control file declares a different level, skipping"
                );
                return false;
            }
        }

        let required = Self::required_file_entry(level);
        if manifest.file_entry(required).is_none() {
            warn!(
                manifest = %name,
                field = required,
                "Control file is missing a required files entry, skipping"
            );
            return false;
        }

        if manifest.file_entry("plot_path").is_none() {
            manifest
                .files
                .insert("plot_path".to_string(), DEFAULT_PLOT_PATH.to_string());
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_with_out(out: &str) -> ControlFile {
        let mut manifest = ControlFile::default();
        manifest
            .files
            .insert("out_filename".to_string(), out.to_string());
        manifest
    }

    #[tokio::test]
    async fn test_usable_manifest() {
        let compliance = StandardCompliance;
        let mut manifest = manifest_with_out("site_L3.nc");
        assert!(compliance.update(Level::L3, &mut manifest).await);
        assert_eq!(manifest.file_entry("plot_path"), Some(DEFAULT_PLOT_PATH));
    }

    #[tokio::test]
    async fn test_missing_out_filename_rejected() {
        let compliance = StandardCompliance;
        let mut manifest = ControlFile::default();
        assert!(!compliance.update(Level::L1, &mut manifest).await);
    }

    #[tokio::test]
    async fn test_export_level_requires_in_filename() {
        let compliance = StandardCompliance;

        let mut manifest = ControlFile::default();
        manifest
            .files
            .insert("in_filename".to_string(), "site.nc".to_string());
        assert!(compliance.update(Level::Fluxnet, &mut manifest).await);

        // An out_filename alone does not satisfy an export level.
        let mut manifest = manifest_with_out("site.csv");
        assert!(!compliance.update(Level::Ecostress, &mut manifest).await);
    }

    #[tokio::test]
    async fn test_mismatched_level_tag_rejected() {
        let compliance = StandardCompliance;
        let mut manifest = manifest_with_out("site_L4.nc");
        manifest.level = Some("l4".to_string());

        assert!(!compliance.update(Level::L5, &mut manifest).await);
        assert!(compliance.update(Level::L4, &mut manifest).await);
    }

    #[tokio::test]
    async fn test_level_tag_case_insensitive() {
        let compliance = StandardCompliance;
        let mut manifest = manifest_with_out("site.nc");
        manifest.level = Some("Concatenate".to_string());
        assert!(compliance.update(Level::Concatenate, &mut manifest).await);
    }

    #[tokio::test]
    async fn test_existing_plot_path_kept() {
        let compliance = StandardCompliance;
        let mut manifest = manifest_with_out("site.nc");
        manifest
            .files
            .insert("plot_path".to_string(), "figures/".to_string());

        assert!(compliance.update(Level::L2, &mut manifest).await);
        assert_eq!(manifest.file_entry("plot_path"), Some("figures/"));
    }
}
