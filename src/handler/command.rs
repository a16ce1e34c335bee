//! Command-based default implementations of the collaborator contracts.
//!
//! Each level's science lives outside this crate; the default handler
//! delegates a manifest to a configured external executable, passing the
//! manifest path as the final argument and exporting the manifest options
//! through the environment. The process boundary means the orchestrator
//! only ever observes "handler succeeded" or "handler failed".

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::control::ControlFile;
use crate::error::{ConfigError, HandlerError};
use crate::session::SessionContext;

use super::{FingerprintPlotter, LevelHandler};

/// Prefix for environment variables carrying manifest options into the
/// handler process.
const OPTION_ENV_PREFIX: &str = "FLUXBATCH_OPT_";

/// Level handler that spawns an external executable per manifest.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    program: String,
    args: Vec<String>,
}

impl CommandHandler {
    /// Creates a handler from a configured command line.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyHandlerCommand` if `command_line` is empty.
    pub fn from_command_line(name: &str, command_line: &[String]) -> Result<Self, ConfigError> {
        let (program, args) = command_line
            .split_first()
            .ok_or_else(|| ConfigError::EmptyHandlerCommand(name.to_string()))?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Returns the program this handler spawns.
    pub fn program(&self) -> &str {
        &self.program
    }

    fn build_command(&self, ctx: &SessionContext, manifest: &ControlFile) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(path) = manifest.path() {
            command.arg(path);
        }
        for (key, value) in &manifest.options {
            command.env(
                format!("{OPTION_ENV_PREFIX}{}", key.to_ascii_uppercase()),
                value,
            );
        }
        let context = serde_json::json!({
            "mode": ctx.mode.to_string(),
            "site": ctx.site,
        });
        command.env("FLUXBATCH_CONTEXT", context.to_string());
        command.stdin(Stdio::null());
        command
    }
}

#[async_trait]
impl LevelHandler for CommandHandler {
    async fn run(&self, ctx: &SessionContext, manifest: &ControlFile) -> Result<(), HandlerError> {
        let status = self
            .build_command(ctx, manifest)
            .status()
            .await
            .map_err(|source| HandlerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(HandlerError::NonZeroExit {
                program: self.program.clone(),
                code: status.code(),
            });
        }

        Ok(())
    }
}

/// Fingerprint plotter that spawns a configured plotting command.
///
/// The command receives the completed manifest's output file and plot path
/// as its two trailing arguments, mirroring the fingerprint control file
/// the interactive tooling would have assembled.
#[derive(Debug, Clone)]
pub struct CommandPlotter {
    program: String,
    args: Vec<String>,
}

impl CommandPlotter {
    /// Creates a plotter from a configured command line.
    pub fn from_command_line(command_line: &[String]) -> Result<Self, ConfigError> {
        let (program, args) = command_line
            .split_first()
            .ok_or_else(|| ConfigError::EmptyHandlerCommand("fingerprint".to_string()))?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl FingerprintPlotter for CommandPlotter {
    async fn plot(&self, manifest: &ControlFile) -> Result<(), HandlerError> {
        let out_filename =
            manifest
                .file_entry("out_filename")
                .ok_or_else(|| HandlerError::MissingFileEntry {
                    field: "out_filename".to_string(),
                })?;
        let plot_path = manifest.file_entry("plot_path").unwrap_or("plots/");

        info!(file = %out_filename, "Doing fingerprint plots");

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(PathBuf::from(out_filename))
            .arg(PathBuf::from(plot_path))
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| HandlerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(HandlerError::NonZeroExit {
                program: self.program.clone(),
                code: status.code(),
            });
        }

        info!("Finished fingerprint plots");
        Ok(())
    }
}

/// Plotter used when no fingerprint command is configured.
#[derive(Debug, Clone, Default)]
pub struct NoopPlotter;

#[async_trait]
impl FingerprintPlotter for NoopPlotter {
    async fn plot(&self, manifest: &ControlFile) -> Result<(), HandlerError> {
        debug!(manifest = %manifest.file_name(), "No fingerprint command configured, skipping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RunMode;

    fn batch_ctx() -> SessionContext {
        SessionContext {
            mode: RunMode::Batch,
            site: None,
        }
    }

    #[test]
    fn test_empty_command_line_rejected() {
        let err = CommandHandler::from_command_line("l1", &[]).unwrap_err();
        assert!(err.to_string().contains("l1"));

        assert!(CommandPlotter::from_command_line(&[]).is_err());
    }

    #[test]
    fn test_command_handler_program() {
        let handler =
            CommandHandler::from_command_line("mpt", &["mpt-detect".to_string(), "-q".to_string()])
                .unwrap();
        assert_eq!(handler.program(), "mpt-detect");
    }

    #[tokio::test]
    async fn test_command_handler_success() {
        let handler = CommandHandler::from_command_line("l1", &["true".to_string()]).unwrap();
        let manifest = ControlFile::default();
        assert!(handler.run(&batch_ctx(), &manifest).await.is_ok());
    }

    #[tokio::test]
    async fn test_command_handler_nonzero_exit() {
        let handler = CommandHandler::from_command_line("l1", &["false".to_string()]).unwrap();
        let manifest = ControlFile::default();
        let err = handler.run(&batch_ctx(), &manifest).await.unwrap_err();
        assert!(matches!(err, HandlerError::NonZeroExit { .. }));
    }

    #[tokio::test]
    async fn test_command_handler_spawn_failure() {
        let handler =
            CommandHandler::from_command_line("l1", &["/nonexistent/handler".to_string()]).unwrap();
        let manifest = ControlFile::default();
        let err = handler.run(&batch_ctx(), &manifest).await.unwrap_err();
        assert!(matches!(err, HandlerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_noop_plotter() {
        let plotter = NoopPlotter;
        assert!(plotter.plot(&ControlFile::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_command_plotter_requires_out_filename() {
        let plotter = CommandPlotter::from_command_line(&["true".to_string()]).unwrap();
        let err = plotter.plot(&ControlFile::default()).await.unwrap_err();
        assert!(matches!(err, HandlerError::MissingFileEntry { .. }));
    }

    #[tokio::test]
    async fn test_command_plotter_success() {
        let plotter = CommandPlotter::from_command_line(&["true".to_string()]).unwrap();
        let mut manifest = ControlFile::default();
        manifest
            .files
            .insert("out_filename".to_string(), "site.nc".to_string());
        assert!(plotter.plot(&manifest).await.is_ok());
    }
}
