//! Print collaborator.

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::PrintSettings;
use crate::error::DeliveryError;

/// Prints an archived artifact.
#[trait_variant::make(Printer: Send)]
pub trait LocalPrinter {
    async fn print(&self, path: &Path) -> Result<(), DeliveryError>;
}

/// Hands the file to a spooler command (`lp` by default).
#[derive(Debug, Clone)]
pub struct CommandPrinter {
    command: String,
    args: Vec<String>,
}

impl CommandPrinter {
    pub fn new(settings: &PrintSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
        }
    }
}

impl Printer for CommandPrinter {
    #[instrument(skip(self), fields(command = %self.command))]
    async fn print(&self, path: &Path) -> Result<(), DeliveryError> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DeliveryError::Print(format!("'{}' not found", self.command))
                } else {
                    DeliveryError::Print(e.to_string())
                }
            })?;

        if output.status.success() {
            debug!(stdout = %String::from_utf8_lossy(&output.stdout).trim(), "Print job queued");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DeliveryError::Print(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )))
        }
    }
}
