//! Asynchronous Plastic SCM CLI (`cm`) client.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::ContentProvider;
use crate::errors::PlasticError;

/// Client for a Plastic workspace via the `cm` command line.
#[derive(Debug, Clone)]
pub struct PlasticClient {
    binary: String,
    workspace: PathBuf,
    timeout: Option<Duration>,
}

impl PlasticClient {
    /// Create a client running `binary` inside `workspace`.
    pub fn new(binary: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        let client = Self {
            binary: binary.into(),
            workspace: workspace.into(),
            timeout: None,
        };
        info!(binary = %client.binary, workspace = %client.workspace.display(), "created PlasticClient");
        client
    }

    /// Kill and fail any `cm` call that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// `cm cat <path> --rev=cs:<id>`, returning raw stdout bytes.
    #[instrument(skip(self))]
    pub async fn cat(&self, path: &str, changeset: i64) -> Result<Vec<u8>, PlasticError> {
        let rev = format!("--rev=cs:{}", changeset);
        let content = self.run_cm(&["cat", path, &rev]).await?;
        debug!(bytes = content.len(), "retrieved file content");
        Ok(content)
    }

    /// `cm switch cs:<id>`.
    #[instrument(skip(self))]
    pub async fn switch(&self, changeset: i64) -> Result<(), PlasticError> {
        let target = format!("cs:{}", changeset);
        self.run_cm(&["switch", &target]).await?;
        info!(changeset, "switched workspace");
        Ok(())
    }

    async fn run_cm(&self, args: &[&str]) -> Result<Vec<u8>, PlasticError> {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&self.workspace)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(cmd = ?format!("{} {}", self.binary, args.join(" ")), "running cm command");
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    warn!(secs = limit.as_secs(), "cm command timed out");
                    PlasticError::Timeout {
                        secs: limit.as_secs(),
                    }
                })?,
            None => cmd.output().await,
        }
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlasticError::BinaryNotFound(self.binary.clone())
            } else {
                PlasticError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "cm command failed");
            return Err(PlasticError::CommandFailed { exit_code, stderr });
        }
        Ok(output.stdout)
    }
}

impl ContentProvider for PlasticClient {
    async fn retrieve(&self, path: &str, changeset: i64) -> Result<Vec<u8>, PlasticError> {
        self.cat(path, changeset).await
    }

    async fn switch_workspace(&self, changeset: i64) -> Result<(), PlasticError> {
        self.switch(changeset).await
    }
}
