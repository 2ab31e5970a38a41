//! Local checkout of the repository to index.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{IndexError, Result};

const SUPPORTED_SCHEMES: [&str; 4] = ["https://", "http://", "git@", "file://"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    Cloned,
    AlreadyPresent,
}

#[derive(Debug, Clone)]
pub struct RepositoryManager {
    url: Option<String>,
    path: PathBuf,
}

impl RepositoryManager {
    #[must_use]
    pub fn new(url: Option<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url,
            path: path.into(),
        }
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shallow-clone the configured URL into the checkout path.
    ///
    /// An existing checkout is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `Clone` if no URL is configured, the URL scheme is not one of
    /// `https://`, `http://`, `git@` or `file://`, git cannot be spawned or
    /// exits unsuccessfully. A partially created checkout is removed.
    pub async fn clone_repository(&self) -> Result<CloneOutcome> {
        if self.path.exists() {
            tracing::info!(path = %self.path.display(), "repository already present, skipping clone");
            return Ok(CloneOutcome::AlreadyPresent);
        }
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| IndexError::Clone("no repository URL configured".into()))?;
        if !SUPPORTED_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            return Err(IndexError::Clone(format!("unsupported URL scheme: {url}")));
        }
        if url.chars().any(char::is_whitespace) {
            return Err(IndexError::Clone("URL must not contain whitespace".into()));
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::info!(%url, path = %self.path.display(), "cloning repository");
        let output = Command::new("git")
            .args(["clone", "--depth", "1", "--", url])
            .arg(&self.path)
            .output()
            .await
            .map_err(|e| IndexError::Clone(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            if self.path.exists() {
                let _ = tokio::fs::remove_dir_all(&self.path).await;
            }
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            tracing::warn!(%url, "git clone failed: {stderr}");
            return Err(IndexError::Clone(if stderr.is_empty() {
                format!(
                    "git exited with code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr
            }));
        }

        Ok(CloneOutcome::Cloned)
    }
}
