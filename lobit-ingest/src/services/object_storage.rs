//! Public object storage
//!
//! Release files are published by copying them to a remote path (a
//! `/`-separated key such as `Releases/artist/album/01-intro.opus`).

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::errors::{PipelineError, PipelineResult};

/// Object store holding the published release files
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Copy the local file to `remote`, replacing any existing object
    async fn upload(&self, local: &Path, remote: &str) -> PipelineResult<()>;

    async fn exists(&self, remote: &str) -> PipelineResult<bool>;

    async fn delete(&self, remote: &str) -> PipelineResult<()>;
}

/// Object storage backed by a local directory (served by the web front end)
#[derive(Debug, Clone)]
pub struct LocalDirStorage {
    root: PathBuf,
}

impl LocalDirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a remote key to a path under the root; keys escaping the root are rejected
    fn object_path(&self, remote: &str) -> PipelineResult<PathBuf> {
        let relative = Path::new(remote.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if remote.trim_start_matches('/').is_empty() || escapes {
            return Err(PipelineError::Upload(format!("Invalid object key '{}'", remote)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalDirStorage {
    async fn upload(&self, local: &Path, remote: &str) -> PipelineResult<()> {
        let target = self.object_path(remote)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::Upload(format!("{}: {}", parent.display(), e)))?;
        }

        fs::copy(local, &target).await.map_err(|e| {
            PipelineError::Upload(format!("{} -> {}: {}", local.display(), remote, e))
        })?;

        debug!(from = %local.display(), to = %remote, "Stored object");
        Ok(())
    }

    async fn exists(&self, remote: &str) -> PipelineResult<bool> {
        let target = self.object_path(remote)?;
        Ok(fs::try_exists(&target).await?)
    }

    async fn delete(&self, remote: &str) -> PipelineResult<()> {
        let target = self.object_path(remote)?;
        fs::remove_file(&target)
            .await
            .map_err(|e| PipelineError::Upload(format!("Delete {} failed: {}", remote, e)))
    }
}
