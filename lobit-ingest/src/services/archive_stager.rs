//! Archive staging
//!
//! Downloads a release archive from the public static origin and unpacks it
//! into a per-archive staging directory under the scratch area.

use async_trait::async_trait;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

use super::errors::{PipelineError, PipelineResult};
use super::metadata_extractor::COVER_FILE_NAME;

/// Source of release archive bytes
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Fetch the full archive named `file`
    async fn fetch(&self, file: &str) -> PipelineResult<Vec<u8>>;
}

/// Fetches archives over HTTP from `{static_base}/Releases/{file}`
pub struct HttpArchiveSource {
    http_client: reqwest::Client,
    static_base: String,
}

impl HttpArchiveSource {
    pub fn new(static_base: impl Into<String>) -> PipelineResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .user_agent(concat!("lobit-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Download(e.to_string()))?;

        Ok(Self {
            http_client,
            static_base: static_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn archive_url(&self, file: &str) -> String {
        format!("{}/Releases/{}", self.static_base, file)
    }
}

#[async_trait]
impl ArchiveSource for HttpArchiveSource {
    async fn fetch(&self, file: &str) -> PipelineResult<Vec<u8>> {
        let url = self.archive_url(file);
        debug!(url = %url, "Fetching release archive");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Download(format!("{} returned {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Download(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

/// Staging directory name for an archive: the file name without `.zip`
pub fn staging_dir_name(file: &str) -> &str {
    file.strip_suffix(".zip")
        .or_else(|| file.strip_suffix(".ZIP"))
        .unwrap_or(file)
}

/// Downloads and extracts release archives into the scratch area
pub struct ArchiveStager {
    source: Arc<dyn ArchiveSource>,
    tmp_directory: PathBuf,
}

impl ArchiveStager {
    pub fn new(source: Arc<dyn ArchiveSource>, tmp_directory: impl Into<PathBuf>) -> Self {
        Self {
            source,
            tmp_directory: tmp_directory.into(),
        }
    }

    pub fn tmp_directory(&self) -> &Path {
        &self.tmp_directory
    }

    pub fn staging_dir(&self, file: &str) -> PathBuf {
        self.tmp_directory.join(staging_dir_name(file))
    }

    /// Stage the archive `file` and return its staging directory
    ///
    /// With `reuse_if_present`, a staging directory that already holds the
    /// cover image is returned without downloading again.
    pub async fn stage(&self, file: &str, reuse_if_present: bool) -> PipelineResult<PathBuf> {
        if !is_plain_file_name(file) {
            return Err(PipelineError::Validation(format!(
                "Invalid archive name '{}'",
                file
            )));
        }

        let staging_dir = self.staging_dir(file);

        if reuse_if_present && staging_dir.join(COVER_FILE_NAME).is_file() {
            info!(file = %file, dir = %staging_dir.display(), "Reusing extracted archive");
            return Ok(staging_dir);
        }

        let bytes = self.source.fetch(file).await?;
        info!(file = %file, bytes = bytes.len(), "Downloaded release archive");

        fs::create_dir_all(&self.tmp_directory)
            .await
            .map_err(|e| PipelineError::Extract(e.to_string()))?;
        let archive_path = self.tmp_directory.join(file);
        fs::write(&archive_path, &bytes)
            .await
            .map_err(|e| PipelineError::Extract(format!("{}: {}", archive_path.display(), e)))?;

        // Files left over from an earlier extraction would end up as extra tracks
        remove_stale_dir(&staging_dir).await?;

        let target = staging_dir.clone();
        tokio::task::spawn_blocking(move || extract_zip(bytes, &target))
            .await
            .map_err(|e| PipelineError::Extract(format!("Extraction task failed: {}", e)))??;

        info!(file = %file, dir = %staging_dir.display(), "Extracted release archive");
        Ok(staging_dir)
    }
}

async fn remove_stale_dir(dir: &Path) -> PipelineResult<()> {
    let extract_error =
        |e: std::io::Error| PipelineError::Extract(format!("{}: {}", dir.display(), e));
    if fs::try_exists(dir).await.map_err(extract_error)? {
        fs::remove_dir_all(dir).await.map_err(extract_error)?;
    }
    Ok(())
}

/// A single normal path component without separators
fn is_plain_file_name(file: &str) -> bool {
    if file.contains('/') || file.contains('\\') {
        return false;
    }
    let mut components = Path::new(file).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Unpack a zip archive into `target`, creating it if needed
fn extract_zip(bytes: Vec<u8>, target: &Path) -> PipelineResult<()> {
    std::fs::create_dir_all(target).map_err(|e| PipelineError::Extract(e.to_string()))?;
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| PipelineError::Extract(e.to_string()))?;
    archive
        .extract(target)
        .map_err(|e| PipelineError::Extract(e.to_string()))
}
