//! archive.org submission client
//!
//! Mirrors a published release to an archive.org item through the IA-S3
//! API: every file of the staging directory is PUT to
//! `{endpoint}/{identifier}/{file}`; the first request creates the item and
//! carries the item metadata as `x-archive-meta-*` headers.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

use super::errors::{PipelineError, PipelineResult};
use crate::config::ArchiveOrgSettings;
use crate::models::ReleaseMetadata;

/// Subject tag attached to every submitted item
pub const ITEM_SUBJECT: &str = "lobit";

/// Unreserved characters stay literal inside `uri(...)` header values
const HEADER_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters that cannot appear raw in a single URL path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Release as handed to the submission service
#[derive(Debug, Clone)]
pub struct ReleaseSubmission {
    pub catalog_number: Option<String>,
    pub metadata: ReleaseMetadata,
    /// Release page HTML
    pub page_content: String,
}

/// External archive-submission service
#[async_trait]
pub trait ArchiveSubmitter: Send + Sync {
    /// Upload the release files in `local_dir`, returning the item identifier
    async fn upload_release(
        &self,
        release: &ReleaseSubmission,
        local_dir: &Path,
    ) -> PipelineResult<String>;
}

/// Submitter used when no archive.org credentials are configured
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredSubmitter;

#[async_trait]
impl ArchiveSubmitter for UnconfiguredSubmitter {
    async fn upload_release(&self, _: &ReleaseSubmission, _: &Path) -> PipelineResult<String> {
        Err(PipelineError::Submission(
            "archive.org submission is not configured".to_string(),
        ))
    }
}

/// IA-S3 client
pub struct ArchiveOrgClient {
    http_client: reqwest::Client,
    settings: ArchiveOrgSettings,
}

impl ArchiveOrgClient {
    pub fn new(settings: ArchiveOrgSettings) -> PipelineResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1800))
            .user_agent(concat!("lobit-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Submission(e.to_string()))?;

        Ok(Self {
            http_client,
            settings,
        })
    }

    /// Item identifier: the catalog number, or a random one when configured
    pub fn identifier_for(&self, release: &ReleaseSubmission) -> PipelineResult<String> {
        if self.settings.use_uuid_identifier {
            return Ok(format!("lobit-{}", Uuid::new_v4().simple()));
        }
        release
            .catalog_number
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Submission("Release has no catalog number".to_string())
            })
    }

    /// Item metadata as `(name, value)` pairs; `collection` repeats per collection
    pub fn item_metadata(&self, release: &ReleaseSubmission) -> Vec<(String, String)> {
        let mut fields = vec![("mediatype".to_string(), "audio".to_string())];
        for collection in &self.settings.collections {
            fields.push(("collection".to_string(), collection.trim().to_string()));
        }
        fields.push(("subject".to_string(), ITEM_SUBJECT.to_string()));
        if let Some(uploader) = &self.settings.uploader {
            fields.push(("uploader".to_string(), uploader.clone()));
        }
        fields.push(("creator".to_string(), release.metadata.artist.clone()));
        fields.push(("date".to_string(), release.metadata.date.clone()));
        fields.push(("description".to_string(), html_to_text(&release.page_content)));
        fields.push(("title".to_string(), release.metadata.title.clone()));
        fields
    }

    fn metadata_headers(&self, release: &ReleaseSubmission) -> Vec<(String, String)> {
        let fields = self.item_metadata(release);
        let mut headers = Vec::with_capacity(fields.len());
        let mut collection_index = 0;
        for (name, value) in fields {
            let header = if name == "collection" {
                collection_index += 1;
                format!("x-archive-meta{:02}-collection", collection_index)
            } else {
                format!("x-archive-meta-{}", name)
            };
            headers.push((header, encode_header_value(&value)));
        }
        headers
    }

    fn file_url(&self, identifier: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.endpoint.trim_end_matches('/'),
            utf8_percent_encode(identifier, PATH_SEGMENT),
            utf8_percent_encode(file_name, PATH_SEGMENT)
        )
    }
}

#[async_trait]
impl ArchiveSubmitter for ArchiveOrgClient {
    async fn upload_release(
        &self,
        release: &ReleaseSubmission,
        local_dir: &Path,
    ) -> PipelineResult<String> {
        let identifier = self.identifier_for(release)?;
        let files = list_files(local_dir)?;
        if files.is_empty() {
            return Err(PipelineError::Submission(format!(
                "No files to submit in {}",
                local_dir.display()
            )));
        }

        info!(identifier = %identifier, files = files.len(), "Submitting release to archive.org");

        let authorization = format!(
            "LOW {}:{}",
            self.settings.access_key, self.settings.secret_key
        );

        for (index, path) in files.iter().enumerate() {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let body = tokio::fs::read(path).await?;
            let url = self.file_url(&identifier, &file_name);

            let mut request = self
                .http_client
                .put(&url)
                .header("authorization", &authorization)
                .body(body);

            if index == 0 {
                request = request.header("x-amz-auto-make-bucket", "1");
                for (name, value) in self.metadata_headers(release) {
                    request = request.header(name, value);
                }
            }

            let response = request
                .send()
                .await
                .map_err(|e| PipelineError::Submission(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::Submission(format!(
                    "archive.org upload failed (status={})",
                    status.as_u16()
                )));
            }
            debug!(identifier = %identifier, file = %file_name, "Submitted file");
        }

        Ok(identifier)
    }
}

/// Regular files directly inside `dir`, sorted by name
fn list_files(dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| PipelineError::Io(e.into()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Plain text of an HTML fragment: tags dropped, common entities decoded,
/// whitespace collapsed
pub fn html_to_text(html: &str) -> String {
    let stripped = HTML_TAG.replace_all(html, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// IA-S3 header value; non-ASCII text is sent as `uri(<percent-encoded>)`
fn encode_header_value(value: &str) -> String {
    if value.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return value.to_string();
    }
    format!("uri({})", utf8_percent_encode(value, HEADER_VALUE))
}
