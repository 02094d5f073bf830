//! Release pipeline orchestrator
//!
//! Runs the Preview → Upload → Commit flow and archive.org submission for
//! release archives. Requests are queued on an unbounded channel and handled
//! one at a time, in FIFO order, by a single worker task; callers poll the
//! shared task table for results.
//!
//! **Task table discipline:**
//! - A caller inserts the `Pending` state when it enqueues a request; a
//!   second request for a key whose task is still pending is rejected.
//! - While pending, only the worker writes the entry, and only if the
//!   entry still carries the `task_id` of the request being processed. A
//!   discarded or superseded task is therefore never written to.
//! - Terminal entries are removed by callers (discard, commit) or replaced
//!   by a new request for the same key.

use lobit_common::db::Release;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::archive_org_client::{
    ArchiveOrgClient, ArchiveSubmitter, ReleaseSubmission, UnconfiguredSubmitter,
};
use super::archive_stager::{staging_dir_name, ArchiveSource, ArchiveStager, HttpArchiveSource};
use super::errors::{PipelineError, PipelineResult};
use super::metadata_extractor::{
    catalog_number_from_name, LoftyTagReader, MetadataExtractor, TagReader, COVER_FILE_NAME,
};
use super::object_storage::{LocalDirStorage, ObjectStorage};
use crate::config::IngestConfig;
use crate::db;
use crate::models::{
    CompletedUpload, QueuedRequest, ReleaseMetadata, ReleasePreview, StagingData, SubmissionData,
    TaskData, TaskKey, TaskKind, TaskState, UploadData,
};

/// Base URL of archive.org item pages
pub const ARCHIVE_ORG_DETAILS_URL: &str = "https://archive.org/details";

type TaskTable = Arc<RwLock<HashMap<TaskKey, TaskState>>>;

/// Collaborators the pipeline worker runs with
pub struct PipelineComponents {
    pub archive_source: Arc<dyn ArchiveSource>,
    pub tag_reader: Arc<dyn TagReader>,
    pub storage: Arc<dyn ObjectStorage>,
    pub submitter: Arc<dyn ArchiveSubmitter>,
    /// Scratch area holding downloaded and extracted archives
    pub tmp_directory: PathBuf,
    /// Object store prefix releases are published under
    pub releases_prefix: String,
}

impl PipelineComponents {
    /// Production collaborators: HTTP archive source, lofty tags, local
    /// object store and (when configured) the archive.org client
    pub fn from_config(config: &IngestConfig) -> PipelineResult<Self> {
        let static_base = config.static_base.clone().unwrap_or_default();

        let submitter: Arc<dyn ArchiveSubmitter> = match &config.archive_org {
            Some(settings) => Arc::new(ArchiveOrgClient::new(settings.clone())?),
            None => Arc::new(UnconfiguredSubmitter),
        };

        Ok(Self {
            archive_source: Arc::new(HttpArchiveSource::new(static_base)?),
            tag_reader: Arc::new(LoftyTagReader),
            storage: Arc::new(LocalDirStorage::new(config.public_root.clone())),
            submitter,
            tmp_directory: config.tmp_directory.clone(),
            releases_prefix: config.releases_prefix.clone(),
        })
    }
}

/// Caller-facing pipeline service
///
/// Owns the request queue and the task table. The worker task stops once
/// the service (and with it the queue sender) is dropped.
pub struct ReleaseService {
    db: SqlitePool,
    tasks: TaskTable,
    queue: mpsc::UnboundedSender<QueuedRequest>,
    /// Serializes commits so an Upload result is committed at most once
    commit_lock: Mutex<()>,
}

impl ReleaseService {
    /// Create the service and spawn its worker on the current runtime
    pub fn start(db: SqlitePool, components: PipelineComponents) -> Self {
        let tasks: TaskTable = Arc::new(RwLock::new(HashMap::new()));
        let (queue, receiver) = mpsc::unbounded_channel();

        let worker = PipelineWorker {
            db: db.clone(),
            tasks: Arc::clone(&tasks),
            stager: ArchiveStager::new(components.archive_source, components.tmp_directory),
            extractor: Arc::new(MetadataExtractor::with_reader(components.tag_reader)),
            storage: components.storage,
            submitter: components.submitter,
            releases_prefix: components.releases_prefix,
        };
        tokio::spawn(worker.run(receiver));

        Self {
            db,
            tasks,
            queue,
            commit_lock: Mutex::new(()),
        }
    }

    /// Queue the Preview stage for archive `file`
    pub async fn request_preview(&self, file: &str) -> PipelineResult<()> {
        validate_file_key(file)?;
        let mut tasks = self.tasks.write().await;
        let key = TaskKey::new(TaskKind::Preview, file);
        ensure_not_pending(&tasks, &key)?;
        self.enqueue(&mut tasks, key, TaskState::pending(), None)
    }

    /// Queue the Upload stage, seeded with the completed Preview result
    ///
    /// `edits` replaces the previewed release metadata (the reviewer may
    /// correct title, description, date, ...).
    pub async fn request_upload(
        &self,
        file: &str,
        edits: Option<ReleaseMetadata>,
    ) -> PipelineResult<()> {
        validate_file_key(file)?;
        let mut tasks = self.tasks.write().await;

        let preview_key = TaskKey::new(TaskKind::Preview, file);
        let preview_state = tasks.get(&preview_key).ok_or_else(|| {
            PipelineError::NotFound(format!("No preview task for '{}'", file))
        })?;
        let mut preview = completed_preview(file, preview_state)?.clone();
        if let Some(metadata) = edits {
            preview.release_metadata = metadata;
        }

        let key = TaskKey::new(TaskKind::Upload, file);
        ensure_not_pending(&tasks, &key)?;

        let mut state = TaskState::pending();
        state.data = TaskData::Upload(Box::new(UploadData {
            preview: preview.clone(),
            completed_uploads: Vec::new(),
            release_id: None,
        }));
        self.enqueue(&mut tasks, key, state, Some(preview))
    }

    /// Queue submission of the committed release built from `file`
    pub async fn request_archive_submission(&self, file: &str) -> PipelineResult<()> {
        validate_file_key(file)?;
        let mut tasks = self.tasks.write().await;
        let key = TaskKey::new(TaskKind::ArchiveSubmission, file);
        ensure_not_pending(&tasks, &key)?;
        self.enqueue(&mut tasks, key, TaskState::pending(), None)
    }

    fn enqueue(
        &self,
        tasks: &mut HashMap<TaskKey, TaskState>,
        key: TaskKey,
        state: TaskState,
        payload: Option<ReleasePreview>,
    ) -> PipelineResult<()> {
        let request = QueuedRequest {
            task_id: state.task_id,
            kind: key.kind,
            file: key.file.clone(),
            payload,
        };
        self.queue
            .send(request)
            .map_err(|_| PipelineError::Io(std::io::Error::other("pipeline worker has stopped")))?;

        info!(task = %key, task_id = %state.task_id, "Queued pipeline request");
        tasks.insert(key, state);
        Ok(())
    }

    /// Snapshot of the task for `(kind, file)`
    pub async fn poll(&self, kind: TaskKind, file: &str) -> PipelineResult<TaskState> {
        let key = TaskKey::new(kind, file);
        self.tasks
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("No {} task", key)))
    }

    pub async fn poll_preview(&self, file: &str) -> PipelineResult<TaskState> {
        self.poll(TaskKind::Preview, file).await
    }

    pub async fn poll_upload(&self, file: &str) -> PipelineResult<TaskState> {
        self.poll(TaskKind::Upload, file).await
    }

    pub async fn poll_archive_submission(&self, file: &str) -> PipelineResult<TaskState> {
        self.poll(TaskKind::ArchiveSubmission, file).await
    }

    /// Remove a task regardless of its outcome
    ///
    /// A pending task keeps running in the worker; its result is dropped.
    pub async fn discard_task(&self, kind: TaskKind, file: &str) -> PipelineResult<()> {
        let key = TaskKey::new(kind, file);
        match self.tasks.write().await.remove(&key) {
            Some(state) => {
                info!(task = %key, task_id = %state.task_id, pending = state.is_pending(), "Discarded task");
                Ok(())
            }
            None => Err(PipelineError::NotFound(format!("No {} task", key))),
        }
    }

    /// Number of tasks still pending
    pub async fn pending_count(&self) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|state| state.is_pending())
            .count()
    }

    /// Write the uploaded release to the database
    ///
    /// Requires a successful Upload task for `file`. On success the Upload
    /// task is removed and its final snapshot, carrying the new
    /// `release_id`, is returned.
    pub async fn commit_release(
        &self,
        file: &str,
        page_content: &str,
        index_record_body: &str,
    ) -> PipelineResult<TaskState> {
        let _commit_guard = self.commit_lock.lock().await;
        let key = TaskKey::new(TaskKind::Upload, file);

        let mut snapshot = self
            .tasks
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("No upload task for '{}'", file)))?;

        if snapshot.is_pending() {
            return Err(PipelineError::NotReady(format!(
                "Upload of '{}' has not finished",
                file
            )));
        }
        let upload = match (&snapshot.error, snapshot.data.as_upload()) {
            (None, Some(upload)) => upload.clone(),
            (Some(err), _) => {
                return Err(PipelineError::NotReady(format!(
                    "Upload of '{}' failed: {}",
                    file, err
                )))
            }
            (None, None) => {
                return Err(PipelineError::NotReady(format!(
                    "Upload of '{}' has no release data",
                    file
                )))
            }
        };

        let preview = &upload.preview;
        let release_data = serde_json::to_string(&preview.release_metadata)
            .map_err(|e| lobit_common::Error::Internal(format!("Serialize release data: {}", e)))?;
        let index_date = db::format_index_date(&preview.release_metadata.date)?;

        let inserted = db::insert_release_bundle(
            &self.db,
            &db::NewRelease {
                catalog_no: &preview.catalog_number,
                release_dir: &preview.release_subdir,
                file: &preview.source_file_name,
                release_data: &release_data,
                page_content,
                tracks: &preview.track_records,
                index_date: &index_date,
                index_body: index_record_body,
            },
        )
        .await?;

        {
            let mut tasks = self.tasks.write().await;
            if tasks.get(&key).is_some_and(|s| s.task_id == snapshot.task_id) {
                tasks.remove(&key);
            }
        }

        if let TaskData::Upload(upload) = &mut snapshot.data {
            upload.release_id = Some(inserted.release_id);
        }

        info!(file = %file, release_id = inserted.release_id, "Committed release");
        Ok(snapshot)
    }

    /// Delete a committed release and its dependent rows
    pub async fn delete_release(&self, release_id: i64) -> PipelineResult<()> {
        db::delete_release_bundle(&self.db, release_id)
            .await
            .map_err(|err| match err {
                lobit_common::Error::NotFound(msg) => PipelineError::NotFound(msg),
                other => PipelineError::Database(other),
            })
    }
}

fn validate_file_key(file: &str) -> PipelineResult<()> {
    if file.trim().is_empty() {
        return Err(PipelineError::Validation("File name must not be empty".to_string()));
    }
    Ok(())
}

fn ensure_not_pending(tasks: &HashMap<TaskKey, TaskState>, key: &TaskKey) -> PipelineResult<()> {
    match tasks.get(key) {
        Some(state) if state.is_pending() => Err(PipelineError::Conflict(format!(
            "A {} task is still pending",
            key
        ))),
        _ => Ok(()),
    }
}

fn completed_preview<'a>(file: &str, state: &'a TaskState) -> PipelineResult<&'a ReleasePreview> {
    if state.is_pending() {
        return Err(PipelineError::NotReady(format!(
            "Preview of '{}' has not finished",
            file
        )));
    }
    if let Some(err) = &state.error {
        return Err(PipelineError::NotReady(format!(
            "Preview of '{}' failed: {}",
            file, err
        )));
    }
    state.data.as_preview().ok_or_else(|| {
        PipelineError::NotReady(format!("Preview of '{}' has no release data", file))
    })
}

/// Single consumer of the request queue
struct PipelineWorker {
    db: SqlitePool,
    tasks: TaskTable,
    stager: ArchiveStager,
    extractor: Arc<MetadataExtractor>,
    storage: Arc<dyn ObjectStorage>,
    submitter: Arc<dyn ArchiveSubmitter>,
    releases_prefix: String,
}

impl PipelineWorker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<QueuedRequest>) {
        info!("Release pipeline worker started");
        while let Some(request) = receiver.recv().await {
            self.process(request).await;
        }
        info!("Release pipeline worker stopped");
    }

    /// Run one request to completion; stage errors end up in the task state
    async fn process(&self, request: QueuedRequest) {
        let key = TaskKey::new(request.kind, request.file.clone());
        debug!(task = %key, task_id = %request.task_id, "Dequeued pipeline request");

        let result = match request.kind {
            TaskKind::Preview => self.run_preview(&request).await,
            TaskKind::Upload => self.run_upload(&request).await,
            TaskKind::ArchiveSubmission => self.run_archive_submission(&request).await,
        };

        match result {
            Ok(data) => {
                info!(task = %key, "Pipeline stage succeeded");
                self.update_task(&key, request.task_id, |state| {
                    if let Some(data) = data {
                        state.data = data;
                    }
                    state.succeed();
                })
                .await;
            }
            Err(err) => {
                warn!(task = %key, error = %err, "Pipeline stage failed");
                self.update_task(&key, request.task_id, |state| state.fail(&err))
                    .await;
            }
        }
    }

    /// Apply `update` to the task if it still belongs to `task_id`
    async fn update_task<F>(&self, key: &TaskKey, task_id: Uuid, update: F)
    where
        F: FnOnce(&mut TaskState),
    {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(key) {
            Some(state) if state.task_id == task_id => update(state),
            _ => debug!(task = %key, task_id = %task_id, "Task was discarded, dropping update"),
        }
    }

    async fn run_preview(&self, request: &QueuedRequest) -> PipelineResult<Option<TaskData>> {
        let key = TaskKey::new(TaskKind::Preview, request.file.clone());
        let staging = StagingData {
            file: request.file.clone(),
            local_dir: self.stager.staging_dir(&request.file),
            catalog_no: catalog_number_from_name(staging_dir_name(&request.file)),
        };
        self.update_task(&key, request.task_id, |state| {
            state.data = TaskData::Staging(staging)
        })
        .await;

        let staging_dir = self.stager.stage(&request.file, false).await?;

        let extractor = Arc::clone(&self.extractor);
        let file = request.file.clone();
        let preview = tokio::task::spawn_blocking(move || extractor.extract(&file, &staging_dir))
            .await
            .map_err(|e| PipelineError::Extract(format!("Metadata extraction task failed: {}", e)))??;

        Ok(Some(TaskData::Preview(Box::new(preview))))
    }

    async fn run_upload(&self, request: &QueuedRequest) -> PipelineResult<Option<TaskData>> {
        let key = TaskKey::new(TaskKind::Upload, request.file.clone());
        let preview = request.payload.as_ref().ok_or_else(|| {
            PipelineError::Upload("Upload request carries no preview data".to_string())
        })?;

        let remote_dir = format!("{}/{}", self.releases_prefix, preview.release_subdir);

        let mut transfers: Vec<(PathBuf, String)> = preview
            .track_files
            .iter()
            .zip(&preview.track_records)
            .map(|(local, record)| (local.clone(), format!("{}/{}", remote_dir, record.file_name)))
            .collect();
        transfers.push((
            preview.staging_dir.join(COVER_FILE_NAME),
            format!("{}/{}", remote_dir, COVER_FILE_NAME),
        ));

        for (local, remote) in transfers {
            if self.storage.exists(&remote).await? {
                info!(remote = %remote, "Overwriting existing object");
            }
            info!(local = %local.display(), remote = %remote, "Uploading release file");
            self.storage.upload(&local, &remote).await?;

            let completed = CompletedUpload {
                source_path: local.display().to_string(),
                destination_path: remote,
            };
            self.update_task(&key, request.task_id, |state| {
                if let TaskData::Upload(upload) = &mut state.data {
                    upload.completed_uploads.push(completed);
                }
            })
            .await;
        }

        // Data was accumulated in place
        Ok(None)
    }

    async fn run_archive_submission(
        &self,
        request: &QueuedRequest,
    ) -> PipelineResult<Option<TaskData>> {
        let staging_dir = self.stager.stage(&request.file, true).await?;

        let release = db::find_release_by_file(&self.db, &request.file)
            .await?
            .ok_or_else(|| {
                PipelineError::NotFound(format!("No release for '{}'", request.file))
            })?;
        let mut metadata = release_metadata(&release)?;
        let page_content = db::load_release_page(&self.db, release.id)
            .await?
            .and_then(|page| page.content)
            .unwrap_or_default();

        let submission = ReleaseSubmission {
            catalog_number: release.catalog_no.clone(),
            metadata: metadata.clone(),
            page_content,
        };
        let identifier = self
            .submitter
            .upload_release(&submission, &staging_dir)
            .await?;

        metadata.archive = Some(format!("{}/{}", ARCHIVE_ORG_DETAILS_URL, identifier));
        let release_data = serde_json::to_string(&metadata)
            .map_err(|e| PipelineError::Submission(format!("Serialize release data: {}", e)))?;
        db::update_release_data(&self.db, release.id, &release_data).await?;

        info!(file = %request.file, identifier = %identifier, release_id = release.id, "Release submitted to archive.org");

        Ok(Some(TaskData::ArchiveSubmission(SubmissionData {
            identifier: Some(identifier),
            release_id: Some(release.id),
        })))
    }
}

fn release_metadata(release: &Release) -> PipelineResult<ReleaseMetadata> {
    let raw = release.release_data.as_deref().ok_or_else(|| {
        PipelineError::Submission(format!("Release {} has no release data", release.id))
    })?;
    serde_json::from_str(raw).map_err(|e| {
        PipelineError::Submission(format!("Release {} has invalid release data: {}", release.id, e))
    })
}
