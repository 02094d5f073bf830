//! Task queue request and task state types
//!
//! A task is identified by its `(kind, file)` key. Its outcome starts as
//! `Pending` and moves exactly once to `Success` or `Failure`; a terminal
//! state is only ever removed, never transitioned again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use super::release_preview::{ReleaseMetadata, ReleasePreview};

/// Pipeline stage a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Preview,
    Upload,
    ArchiveSubmission,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Preview => "preview",
            TaskKind::Upload => "upload",
            TaskKind::ArchiveSubmission => "archive",
        };
        f.write_str(name)
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preview" => Ok(TaskKind::Preview),
            "upload" => Ok(TaskKind::Upload),
            "archive" | "archive_submission" => Ok(TaskKind::ArchiveSubmission),
            other => Err(format!("Unknown task kind: {}", other)),
        }
    }
}

/// Key of the task table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub kind: TaskKind,
    pub file: String,
}

impl TaskKey {
    pub fn new(kind: TaskKind, file: impl Into<String>) -> Self {
        Self {
            kind,
            file: file.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.file)
    }
}

/// Work item consumed exactly once by the worker
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    /// Identity of the TaskState this request reports into
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub file: String,
    /// Upload payload (copied from the Preview result)
    pub payload: Option<ReleasePreview>,
}

/// One transfer already completed by the Upload stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedUpload {
    #[serde(rename = "from")]
    pub source_path: String,
    #[serde(rename = "to")]
    pub destination_path: String,
}

/// Upload stage data: the preview payload plus transfer progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadData {
    #[serde(flatten)]
    pub preview: ReleasePreview,
    pub completed_uploads: Vec<CompletedUpload>,
    /// Set once the release has been committed to the database
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_id: Option<i64>,
}

/// Where a Preview stages its archive, recorded before any work starts so a
/// failed preview still points at the directory left behind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagingData {
    pub file: String,
    pub local_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_no: Option<String>,
}

/// Archive-submission stage data
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubmissionData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_id: Option<i64>,
}

/// Data accumulated by a task as its stage advances
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskData {
    /// Nothing recorded yet; serializes as `{}`
    Empty {},
    Staging(StagingData),
    Preview(Box<ReleasePreview>),
    Upload(Box<UploadData>),
    ArchiveSubmission(SubmissionData),
}

impl Default for TaskData {
    fn default() -> Self {
        TaskData::Empty {}
    }
}

impl TaskData {
    pub fn as_preview(&self) -> Option<&ReleasePreview> {
        match self {
            TaskData::Preview(preview) => Some(preview.as_ref()),
            _ => None,
        }
    }

    pub fn as_staging(&self) -> Option<&StagingData> {
        match self {
            TaskData::Staging(staging) => Some(staging),
            _ => None,
        }
    }

    pub fn as_upload(&self) -> Option<&UploadData> {
        match self {
            TaskData::Upload(upload) => Some(upload.as_ref()),
            _ => None,
        }
    }

    pub fn as_submission(&self) -> Option<&SubmissionData> {
        match self {
            TaskData::ArchiveSubmission(submission) => Some(submission),
            _ => None,
        }
    }
}

/// Tri-state task outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Pending,
    Success,
    Failure,
}

/// Caller-visible state of one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskState {
    pub task_id: Uuid,
    pub outcome: TaskOutcome,
    pub data: TaskData,
    /// Captured failure text
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskState {
    /// New pending task with empty data
    pub fn pending() -> Self {
        Self {
            task_id: Uuid::new_v4(),
            outcome: TaskOutcome::Pending,
            data: TaskData::default(),
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome == TaskOutcome::Pending
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// Mark success. Has no effect on a terminal task.
    pub fn succeed(&mut self) {
        if self.is_pending() {
            self.outcome = TaskOutcome::Success;
            self.finished_at = Some(Utc::now());
        }
    }

    /// Mark failure with the captured error. Has no effect on a terminal task.
    pub fn fail(&mut self, error: impl fmt::Display) {
        if self.is_pending() {
            self.outcome = TaskOutcome::Failure;
            self.error = Some(error.to_string());
            self.finished_at = Some(Utc::now());
        }
    }

    /// Wire representation `{success, data, exception}`
    pub fn to_response(&self) -> TaskStateResponse {
        TaskStateResponse {
            success: match self.outcome {
                TaskOutcome::Pending => None,
                TaskOutcome::Success => Some(true),
                TaskOutcome::Failure => Some(false),
            },
            data: self.data.clone(),
            exception: self.error.clone(),
        }
    }
}

/// Serialized TaskState returned to HTTP callers
#[derive(Debug, Clone, Serialize)]
pub struct TaskStateResponse {
    pub success: Option<bool>,
    pub data: TaskData,
    pub exception: Option<String>,
}

/// Optional caller edits applied when requesting the Upload stage
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadEdits {
    #[serde(default)]
    pub release_metadata: Option<ReleaseMetadata>,
}
