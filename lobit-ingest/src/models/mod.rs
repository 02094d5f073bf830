//! Data models for the release ingestion pipeline

pub mod release_preview;
pub mod task_state;

pub use release_preview::{
    format_duration, ReleaseMetadata, ReleasePreview, TrackRecord, DEFAULT_TRACK_LIST_STYLE,
    VARIOUS_ARTISTS_NAME,
};
pub use task_state::{
    CompletedUpload, QueuedRequest, StagingData, SubmissionData, TaskData, TaskKey, TaskKind,
    TaskOutcome, TaskState, TaskStateResponse, UploadData, UploadEdits,
};
