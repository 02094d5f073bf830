//! Release pipeline components
//!
//! - `sanitizer`: portable path segments
//! - `metadata_extractor`: tags of an extracted release → preview
//! - `archive_stager`: download + unzip into the scratch area
//! - `object_storage`: public store the release files are published to
//! - `archive_org_client`: archive.org mirror of committed releases
//! - `release_service`: queue, worker and orchestrator operations

pub mod archive_org_client;
pub mod archive_stager;
pub mod errors;
pub mod metadata_extractor;
pub mod object_storage;
pub mod release_service;
pub mod sanitizer;

pub use archive_org_client::{
    html_to_text, ArchiveOrgClient, ArchiveSubmitter, ReleaseSubmission, UnconfiguredSubmitter,
};
pub use archive_stager::{staging_dir_name, ArchiveSource, ArchiveStager, HttpArchiveSource};
pub use errors::{PipelineError, PipelineResult};
pub use metadata_extractor::{
    catalog_number_from_name, AudioFormat, LoftyTagReader, MetadataExtractor, TagReader,
    TrackTags, COVER_FILE_NAME,
};
pub use object_storage::{LocalDirStorage, ObjectStorage};
pub use release_service::{PipelineComponents, ReleaseService, ARCHIVE_ORG_DETAILS_URL};
pub use sanitizer::{is_portable_file_name, sanitize, SANITIZE_MAXLEN};
