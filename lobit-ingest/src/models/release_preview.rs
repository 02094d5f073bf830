//! Release preview data produced by the Preview stage
//!
//! Field names on the wire follow the site's legacy `release_data` layout
//! (`relname`, `cat-no`, `player_files`, ...), so stored releases and the
//! admin pages keep reading the same documents.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Artist name used when tracks disagree on the artist tag
pub const VARIOUS_ARTISTS_NAME: &str = "VA";

/// Default track list rendering (ordered list)
pub const DEFAULT_TRACK_LIST_STYLE: &str = "ol";

/// Release-level metadata stored as the release's JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    #[serde(rename = "relname")]
    pub title: String,
    pub artist: String,
    #[serde(rename = "cat-no")]
    pub catalog_number: String,
    pub description: String,
    #[serde(rename = "list", default = "default_track_list_style")]
    pub track_list_style: String,
    /// Release date, `YYYY-MM-DD`
    pub date: String,
    /// archive.org details URL, set after a successful submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    /// Keys this service does not interpret (legacy documents carry many)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_track_list_style() -> String {
    DEFAULT_TRACK_LIST_STYLE.to_string()
}

/// One track as it will be published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Sanitized file name in the public release directory
    #[serde(rename = "file")]
    pub file_name: String,
    #[serde(rename = "number")]
    pub track_number: u32,
    pub title: String,
    #[serde(rename = "duration_secs")]
    pub duration_seconds: u32,
    pub duration_hms: String,
}

/// Output of the Preview stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleasePreview {
    #[serde(rename = "local_dir")]
    pub staging_dir: PathBuf,
    #[serde(rename = "catalog_no")]
    pub catalog_number: String,
    /// Archive file name the release was built from (the task key)
    #[serde(rename = "file")]
    pub source_file_name: String,
    /// Extracted audio files, in track order
    #[serde(rename = "local_files")]
    pub track_files: Vec<PathBuf>,
    /// `artist/album` segment under the public releases prefix
    #[serde(rename = "release_dir")]
    pub release_subdir: String,
    #[serde(rename = "release_data")]
    pub release_metadata: ReleaseMetadata,
    #[serde(rename = "player_files")]
    pub track_records: Vec<TrackRecord>,
}

/// Render a duration as `m:ss`, or `h:mm:ss` from one hour up
pub fn format_duration(total_seconds: u32) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
