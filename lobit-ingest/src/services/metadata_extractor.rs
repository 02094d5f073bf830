//! Release metadata extraction
//!
//! Reads the tags of every audio file in a staging directory and assembles
//! the release preview:
//! - artist and album (album must be identical across tracks)
//! - title and duration of each track
//! - publishable file names and the release subdirectory
//!
//! Track order is the lexicographic order of the audio file names, so
//! archives are expected to carry zero-padded numeric prefixes
//! (`01-intro.opus`, `02-...`).

use chrono::Local;
use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{Tag, TagType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use super::errors::{PipelineError, PipelineResult};
use super::sanitizer::{is_portable_file_name, sanitize, split_extension};
use crate::models::{
    format_duration, ReleaseMetadata, ReleasePreview, TrackRecord, DEFAULT_TRACK_LIST_STYLE,
    VARIOUS_ARTISTS_NAME,
};

/// Cover image every release archive must contain
pub const COVER_FILE_NAME: &str = "cover.jpg";

/// Catalog number embedded in the archive name: `Artist_-_Album_(20k123)-2024`
static CATALOG_NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((.*?)\)-\d{4}$").expect("valid catalog number pattern"));

/// Supported audio containers, each with its own tag naming convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    /// MP3 with ID3v2 frames
    Mp3,
    /// Ogg Vorbis with Vorbis comments
    Ogg,
    /// Ogg Opus with Vorbis comments
    Opus,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 3] = [AudioFormat::Mp3, AudioFormat::Ogg, AudioFormat::Opus];

    /// Select the format from a file extension (without dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "ogg" => Some(AudioFormat::Ogg),
            "opus" => Some(AudioFormat::Opus),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Opus => "opus",
        }
    }

    pub fn tag_type(self) -> TagType {
        match self {
            AudioFormat::Mp3 => TagType::Id3v2,
            AudioFormat::Ogg | AudioFormat::Opus => TagType::VorbisComments,
        }
    }

    pub fn artist_key(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "TPE1",
            AudioFormat::Ogg | AudioFormat::Opus => "ARTIST",
        }
    }

    pub fn album_key(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "TALB",
            AudioFormat::Ogg | AudioFormat::Opus => "ALBUM",
        }
    }

    pub fn title_key(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "TIT2",
            AudioFormat::Ogg | AudioFormat::Opus => "TITLE",
        }
    }
}

/// Tags read from one audio file
#[derive(Debug, Clone, PartialEq)]
pub struct TrackTags {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub duration_seconds: u32,
}

/// Reads the required tags of one audio file
pub trait TagReader: Send + Sync {
    fn read_tags(&self, path: &Path, format: AudioFormat) -> PipelineResult<TrackTags>;
}

/// Tag reader backed by lofty
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read_tags(&self, path: &Path, format: AudioFormat) -> PipelineResult<TrackTags> {
        let tag_error = |reason: String| PipelineError::TagRead {
            file: display_name(path),
            reason,
        };

        let tagged_file = Probe::open(path)
            .map_err(|e| tag_error(e.to_string()))?
            .read()
            .map_err(|e| tag_error(e.to_string()))?;

        let duration = tagged_file.properties().duration().as_secs_f64();

        let tag_type = format.tag_type();
        let tag = tagged_file
            .tag(tag_type)
            .ok_or_else(|| tag_error(format!("no {:?} tag", tag_type)))?;

        let field = |key: &str| {
            native_text(tag, tag_type, key).ok_or_else(|| tag_error(format!("missing {} tag", key)))
        };

        let tags = TrackTags {
            artist: field(format.artist_key())?,
            album: field(format.album_key())?,
            title: field(format.title_key())?,
            duration_seconds: duration.round() as u32,
        };

        tracing::debug!(
            file = %path.display(),
            artist = %tags.artist,
            title = %tags.title,
            duration_s = tags.duration_seconds,
            "Read track tags"
        );

        Ok(tags)
    }
}

/// First text value stored under the container's native key name
fn native_text(tag: &Tag, tag_type: TagType, key: &str) -> Option<String> {
    tag.items()
        .find(|item| {
            item.key()
                .map_key(tag_type, true)
                .is_some_and(|native| native.eq_ignore_ascii_case(key))
        })
        .and_then(|item| item.value().text())
        .map(|text| text.to_string())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract the catalog number from a staging directory (or archive) name
pub fn catalog_number_from_name(name: &str) -> Option<String> {
    CATALOG_NUMBER_PATTERN
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Release metadata extractor
pub struct MetadataExtractor {
    reader: Arc<dyn TagReader>,
}

impl MetadataExtractor {
    /// Create extractor reading tags with lofty
    pub fn new() -> Self {
        Self::with_reader(Arc::new(LoftyTagReader))
    }

    pub fn with_reader(reader: Arc<dyn TagReader>) -> Self {
        Self { reader }
    }

    /// Audio files directly inside `dir`, sorted by file name
    pub fn discover_audio_files(dir: &Path) -> PipelineResult<Vec<(PathBuf, AudioFormat)>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| PipelineError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(format) = AudioFormat::from_path(entry.path()) {
                files.push((entry.path().to_path_buf(), format));
            }
        }
        files.sort_by(|(a, _), (b, _)| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Build the release preview for an extracted archive
    ///
    /// `source_file_name` is the archive name the release came from.
    pub fn extract(
        &self,
        source_file_name: &str,
        staging_dir: &Path,
    ) -> PipelineResult<ReleasePreview> {
        let dir_name = staging_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let catalog_number = catalog_number_from_name(&dir_name).ok_or_else(|| {
            PipelineError::Validation(format!(
                "No catalog number in file name '{}' (expected '...(catno)-YYYY')",
                source_file_name
            ))
        })?;

        let audio_files = Self::discover_audio_files(staging_dir)?;

        if !staging_dir.join(COVER_FILE_NAME).is_file() {
            return Err(PipelineError::Validation(format!("Missing {}", COVER_FILE_NAME)));
        }

        if audio_files.is_empty() {
            return Err(PipelineError::Validation("No audio files found".to_string()));
        }

        let mut tracks = Vec::with_capacity(audio_files.len());
        let mut albums = BTreeSet::new();
        let mut album_keys = BTreeSet::new();
        let mut used_names = HashSet::new();

        for (index, (path, format)) in audio_files.iter().enumerate() {
            let number = (index + 1) as u32;
            let tags = self.reader.read_tags(path, *format)?;

            let file_name = publish_file_name(path, *format, number, &used_names);
            used_names.insert(file_name.clone());

            albums.insert(tags.album.clone());
            album_keys.insert(format.album_key());
            tracks.push((tags, file_name, number));
        }

        if albums.len() != 1 {
            let keys: Vec<_> = album_keys.into_iter().collect();
            return Err(PipelineError::Validation(format!(
                "More than one album given in {} tag",
                keys.join("/")
            )));
        }
        let album = albums.into_iter().next().unwrap_or_default();

        let artists: BTreeSet<&str> = tracks.iter().map(|(t, _, _)| t.artist.as_str()).collect();
        let single_artist = if artists.len() == 1 {
            artists.into_iter().next().map(str::to_string)
        } else {
            None
        };

        let track_records = tracks
            .iter()
            .map(|(tags, file_name, number)| TrackRecord {
                file_name: file_name.clone(),
                track_number: *number,
                title: if single_artist.is_some() {
                    tags.title.clone()
                } else {
                    format!("{} - {}", tags.artist, tags.title)
                },
                duration_seconds: tags.duration_seconds,
                duration_hms: format_duration(tags.duration_seconds),
            })
            .collect();

        let artist = single_artist.unwrap_or_else(|| VARIOUS_ARTISTS_NAME.to_string());
        let release_subdir = format!(
            "{}/{}",
            sanitize(&artist.to_lowercase()),
            sanitize(&album.to_lowercase())
        );

        let release_metadata = ReleaseMetadata {
            description: format!("{} - {} ({})", artist, album, catalog_number),
            title: album,
            artist,
            catalog_number: catalog_number.clone(),
            track_list_style: DEFAULT_TRACK_LIST_STYLE.to_string(),
            date: Local::now().format("%Y-%m-%d").to_string(),
            archive: None,
            extra: serde_json::Map::new(),
        };

        tracing::info!(
            file = %source_file_name,
            tracks = audio_files.len(),
            release_dir = %release_subdir,
            "Extracted release metadata"
        );

        Ok(ReleasePreview {
            staging_dir: staging_dir.to_path_buf(),
            catalog_number,
            source_file_name: source_file_name.to_string(),
            track_files: audio_files.into_iter().map(|(path, _)| path).collect(),
            release_subdir,
            release_metadata,
            track_records,
        })
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Sanitized output name; garbled or colliding names fall back to the
/// zero-padded track number plus extension
fn publish_file_name(
    path: &Path,
    format: AudioFormat,
    number: u32,
    used: &HashSet<String>,
) -> String {
    let original = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let sanitized = sanitize(&original);

    if is_portable_file_name(&sanitized) && !used.contains(&sanitized) {
        return sanitized;
    }

    let (_, ext) = split_extension(&sanitized);
    let ext = if ext.len() > 1 {
        ext.to_string()
    } else {
        format!(".{}", format.extension())
    };
    format!("{:02}{}", number, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofty::tag::{ItemKey, TagExt};

    #[test]
    fn test_format_selects_tag_names() {
        assert_eq!(AudioFormat::from_extension("mp3"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_extension("OPUS"), Some(AudioFormat::Opus));
        assert_eq!(AudioFormat::from_extension("flac"), None);

        assert_eq!(AudioFormat::Mp3.artist_key(), "TPE1");
        assert_eq!(AudioFormat::Mp3.album_key(), "TALB");
        assert_eq!(AudioFormat::Mp3.title_key(), "TIT2");
        for format in [AudioFormat::Ogg, AudioFormat::Opus] {
            assert_eq!(format.artist_key(), "ARTIST");
            assert_eq!(format.album_key(), "ALBUM");
            assert_eq!(format.title_key(), "TITLE");
            assert_eq!(format.tag_type(), TagType::VorbisComments);
        }
    }

    #[test]
    fn test_catalog_number_pattern() {
        assert_eq!(
            catalog_number_from_name("Artist_-_Album_(20k123)-2024").as_deref(),
            Some("20k123")
        );
        assert_eq!(catalog_number_from_name("Artist_-_Album_(20k123)"), None);
        assert_eq!(catalog_number_from_name("no-catalog-2024"), None);
    }

    #[test]
    fn test_publish_file_name_falls_back_to_number() {
        let used = HashSet::new();
        assert_eq!(
            publish_file_name(Path::new("/x/01 Intro.mp3"), AudioFormat::Mp3, 1, &used),
            "01_Intro.mp3"
        );
        assert_eq!(
            publish_file_name(Path::new("/x/日本語.opus"), AudioFormat::Opus, 7, &used),
            "07.opus"
        );
        assert_eq!(
            publish_file_name(Path::new("/x/CON.ogg"), AudioFormat::Ogg, 12, &used),
            "12.ogg"
        );
    }

    #[test]
    fn test_publish_file_name_avoids_collisions() {
        let mut used = HashSet::new();
        used.insert("a.mp3".to_string());
        assert_eq!(
            publish_file_name(Path::new("/x/á.mp3"), AudioFormat::Mp3, 2, &used),
            "02.mp3"
        );
    }

    #[test]
    fn test_lofty_reader_rejects_garbage_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("01-broken.mp3");
        std::fs::write(&path, b"this is not an mp3 file").unwrap();

        let result = LoftyTagReader.read_tags(&path, AudioFormat::Mp3);
        assert!(matches!(result, Err(PipelineError::TagRead { .. })));
    }

    /// Silent MPEG-1 Layer III stream: 128 kbps, 44.1 kHz, about ten seconds
    fn silent_mp3() -> Vec<u8> {
        const FRAME_LEN: usize = 417;
        let mut frame = vec![0u8; FRAME_LEN];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        frame.repeat(383)
    }

    #[test]
    fn test_lofty_reader_reads_id3v2_frames_and_duration() {
        use lofty::config::WriteOptions;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("01-dawn.mp3");
        std::fs::write(&path, silent_mp3()).unwrap();

        let mut tag = Tag::new(TagType::Id3v2);
        tag.insert_text(ItemKey::TrackArtist, "Some Artist".to_string());
        tag.insert_text(ItemKey::AlbumTitle, "First Light".to_string());
        tag.insert_text(ItemKey::TrackTitle, "Dawn".to_string());
        tag.save_to_path(&path, WriteOptions::default()).unwrap();

        let tags = LoftyTagReader.read_tags(&path, AudioFormat::Mp3).unwrap();
        assert_eq!(
            tags,
            TrackTags {
                artist: "Some Artist".to_string(),
                album: "First Light".to_string(),
                title: "Dawn".to_string(),
                duration_seconds: 10,
            }
        );
    }

    #[test]
    fn test_lofty_reader_reports_missing_title() {
        use lofty::config::WriteOptions;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("02-dusk.mp3");
        std::fs::write(&path, silent_mp3()).unwrap();

        let mut tag = Tag::new(TagType::Id3v2);
        tag.insert_text(ItemKey::TrackArtist, "Some Artist".to_string());
        tag.insert_text(ItemKey::AlbumTitle, "First Light".to_string());
        tag.save_to_path(&path, WriteOptions::default()).unwrap();

        match LoftyTagReader.read_tags(&path, AudioFormat::Mp3) {
            Err(PipelineError::TagRead { file, reason }) => {
                assert_eq!(file, "02-dusk.mp3");
                assert_eq!(reason, "missing TIT2 tag");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_native_text_uses_vorbis_comment_names() {
        let mut tag = Tag::new(TagType::VorbisComments);
        tag.insert_text(ItemKey::TrackArtist, "Some Artist".to_string());
        tag.insert_text(ItemKey::AlbumTitle, "First Light".to_string());
        tag.insert_text(ItemKey::TrackTitle, "Dusk".to_string());

        let format = AudioFormat::Opus;
        let read = |key| native_text(&tag, format.tag_type(), key);
        assert_eq!(read(format.artist_key()).as_deref(), Some("Some Artist"));
        assert_eq!(read(format.album_key()).as_deref(), Some("First Light"));
        assert_eq!(read(format.title_key()).as_deref(), Some("Dusk"));
        assert_eq!(read("TPE1"), None);
    }
}
