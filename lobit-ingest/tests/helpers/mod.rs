//! Shared test fixtures: in-process collaborators, archive builders and a
//! pipeline harness backed by a temporary SQLite database

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use lobit_ingest::models::{TaskKind, TaskState};
use lobit_ingest::services::{
    ArchiveSource, ArchiveSubmitter, AudioFormat, ObjectStorage, PipelineComponents,
    PipelineError, PipelineResult, ReleaseService, ReleaseSubmission, TagReader, TrackTags,
};

pub const ARCHIVE_FILE: &str = "Some_Artist_-_First_Light_(lbt042)-2024.zip";

/// Build a zip archive in memory
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Release archive with a cover and the given audio file names
pub fn release_zip(audio_files: &[&str], with_cover: bool) -> Vec<u8> {
    let mut entries: Vec<(&str, &[u8])> = audio_files
        .iter()
        .map(|name| (*name, b"audio-bytes".as_slice()))
        .collect();
    if with_cover {
        entries.push(("cover.jpg", b"jpeg-bytes".as_slice()));
    }
    build_zip(&entries)
}

pub fn tags(artist: &str, album: &str, title: &str, duration_seconds: u32) -> TrackTags {
    TrackTags {
        artist: artist.to_string(),
        album: album.to_string(),
        title: title.to_string(),
        duration_seconds,
    }
}

/// Archive source serving canned bytes, counting fetches
///
/// With a gate, every fetch waits for one permit first.
#[derive(Default)]
pub struct FakeArchiveSource {
    archives: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl FakeArchiveSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn insert(&self, file: &str, bytes: Vec<u8>) {
        self.archives.lock().unwrap().insert(file.to_string(), bytes);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveSource for FakeArchiveSource {
    async fn fetch(&self, file: &str) -> PipelineResult<Vec<u8>> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.archives
            .lock()
            .unwrap()
            .get(file)
            .cloned()
            .ok_or_else(|| PipelineError::Download(format!("404 Not Found: {}", file)))
    }
}

/// Tag reader answering from a file-name → tags table
#[derive(Default)]
pub struct FakeTagReader {
    tags: Mutex<HashMap<String, TrackTags>>,
}

impl FakeTagReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file_name: &str, tags: TrackTags) {
        self.tags.lock().unwrap().insert(file_name.to_string(), tags);
    }
}

impl TagReader for FakeTagReader {
    fn read_tags(&self, path: &Path, _format: AudioFormat) -> PipelineResult<TrackTags> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        self.tags
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or_else(|| PipelineError::TagRead {
                file: name,
                reason: "missing TITLE tag".to_string(),
            })
    }
}

/// In-memory object store
///
/// `fail_on` makes uploads whose key ends with the given suffix fail; a
/// gate makes every upload wait for one permit.
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_on: Mutex<Option<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn fail_on(&self, suffix: &str) {
        *self.fail_on.lock().unwrap() = Some(suffix.to_string());
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(&self, local: &Path, remote: &str) -> PipelineResult<()> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(suffix) = self.fail_on.lock().unwrap().as_deref() {
            if remote.ends_with(suffix) {
                return Err(PipelineError::Upload(format!("{}: quota exceeded", remote)));
            }
        }
        let bytes = std::fs::read(local).map_err(|e| PipelineError::Upload(e.to_string()))?;
        self.objects.lock().unwrap().insert(remote.to_string(), bytes);
        Ok(())
    }

    async fn exists(&self, remote: &str) -> PipelineResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(remote))
    }

    async fn delete(&self, remote: &str) -> PipelineResult<()> {
        self.objects.lock().unwrap().remove(remote);
        Ok(())
    }
}

/// Submitter recording what it was asked to upload
#[derive(Default)]
pub struct FakeSubmitter {
    pub submissions: Mutex<Vec<(ReleaseSubmission, Vec<String>)>>,
}

#[async_trait]
impl ArchiveSubmitter for FakeSubmitter {
    async fn upload_release(
        &self,
        release: &ReleaseSubmission,
        local_dir: &Path,
    ) -> PipelineResult<String> {
        let mut files: Vec<String> = std::fs::read_dir(local_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        files.sort();
        self.submissions
            .lock()
            .unwrap()
            .push((release.clone(), files));
        release
            .catalog_number
            .clone()
            .ok_or_else(|| PipelineError::Submission("no catalog number".to_string()))
    }
}

/// Temporary database with the release schema
pub async fn create_test_db() -> (TempDir, sqlx::SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = lobit_common::db::init_database(&dir.path().join("lobit.db"))
        .await
        .unwrap();
    (dir, pool)
}

/// Service wired to fakes, plus handles on the fakes
pub struct TestPipeline {
    pub dir: TempDir,
    pub db: sqlx::SqlitePool,
    pub service: Arc<ReleaseService>,
    pub source: Arc<FakeArchiveSource>,
    pub tag_reader: Arc<FakeTagReader>,
    pub storage: Arc<FakeStorage>,
    pub submitter: Arc<FakeSubmitter>,
}

impl TestPipeline {
    pub async fn new() -> Self {
        Self::with(FakeArchiveSource::new(), FakeStorage::new()).await
    }

    pub async fn with(source: FakeArchiveSource, storage: FakeStorage) -> Self {
        let (dir, db) = create_test_db().await;
        let source = Arc::new(source);
        let tag_reader = Arc::new(FakeTagReader::new());
        let storage = Arc::new(storage);
        let submitter = Arc::new(FakeSubmitter::default());

        let components = PipelineComponents {
            archive_source: source.clone(),
            tag_reader: tag_reader.clone(),
            storage: storage.clone(),
            submitter: submitter.clone(),
            tmp_directory: dir.path().join("tmp"),
            releases_prefix: "Releases".to_string(),
        };
        let service = Arc::new(ReleaseService::start(db.clone(), components));

        Self {
            dir,
            db,
            service,
            source,
            tag_reader,
            storage,
            submitter,
        }
    }

    /// Register a two-track single-artist release under [`ARCHIVE_FILE`]
    pub fn add_standard_release(&self) {
        self.source.insert(
            ARCHIVE_FILE,
            release_zip(&["01-dawn.opus", "02-dusk.opus"], true),
        );
        self.tag_reader
            .insert("01-dawn.opus", tags("Some Artist", "First Light", "Dawn", 185));
        self.tag_reader
            .insert("02-dusk.opus", tags("Some Artist", "First Light", "Dusk", 242));
    }

    pub async fn wait(&self, kind: TaskKind, file: &str) -> TaskState {
        wait_for_terminal(&self.service, kind, file).await
    }
}

/// Poll until the task leaves `Pending` (panics after five seconds)
pub async fn wait_for_terminal(service: &ReleaseService, kind: TaskKind, file: &str) -> TaskState {
    for _ in 0..500 {
        let state = service.poll(kind, file).await.unwrap();
        if state.is_terminal() {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} task for {} did not finish", kind, file);
}
