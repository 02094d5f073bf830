//! Release database operations
//!
//! A published release is a bundle of rows: the `release` itself, its
//! `release_page`, one `player_file` per track and an `index_record` linked
//! through `index_record_releases`. Bundles are written and removed in a
//! single transaction.

use chrono::NaiveDate;
use lobit_common::db::{IndexRecord, PlayerFile, Release, ReleasePage};
use lobit_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use super::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use crate::models::TrackRecord;

/// Display format of index record dates (`05. Mar 24`)
pub const INDEX_DATE_FORMAT: &str = "%d. %b %y";

/// Rows to insert for a newly published release
#[derive(Debug, Clone)]
pub struct NewRelease<'a> {
    pub catalog_no: &'a str,
    pub release_dir: &'a str,
    pub file: &'a str,
    /// Serialized release metadata document
    pub release_data: &'a str,
    pub page_content: &'a str,
    pub tracks: &'a [TrackRecord],
    /// Already formatted with [`INDEX_DATE_FORMAT`]
    pub index_date: &'a str,
    pub index_body: &'a str,
}

/// Ids of the rows created by [`insert_release_bundle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertedRelease {
    pub release_id: i64,
    pub release_page_id: i64,
    pub index_record_id: i64,
}

/// Index page entry with the directories of its linked releases
#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    #[serde(flatten)]
    pub record: IndexRecord,
    pub release_dirs: Vec<String>,
}

/// Release with its page and tracks
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseDetails {
    pub release: Release,
    pub page: Option<ReleasePage>,
    pub player_files: Vec<PlayerFile>,
}

/// Render a `YYYY-MM-DD` release date for the index page
pub fn format_index_date(release_date: &str) -> Result<String> {
    let date_part = release_date.get(..10).unwrap_or(release_date);
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| {
        Error::InvalidInput(format!("Invalid release date '{}': {}", release_date, e))
    })?;
    Ok(date.format(INDEX_DATE_FORMAT).to_string())
}

/// Insert release, page, tracks (in order) and a linked index record
pub async fn insert_release_bundle(
    pool: &SqlitePool,
    release: &NewRelease<'_>,
) -> Result<InsertedRelease> {
    let inserted = retry_on_lock("insert_release_bundle", DEFAULT_MAX_LOCK_WAIT_MS, || {
        insert_release_bundle_once(pool, release)
    })
    .await?;

    tracing::info!(
        release_id = inserted.release_id,
        file = %release.file,
        tracks = release.tracks.len(),
        "Inserted release"
    );
    Ok(inserted)
}

async fn insert_release_bundle_once(
    pool: &SqlitePool,
    release: &NewRelease<'_>,
) -> Result<InsertedRelease> {
    let mut tx = pool.begin().await?;

    let release_id = sqlx::query(
        "INSERT INTO release (catalog_no, release_dir, file, release_data) VALUES (?, ?, ?, ?)",
    )
    .bind(release.catalog_no)
    .bind(release.release_dir)
    .bind(release.file)
    .bind(release.release_data)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let release_page_id = sqlx::query("INSERT INTO release_page (release_id, content) VALUES (?, ?)")
        .bind(release_id)
        .bind(release.page_content)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    for track in release.tracks {
        sqlx::query(
            r#"
            INSERT INTO player_file (release_page_id, file, number, title, duration_secs)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(release_page_id)
        .bind(&track.file_name)
        .bind(track.track_number as i64)
        .bind(&track.title)
        .bind(track.duration_seconds as i64)
        .execute(&mut *tx)
        .await?;
    }

    let index_record_id = sqlx::query("INSERT INTO index_record (date, body) VALUES (?, ?)")
        .bind(release.index_date)
        .bind(release.index_body)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    sqlx::query("INSERT INTO index_record_releases (left_id, right_id) VALUES (?, ?)")
        .bind(index_record_id)
        .bind(release_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(InsertedRelease {
        release_id,
        release_page_id,
        index_record_id,
    })
}

/// Link an additional release to an existing index record
pub async fn link_index_record(pool: &SqlitePool, index_record_id: i64, release_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO index_record_releases (left_id, right_id) VALUES (?, ?)")
        .bind(index_record_id)
        .bind(release_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a release with its page and tracks
///
/// Index records whose only linked release is this one are deleted too;
/// records shared with other releases only lose the link.
pub async fn delete_release_bundle(pool: &SqlitePool, release_id: i64) -> Result<()> {
    retry_on_lock("delete_release_bundle", DEFAULT_MAX_LOCK_WAIT_MS, || {
        delete_release_bundle_once(pool, release_id)
    })
    .await?;

    tracing::info!(release_id, "Deleted release");
    Ok(())
}

async fn delete_release_bundle_once(pool: &SqlitePool, release_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM release WHERE id = ?")
        .bind(release_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(Error::NotFound(format!("Release {} not found", release_id)));
    }

    let sole_index_records: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT left_id FROM index_record_releases
        WHERE left_id IN (SELECT left_id FROM index_record_releases WHERE right_id = ?)
        GROUP BY left_id
        HAVING COUNT(right_id) = 1
        "#,
    )
    .bind(release_id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM index_record_releases WHERE right_id = ?")
        .bind(release_id)
        .execute(&mut *tx)
        .await?;

    for index_record_id in &sole_index_records {
        sqlx::query("DELETE FROM index_record WHERE id = ?")
            .bind(index_record_id)
            .execute(&mut *tx)
            .await?;
    }

    let page_id: Option<i64> = sqlx::query_scalar("SELECT id FROM release_page WHERE release_id = ?")
        .bind(release_id)
        .fetch_optional(&mut *tx)
        .await?;
    if let Some(page_id) = page_id {
        sqlx::query("DELETE FROM player_file WHERE release_page_id = ?")
            .bind(page_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM release_page WHERE id = ?")
            .bind(page_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM release WHERE id = ?")
        .bind(release_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::debug!(
        release_id,
        index_records_removed = sole_index_records.len(),
        "Release rows removed"
    );
    Ok(())
}

/// Most recently created release built from the archive `file`
pub async fn find_release_by_file(pool: &SqlitePool, file: &str) -> Result<Option<Release>> {
    let release = sqlx::query_as::<_, Release>(
        "SELECT id, catalog_no, release_dir, file, release_data FROM release WHERE file = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(file)
    .fetch_optional(pool)
    .await?;
    Ok(release)
}

pub async fn find_release_by_dir(pool: &SqlitePool, release_dir: &str) -> Result<Option<Release>> {
    let release = sqlx::query_as::<_, Release>(
        "SELECT id, catalog_no, release_dir, file, release_data FROM release WHERE release_dir = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(release_dir)
    .fetch_optional(pool)
    .await?;
    Ok(release)
}

pub async fn load_release(pool: &SqlitePool, release_id: i64) -> Result<Option<Release>> {
    let release = sqlx::query_as::<_, Release>(
        "SELECT id, catalog_no, release_dir, file, release_data FROM release WHERE id = ?",
    )
    .bind(release_id)
    .fetch_optional(pool)
    .await?;
    Ok(release)
}

pub async fn load_release_page(pool: &SqlitePool, release_id: i64) -> Result<Option<ReleasePage>> {
    let page = sqlx::query_as::<_, ReleasePage>(
        "SELECT id, release_id, content, custom_body FROM release_page WHERE release_id = ?",
    )
    .bind(release_id)
    .fetch_optional(pool)
    .await?;
    Ok(page)
}

/// Tracks of a release page in track order
pub async fn list_player_files(pool: &SqlitePool, release_page_id: i64) -> Result<Vec<PlayerFile>> {
    let files = sqlx::query_as::<_, PlayerFile>(
        r#"
        SELECT id, release_page_id, file, number, title, duration_secs
        FROM player_file
        WHERE release_page_id = ?
        ORDER BY number, id
        "#,
    )
    .bind(release_page_id)
    .fetch_all(pool)
    .await?;
    Ok(files)
}

/// Load page and tracks for a release
pub async fn load_release_details(pool: &SqlitePool, release: Release) -> Result<ReleaseDetails> {
    let page = load_release_page(pool, release.id).await?;
    let player_files = match &page {
        Some(page) => list_player_files(pool, page.id).await?,
        None => Vec::new(),
    };
    Ok(ReleaseDetails {
        release,
        page,
        player_files,
    })
}

/// Replace the release metadata document
pub async fn update_release_data(pool: &SqlitePool, release_id: i64, release_data: &str) -> Result<()> {
    let result = retry_on_lock("update_release_data", DEFAULT_MAX_LOCK_WAIT_MS, move || async move {
        let result = sqlx::query("UPDATE release SET release_data = ? WHERE id = ?")
            .bind(release_data)
            .bind(release_id)
            .execute(pool)
            .await?;
        Ok::<_, Error>(result)
    })
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Release {} not found", release_id)));
    }
    Ok(())
}

/// Index records, newest first, with the directories of their releases
pub async fn list_index_records(pool: &SqlitePool) -> Result<Vec<IndexEntry>> {
    let records = sqlx::query_as::<_, IndexRecord>(
        "SELECT id, date, body, explicit_height, custom_date_section FROM index_record ORDER BY id DESC",
    )
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let release_dirs: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.release_dir FROM release r
            JOIN index_record_releases l ON l.right_id = r.id
            WHERE l.left_id = ? AND r.release_dir IS NOT NULL
            ORDER BY r.id
            "#,
        )
        .bind(record.id)
        .fetch_all(pool)
        .await?;

        entries.push(IndexEntry {
            record,
            release_dirs,
        });
    }
    Ok(entries)
}
