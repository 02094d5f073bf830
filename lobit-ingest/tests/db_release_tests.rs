//! Tests for release bundle persistence

mod helpers;

use helpers::create_test_db;
use lobit_common::Error;
use lobit_ingest::db::{self, NewRelease};
use lobit_ingest::models::TrackRecord;
use sqlx::SqlitePool;

fn track(number: u32, file_name: &str, title: &str) -> TrackRecord {
    TrackRecord {
        file_name: file_name.to_string(),
        track_number: number,
        title: title.to_string(),
        duration_seconds: 60 * number,
        duration_hms: format!("{}:00", number),
    }
}

async fn insert(pool: &SqlitePool, file: &str, release_dir: &str) -> db::InsertedRelease {
    let tracks = vec![track(1, "01-a.mp3", "A"), track(2, "02-b.mp3", "B")];
    db::insert_release_bundle(
        pool,
        &NewRelease {
            catalog_no: "cat1",
            release_dir,
            file,
            release_data: r#"{"relname":"Album","artist":"Artist","cat-no":"cat1","description":"d","list":"ol","date":"2024-03-05"}"#,
            page_content: "<p>page</p>",
            tracks: &tracks,
            index_date: "05. Mar 24",
            index_body: "index body",
        },
    )
    .await
    .unwrap()
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_insert_release_bundle_writes_all_rows() {
    let (_dir, pool) = create_test_db().await;
    let inserted = insert(&pool, "a.zip", "artist/album").await;

    let release = db::load_release(&pool, inserted.release_id).await.unwrap().unwrap();
    assert_eq!(release.file.as_deref(), Some("a.zip"));

    let page = db::load_release_page(&pool, inserted.release_id).await.unwrap().unwrap();
    assert_eq!(page.id, inserted.release_page_id);
    assert_eq!(page.content.as_deref(), Some("<p>page</p>"));

    let files = db::list_player_files(&pool, page.id).await.unwrap();
    let numbers: Vec<_> = files.iter().map(|f| f.number).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(files[1].duration_secs, Some(120));

    assert_eq!(count(&pool, "index_record").await, 1);
    assert_eq!(count(&pool, "index_record_releases").await, 1);
}

#[tokio::test]
async fn test_delete_keeps_shared_index_record() {
    let (_dir, pool) = create_test_db().await;
    let first = insert(&pool, "a.zip", "artist/a").await;
    let second = insert(&pool, "b.zip", "artist/b").await;

    // Legacy index entry announcing both releases
    db::link_index_record(&pool, first.index_record_id, second.release_id)
        .await
        .unwrap();

    db::delete_release_bundle(&pool, first.release_id).await.unwrap();

    assert!(db::load_release(&pool, first.release_id).await.unwrap().is_none());
    assert!(db::load_release_page(&pool, first.release_id).await.unwrap().is_none());
    assert_eq!(count(&pool, "player_file").await, 2);

    // Shared record survives, now pointing only at the second release
    let index = db::list_index_records(&pool).await.unwrap();
    let shared = index
        .iter()
        .find(|e| e.record.id == first.index_record_id)
        .expect("shared index record kept");
    assert_eq!(shared.release_dirs, vec!["artist/b".to_string()]);

    db::delete_release_bundle(&pool, second.release_id).await.unwrap();
    assert_eq!(count(&pool, "index_record").await, 0);
    assert_eq!(count(&pool, "index_record_releases").await, 0);
    assert_eq!(count(&pool, "release").await, 0);
    assert_eq!(count(&pool, "release_page").await, 0);
    assert_eq!(count(&pool, "player_file").await, 0);
}

#[tokio::test]
async fn test_delete_unknown_release_is_not_found() {
    let (_dir, pool) = create_test_db().await;
    let result = db::delete_release_bundle(&pool, 404).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_lookup_by_file_and_dir() {
    let (_dir, pool) = create_test_db().await;
    insert(&pool, "a.zip", "artist/album").await;
    let newer = insert(&pool, "a.zip", "artist/album").await;

    let by_file = db::find_release_by_file(&pool, "a.zip").await.unwrap().unwrap();
    assert_eq!(by_file.id, newer.release_id);

    let by_dir = db::find_release_by_dir(&pool, "artist/album").await.unwrap().unwrap();
    assert_eq!(by_dir.id, newer.release_id);

    assert!(db::find_release_by_file(&pool, "other.zip").await.unwrap().is_none());
}

#[tokio::test]
async fn test_index_records_newest_first() {
    let (_dir, pool) = create_test_db().await;
    let first = insert(&pool, "a.zip", "artist/a").await;
    let second = insert(&pool, "b.zip", "artist/b").await;

    let index = db::list_index_records(&pool).await.unwrap();
    let ids: Vec<_> = index.iter().map(|e| e.record.id).collect();
    assert_eq!(ids, vec![second.index_record_id, first.index_record_id]);
    assert_eq!(index[0].release_dirs, vec!["artist/b".to_string()]);
}

#[tokio::test]
async fn test_update_release_data() {
    let (_dir, pool) = create_test_db().await;
    let inserted = insert(&pool, "a.zip", "artist/album").await;

    db::update_release_data(&pool, inserted.release_id, r#"{"archive":"x"}"#)
        .await
        .unwrap();
    let release = db::load_release(&pool, inserted.release_id).await.unwrap().unwrap();
    assert_eq!(release.release_data.as_deref(), Some(r#"{"archive":"x"}"#));

    assert!(matches!(
        db::update_release_data(&pool, 999, "{}").await,
        Err(Error::NotFound(_))
    ));
}
