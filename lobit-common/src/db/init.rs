//! Database initialization
//!
//! Creates the database on first run and applies the release archive schema.
//! Every statement is idempotent, so opening an existing database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all release archive tables on an existing pool
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_index_record_table(pool).await?;
    create_release_table(pool).await?;
    create_release_page_table(pool).await?;
    create_player_file_table(pool).await?;
    create_index_record_releases_table(pool).await?;
    Ok(())
}

async fn create_index_record_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_record (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT,
            body TEXT,
            explicit_height INTEGER,
            custom_date_section TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_release_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS release (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            catalog_no TEXT,
            release_dir TEXT,
            file TEXT,
            release_data TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_release_file ON release(file)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_release_dir ON release(release_dir)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_release_page_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS release_page (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            release_id INTEGER NOT NULL UNIQUE REFERENCES release(id),
            content TEXT,
            custom_body TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_player_file_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS player_file (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            release_page_id INTEGER NOT NULL REFERENCES release_page(id),
            file TEXT NOT NULL,
            number INTEGER NOT NULL,
            title TEXT NOT NULL,
            duration_secs INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_index_record_releases_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_record_releases (
            left_id INTEGER NOT NULL REFERENCES index_record(id),
            right_id INTEGER NOT NULL REFERENCES release(id),
            PRIMARY KEY (left_id, right_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
