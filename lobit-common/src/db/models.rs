//! Database row models

use serde::{Deserialize, Serialize};

/// `release` row
///
/// `release_data` holds the JSON document describing the release
/// (title, artist, catalog number, description, list style, date, ...).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Release {
    pub id: i64,
    pub catalog_no: Option<String>,
    pub release_dir: Option<String>,
    pub file: Option<String>,
    pub release_data: Option<String>,
}

/// `release_page` row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReleasePage {
    pub id: i64,
    pub release_id: i64,
    pub content: Option<String>,
    pub custom_body: Option<String>,
}

/// `player_file` row (one published track)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlayerFile {
    pub id: i64,
    pub release_page_id: i64,
    pub file: String,
    pub number: i64,
    pub title: String,
    pub duration_secs: Option<i64>,
}

/// `index_record` row (one entry on the public index page)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IndexRecord {
    pub id: i64,
    pub date: Option<String>,
    pub body: Option<String>,
    pub explicit_height: Option<i64>,
    pub custom_date_section: Option<String>,
}
