//! Read-only views of published releases

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::{
    db::{self, IndexEntry, ReleaseDetails},
    error::{ApiError, ApiResult},
    AppState,
};

/// GET /index
///
/// Index page entries, newest first.
pub async fn list_index(State(state): State<AppState>) -> ApiResult<Json<Vec<IndexEntry>>> {
    let entries = db::list_index_records(&state.db).await?;
    Ok(Json(entries))
}

/// GET /releases/by-dir/*release_dir
pub async fn release_by_dir(
    State(state): State<AppState>,
    Path(release_dir): Path<String>,
) -> ApiResult<Json<ReleaseDetails>> {
    let release_dir = release_dir.trim_matches('/');
    let release = db::find_release_by_dir(&state.db, release_dir)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No release in '{}'", release_dir)))?;

    let details = db::load_release_details(&state.db, release).await?;
    Ok(Json(details))
}

/// Build public index routes
pub fn index_routes() -> Router<AppState> {
    Router::new()
        .route("/index", get(list_index))
        .route("/releases/by-dir/*release_dir", get(release_by_dir))
}
