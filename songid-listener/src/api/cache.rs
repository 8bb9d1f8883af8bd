//! Match cache inspection endpoints

use crate::cache::CacheEntry;
use crate::error::ApiResult;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CacheListResponse {
    pub size: usize,
    pub capacity: usize,
    /// Most recent first
    pub entries: Vec<CacheEntry>,
}

#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub removed: usize,
}

/// GET /api/cache
pub async fn list_cache(State(state): State<AppState>) -> Json<CacheListResponse> {
    let entries = state.cache.entries().await;
    Json(CacheListResponse {
        size: entries.len(),
        capacity: state.cache.config().capacity,
        entries,
    })
}

/// DELETE /api/cache
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<CacheClearResponse>> {
    let removed = state.cache.len().await;
    state.cache.clear().await?;
    Ok(Json(CacheClearResponse { removed }))
}

pub fn cache_routes() -> Router<AppState> {
    Router::new().route("/api/cache", get(list_cache).delete(clear_cache))
}
