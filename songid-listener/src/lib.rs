//! songid-listener library interface
//!
//! Identification pipeline (capture → features → local cache → remote
//! fallback) behind a single-flight orchestrator, with an HTTP/SSE surface.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod services;
pub mod types;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use crate::cache::LocalMatchCache;
use crate::services::IdentificationOrchestrator;
use axum::Router;
use chrono::{DateTime, Utc};
use songid_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Settings table (listening preferences persistence)
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub orchestrator: Arc<IdentificationOrchestrator>,
    pub cache: Arc<LocalMatchCache>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        orchestrator: Arc<IdentificationOrchestrator>,
        cache: Arc<LocalMatchCache>,
    ) -> Self {
        Self {
            db,
            event_bus,
            orchestrator,
            cache,
            startup_time: Utc::now(),
        }
    }

    pub fn from_pipeline(pipeline: &pipeline::Pipeline) -> Self {
        Self::new(
            pipeline.db.clone(),
            pipeline.event_bus.clone(),
            pipeline.orchestrator.clone(),
            pipeline.cache.clone(),
        )
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::identify_routes())
        .merge(api::cache_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
