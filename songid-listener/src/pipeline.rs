//! Assembly of the identification pipeline from configuration
//!
//! Shared by `serve` and `identify`; the cache subcommands only need
//! [`open_cache`].

use crate::cache::store::{FileStore, KeyValueStore, MemoryStore, SqliteStore};
use crate::cache::{CacheBackend, LocalMatchCache};
use crate::config::{resolve_api_key, ListenerConfig, RemoteConfig};
use crate::db::{init_database_pool, settings::load_listening_settings};
use crate::features::FeatureExtractor;
use crate::services::{
    ClipSource, GeminiClient, IdentificationOrchestrator, IdentifyBackend, RemoteIdentifierClient,
    SimulatedIdentifier,
};
use anyhow::Result;
use songid_common::config::DATABASE_FILE_NAME;
use songid_common::events::EventBus;
use songid_common::time::SystemClock;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const EVENT_BUS_CAPACITY: usize = 100;

/// Everything the HTTP surface and CLI need after startup
pub struct Pipeline {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub cache: Arc<LocalMatchCache>,
    pub orchestrator: Arc<IdentificationOrchestrator>,
}

impl Pipeline {
    pub async fn build(
        config: &ListenerConfig,
        root_folder: &Path,
        clips: Arc<dyn ClipSource>,
    ) -> Result<Self> {
        let db = init_database_pool(&root_folder.join(DATABASE_FILE_NAME)).await?;
        let cache = Arc::new(open_cache(config, root_folder, &db));
        let remote = Arc::new(build_remote_client(&config.remote)?);
        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

        let defaults = config.identify.listening_settings();
        let settings = match load_listening_settings(&db, &defaults).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Persisted listening settings unreadable, using config");
                defaults
            }
        };

        let orchestrator = Arc::new(IdentificationOrchestrator::new(
            clips,
            Arc::new(FeatureExtractor::new(config.extractor.clone())),
            cache.clone(),
            remote,
            event_bus.clone(),
            settings,
        ));

        Ok(Self {
            db,
            event_bus,
            cache,
            orchestrator,
        })
    }
}

/// Open the match cache over the configured back-end
pub fn open_cache(config: &ListenerConfig, root_folder: &Path, db: &SqlitePool) -> LocalMatchCache {
    let store: Arc<dyn KeyValueStore> = match config.cache.backend {
        CacheBackend::Sqlite => Arc::new(SqliteStore::new(db.clone())),
        CacheBackend::File => Arc::new(FileStore::new(root_folder.join("cache"))),
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
    };
    info!(backend = ?config.cache.backend, capacity = config.cache.capacity, "Match cache configured");
    LocalMatchCache::new(store, Arc::new(SystemClock), config.cache.clone())
}

/// Gemini when an API key is configured, otherwise the offline simulator
pub fn build_remote_client(remote: &RemoteConfig) -> Result<RemoteIdentifierClient> {
    let backend: Arc<dyn IdentifyBackend> = match resolve_api_key(remote) {
        Some(api_key) => Arc::new(GeminiClient::new(
            api_key,
            &remote.model,
            &remote.base_url,
            remote.timeout(),
        )?),
        None => Arc::new(SimulatedIdentifier::new(Duration::from_millis(
            remote.simulated_delay_ms,
        ))),
    };

    info!(backend = backend.name(), "Remote identifier configured");
    Ok(RemoteIdentifierClient::new(backend, remote.retry_policy())
        .with_requests_per_minute(remote.requests_per_minute))
}
