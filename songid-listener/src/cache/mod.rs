//! Local Match Cache
//!
//! Bounded, de-duplicated list of (features, song) pairs, most recent first,
//! queried by feature-set similarity rather than by key.
//!
//! **Invariants:**
//! - never more than `capacity` entries
//! - no stored FeatureSet smaller than `min_features`
//! - at most one entry per case-insensitive (title, artist)
//! - every stored song is stamped `LOCAL` and confirmed
//! - simulated answers are never stored
//!
//! **Persistence:** the whole list is one JSON document under
//! [`CACHE_STORE_KEY`], loaded lazily on first access and saved after every
//! mutation. Unreadable or malformed data loads as an empty cache.
//!
//! Read-modify-write is serialized by an async mutex held across the save.

pub mod store;

use crate::types::{FeatureSet, MatchSource, SongIdentification};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use songid_common::time::Clock;
use std::collections::HashSet;
use std::sync::Arc;
use store::KeyValueStore;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Well-known key the record list is persisted under
pub const CACHE_STORE_KEY: &str = "song_match_cache";

// ============================================================================
// Configuration
// ============================================================================

/// Where the cache is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Sqlite,
    File,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Maximum number of entries kept
    pub capacity: usize,
    /// Minimum Jaccard similarity for a hit (inclusive)
    pub similarity_threshold: f64,
    /// FeatureSets smaller than this are never stored
    pub min_features: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Sqlite,
            capacity: 50,
            similarity_threshold: 0.25,
            min_features: 5,
        }
    }
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub features: FeatureSet,
    pub song: SongIdentification,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub inserted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// New entry inserted at the front
    Inserted,
    /// An entry for the same song was removed and the new one inserted at the front
    Replaced,
    /// Too few features to be useful for matching
    RejectedTooFewFeatures,
    /// Not a confirmed identification
    RejectedUnconfirmed,
    /// Made up by the offline simulator, not identified from audio
    RejectedSimulated,
}

impl StoreOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, StoreOutcome::Inserted | StoreOutcome::Replaced)
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store error: {0}")]
    Store(#[from] songid_common::Error),

    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Cache
// ============================================================================

pub struct LocalMatchCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    /// `None` until the first access loads the persisted list
    entries: Mutex<Option<Vec<CacheEntry>>>,
}

impl LocalMatchCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            store,
            clock,
            config,
            entries: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Best-matching song if its similarity reaches the threshold
    ///
    /// Ties go to the most recently inserted entry.
    pub async fn lookup(&self, features: &FeatureSet) -> Option<SongIdentification> {
        let mut guard = self.loaded().await;
        let entries = guard.get_or_insert_with(Vec::new);

        // Most recent first, so a strictly-greater comparison keeps the newest tie
        let mut best: Option<(&CacheEntry, f64)> = None;
        for entry in entries.iter() {
            let score = features.jaccard(&entry.features);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((entry, score));
            }
        }

        match best {
            Some((entry, score)) if score >= self.config.similarity_threshold => {
                debug!(
                    score = format!("{:.3}", score),
                    title = %entry.song.title,
                    artist = %entry.song.artist,
                    "Cache hit"
                );
                Some(entry.song.clone())
            }
            Some((_, score)) => {
                debug!(best_score = format!("{:.3}", score), "Cache miss");
                None
            }
            None => {
                debug!("Cache miss (empty cache)");
                None
            }
        }
    }

    /// Store a confirmed identification under `features`
    ///
    /// The stored copy is stamped `LOCAL`; the caller's value is untouched.
    pub async fn store(
        &self,
        features: &FeatureSet,
        song: &SongIdentification,
    ) -> Result<StoreOutcome, CacheError> {
        if features.len() < self.config.min_features {
            debug!(
                feature_count = features.len(),
                min_features = self.config.min_features,
                "Not caching: too few features"
            );
            return Ok(StoreOutcome::RejectedTooFewFeatures);
        }
        if !song.is_confirmed() {
            return Ok(StoreOutcome::RejectedUnconfirmed);
        }
        if song.match_source == MatchSource::Simulated {
            debug!(title = %song.title, "Not caching: simulated answer");
            return Ok(StoreOutcome::RejectedSimulated);
        }

        let mut guard = self.loaded().await;
        let entries = guard.get_or_insert_with(Vec::new);

        let key = song.dedup_key();
        let before = entries.len();
        entries.retain(|entry| entry.song.dedup_key() != key);
        let outcome = if entries.len() < before {
            StoreOutcome::Replaced
        } else {
            StoreOutcome::Inserted
        };

        entries.insert(
            0,
            CacheEntry {
                features: features.clone(),
                song: song.with_match_source(MatchSource::Local),
                inserted_at: self.clock.now(),
            },
        );
        entries.truncate(self.config.capacity);

        debug!(
            title = %song.title,
            artist = %song.artist,
            ?outcome,
            size = entries.len(),
            "Stored cache entry"
        );

        self.save(entries).await?;
        Ok(outcome)
    }

    /// Snapshot of all entries, most recent first
    pub async fn entries(&self) -> Vec<CacheEntry> {
        self.loaded().await.clone().unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.loaded().await.as_ref().map_or(0, Vec::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every entry and persist the empty list
    pub async fn clear(&self) -> Result<(), CacheError> {
        let mut guard = self.loaded().await;
        let entries = guard.get_or_insert_with(Vec::new);
        let removed = entries.len();
        entries.clear();
        self.save(entries).await?;
        info!(removed, "Match cache cleared");
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    async fn loaded(&self) -> MutexGuard<'_, Option<Vec<CacheEntry>>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        guard
    }

    async fn load(&self) -> Vec<CacheEntry> {
        let raw = match self.store.get(CACHE_STORE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No persisted match cache, starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted match cache, starting empty");
                return Vec::new();
            }
        };

        let records: Vec<CacheEntry> = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Persisted match cache is malformed, starting empty");
                return Vec::new();
            }
        };

        let total = records.len();
        let mut seen = HashSet::new();
        let mut entries: Vec<CacheEntry> = records
            .into_iter()
            .filter(|entry| {
                entry.features.len() >= self.config.min_features && entry.song.is_confirmed()
            })
            // Most recent first, so the first record per (title, artist) wins
            .filter(|entry| seen.insert(entry.song.dedup_key()))
            .map(|mut entry| {
                entry.song.match_source = MatchSource::Local;
                entry
            })
            .collect();
        entries.truncate(self.config.capacity);

        if entries.len() < total {
            warn!(
                kept = entries.len(),
                dropped = total - entries.len(),
                "Dropped invalid, duplicate or excess persisted cache entries"
            );
        }
        info!(size = entries.len(), "Loaded match cache");
        entries
    }

    async fn save(&self, entries: &[CacheEntry]) -> Result<(), CacheError> {
        let raw = serde_json::to_string(entries)?;
        self.store.set(CACHE_STORE_KEY, &raw).await?;
        Ok(())
    }
}
