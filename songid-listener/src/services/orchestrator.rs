//! Identification Orchestrator
//!
//! Drives one identification attempt at a time through
//! Idle → Capturing → Analyzing → (RemoteCall) → Done → Idle.
//!
//! **Single-flight:** a trigger while an attempt is in flight (or while
//! disabled) is rejected, never queued.
//!
//! **Staleness:** every attempt carries the [`RequestToken`] minted when it
//! started. Disabling, shutting down, or a newer attempt moves the live
//! token on; a finishing attempt whose token is no longer live publishes
//! nothing and leaves `is_identifying` alone. In-flight captures and network
//! calls are never aborted, only their results dropped.
//!
//! State lives behind a synchronous mutex that is never held across an
//! `.await`.

use super::capture::ClipSource;
use super::remote_identifier::RemoteIdentifierClient;
use crate::cache::LocalMatchCache;
use crate::features::FeatureExtractor;
use crate::types::{EncodedAudio, FeatureSet, RequestToken, SongIdentification};
use serde::{Deserialize, Serialize};
use songid_common::events::{EventBus, IdentificationOutcome, SongIdEvent};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Capturing,
    Analyzing,
    RemoteCall,
    Done,
}

/// Enable flag, language and region owned by application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningSettings {
    pub enabled: bool,
    pub language: String,
    pub region: String,
}

impl Default for ListeningSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "English".to_string(),
            region: "US".to_string(),
        }
    }
}

/// Partial settings change; `None` fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub language: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TriggerRejection {
    #[error("Listening is disabled")]
    Disabled,
    #[error("An identification is already in flight")]
    InFlight,
    #[error("Orchestrator has been shut down")]
    ShutDown,
}

/// Snapshot of everything the presentation layer reads
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStatus {
    pub is_identifying: bool,
    pub phase: Phase,
    pub current: Option<SongIdentification>,
    pub live_token: RequestToken,
    #[serde(flatten)]
    pub settings: ListeningSettings,
}

struct OrchestratorState {
    live_token: RequestToken,
    in_flight: bool,
    phase: Phase,
    current: Option<SongIdentification>,
    settings: ListeningSettings,
    shut_down: bool,
}

impl OrchestratorState {
    /// Move the live token on so whatever is in flight becomes stale
    fn invalidate(&mut self) {
        self.live_token = self.live_token.next();
        self.in_flight = false;
        self.phase = Phase::Idle;
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct IdentificationOrchestrator {
    clips: Arc<dyn ClipSource>,
    extractor: Arc<FeatureExtractor>,
    cache: Arc<LocalMatchCache>,
    remote: Arc<RemoteIdentifierClient>,
    event_bus: EventBus,
    state: Mutex<OrchestratorState>,
}

impl IdentificationOrchestrator {
    pub fn new(
        clips: Arc<dyn ClipSource>,
        extractor: Arc<FeatureExtractor>,
        cache: Arc<LocalMatchCache>,
        remote: Arc<RemoteIdentifierClient>,
        event_bus: EventBus,
        settings: ListeningSettings,
    ) -> Self {
        Self {
            clips,
            extractor,
            cache,
            remote,
            event_bus,
            state: Mutex::new(OrchestratorState {
                live_token: RequestToken::default(),
                in_flight: false,
                phase: Phase::Idle,
                current: None,
                settings,
                shut_down: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    pub fn is_identifying(&self) -> bool {
        self.lock().in_flight
    }

    /// Most recently published song
    pub fn current(&self) -> Option<SongIdentification> {
        self.lock().current.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn settings(&self) -> ListeningSettings {
        self.lock().settings.clone()
    }

    pub fn live_token(&self) -> RequestToken {
        self.lock().live_token
    }

    pub fn status(&self) -> OrchestratorStatus {
        let state = self.lock();
        OrchestratorStatus {
            is_identifying: state.in_flight,
            phase: state.phase,
            current: state.current.clone(),
            live_token: state.live_token,
            settings: state.settings.clone(),
        }
    }

    pub fn cache(&self) -> &Arc<LocalMatchCache> {
        &self.cache
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Start an attempt in the background
    pub fn trigger(self: &Arc<Self>) -> Result<RequestToken, TriggerRejection> {
        let (token, settings) = self.begin()?;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_attempt(token, settings).await;
        });
        Ok(token)
    }

    /// Run one attempt to completion; returns the song if this attempt published one
    ///
    /// The attempt runs on its own task, so dropping the returned future
    /// stops the wait but not the attempt, which still clears in-flight state.
    pub async fn identify_now(
        self: &Arc<Self>,
    ) -> Result<Option<SongIdentification>, TriggerRejection> {
        let (token, settings) = self.begin()?;
        let this = Arc::clone(self);
        let attempt = tokio::spawn(async move { this.run_attempt(token, settings).await });
        match attempt.await {
            Ok(published) => Ok(published),
            Err(e) => {
                warn!(token = %token, error = %e, "Identification task failed");
                self.finish(token, IdentificationOutcome::NotIdentified);
                Ok(None)
            }
        }
    }

    /// Apply a settings change; disabling invalidates any in-flight attempt
    pub fn update_settings(&self, update: SettingsUpdate) -> ListeningSettings {
        let settings = {
            let mut state = self.lock();
            if let Some(language) = update.language {
                state.settings.language = language;
            }
            if let Some(region) = update.region {
                state.settings.region = region;
            }
            if let Some(enabled) = update.enabled {
                if state.settings.enabled && !enabled {
                    state.invalidate();
                }
                state.settings.enabled = enabled;
            }
            state.settings.clone()
        };

        info!(
            enabled = settings.enabled,
            language = %settings.language,
            region = %settings.region,
            "Listening settings updated"
        );
        self.event_bus.emit_lossy(SongIdEvent::ListeningSettingsChanged {
            enabled: settings.enabled,
            language: settings.language.clone(),
            region: settings.region.clone(),
            timestamp: songid_common::time::now(),
        });
        settings
    }

    /// Invalidate the live token and refuse further triggers
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if !state.shut_down {
            state.shut_down = true;
            state.invalidate();
            info!(live_token = %state.live_token, "Orchestrator shut down");
        }
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    /// Entry guard: mint a token if enabled and idle
    fn begin(&self) -> Result<(RequestToken, ListeningSettings), TriggerRejection> {
        let (token, settings) = {
            let mut state = self.lock();
            if state.shut_down {
                return Err(TriggerRejection::ShutDown);
            }
            if !state.settings.enabled {
                return Err(TriggerRejection::Disabled);
            }
            if state.in_flight {
                return Err(TriggerRejection::InFlight);
            }
            state.live_token = state.live_token.next();
            state.in_flight = true;
            state.phase = Phase::Capturing;
            (state.live_token, state.settings.clone())
        };

        debug!(token = %token, "Identification started");
        self.event_bus.emit_lossy(SongIdEvent::IdentificationStarted {
            token: token.value(),
            timestamp: songid_common::time::now(),
        });
        Ok((token, settings))
    }

    async fn run_attempt(
        &self,
        token: RequestToken,
        settings: ListeningSettings,
    ) -> Option<SongIdentification> {
        let clip = match self.clips.capture().await {
            Ok(clip) => clip,
            Err(e) => {
                info!(token = %token, error = %e, "Capture failed, nothing to identify");
                self.finish(token, IdentificationOutcome::CaptureFailed);
                return None;
            }
        };

        self.set_phase(token, Phase::Analyzing);
        let features = self.extract(&clip).await;

        let cached = if features.is_empty() {
            debug!(token = %token, "No local features, skipping cache lookup");
            None
        } else {
            self.cache.lookup(&features).await
        };

        let result = match cached {
            Some(hit) => {
                info!(token = %token, title = %hit.title, artist = %hit.artist, "Identified from local cache");
                Some(hit)
            }
            None => {
                self.set_phase(token, Phase::RemoteCall);
                self.remote
                    .identify(&clip, &settings.language, &settings.region)
                    .await
            }
        };

        let Some(song) = result.filter(SongIdentification::is_confirmed) else {
            let outcome = if self.is_live(token) {
                IdentificationOutcome::NotIdentified
            } else {
                IdentificationOutcome::Stale
            };
            self.finish(token, outcome);
            return None;
        };

        // Cache population does not depend on whether this attempt is still live
        if let Err(e) = self.cache.store(&features, &song).await {
            warn!(token = %token, error = %e, "Failed to persist match cache");
        }

        let published = self.publish(token, &song);
        let outcome = if published {
            IdentificationOutcome::Identified
        } else {
            IdentificationOutcome::Stale
        };
        self.finish(token, outcome);
        published.then_some(song)
    }

    async fn extract(&self, clip: &EncodedAudio) -> FeatureSet {
        let extractor = Arc::clone(&self.extractor);
        let clip = clip.clone();
        match tokio::task::spawn_blocking(move || extractor.extract_features(&clip)).await {
            Ok(features) => features,
            Err(e) => {
                warn!(error = %e, "Feature extraction task failed");
                FeatureSet::new()
            }
        }
    }

    fn is_live(&self, token: RequestToken) -> bool {
        let state = self.lock();
        !state.shut_down && state.live_token == token
    }

    fn set_phase(&self, token: RequestToken, phase: Phase) {
        let mut state = self.lock();
        if state.live_token == token && state.in_flight {
            state.phase = phase;
        }
    }

    /// Publish `song` if `token` is still live; returns whether it was
    fn publish(&self, token: RequestToken, song: &SongIdentification) -> bool {
        {
            let mut state = self.lock();
            if state.shut_down || state.live_token != token {
                debug!(token = %token, live_token = %state.live_token, "Discarding stale result");
                return false;
            }
            state.current = Some(song.clone());
            state.phase = Phase::Done;
        }

        self.event_bus.emit_lossy(SongIdEvent::SongIdentified {
            token: token.value(),
            song: song.clone(),
            timestamp: songid_common::time::now(),
        });
        true
    }

    /// Clear in-flight state if `token` still owns it
    fn finish(&self, token: RequestToken, outcome: IdentificationOutcome) {
        {
            let mut state = self.lock();
            if state.live_token == token {
                state.in_flight = false;
                state.phase = Phase::Idle;
            }
        }

        debug!(token = %token, ?outcome, "Identification finished");
        self.event_bus.emit_lossy(SongIdEvent::IdentificationFinished {
            token: token.value(),
            outcome,
            timestamp: songid_common::time::now(),
        });
    }
}
