//! Scripted stand-ins for the capture and provider seams

use async_trait::async_trait;
use songid_common::events::EventBus;
use songid_common::time::SystemClock;
use songid_listener::cache::store::MemoryStore;
use songid_listener::cache::{CacheConfig, LocalMatchCache};
use songid_listener::features::FeatureExtractor;
use songid_listener::services::{
    CaptureError, ClipSource, IdentificationOrchestrator, IdentifyBackend, IdentifyRequest,
    ListeningSettings, ProviderAnswer, RemoteError, RemoteIdentifierClient, RetryPolicy,
};
use songid_listener::types::{EncodedAudio, MatchSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Confirmed provider answer
pub fn answer(title: &str, artist: &str) -> ProviderAnswer {
    ProviderAnswer {
        title: title.to_string(),
        artist: artist.to_string(),
        identified: true,
        ..Default::default()
    }
}

// ============================================================================
// Clip Source
// ============================================================================

/// Hands out the same capture result every time
pub struct StaticClipSource {
    result: Result<EncodedAudio, CaptureError>,
    calls: AtomicU32,
}

impl StaticClipSource {
    pub fn ok(clip: EncodedAudio) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(clip),
            calls: AtomicU32::new(0),
        })
    }

    pub fn failing(error: CaptureError) -> Arc<Self> {
        Arc::new(Self {
            result: Err(error),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClipSource for StaticClipSource {
    async fn capture(&self) -> Result<EncodedAudio, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.result {
            Ok(clip) => Ok(clip.clone()),
            Err(CaptureError::StreamEnded) => Err(CaptureError::StreamEnded),
            Err(CaptureError::Empty) => Err(CaptureError::Empty),
            Err(CaptureError::Encode(msg)) => Err(CaptureError::Encode(msg.clone())),
        }
    }
}

// ============================================================================
// Provider Backend
// ============================================================================

struct Step {
    result: Result<ProviderAnswer, RemoteError>,
    gate: Option<Arc<Notify>>,
}

/// Backend replaying queued results, then a fallback
///
/// A gated step blocks inside the "network call" until its `Notify` fires.
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    fallback: Result<ProviderAnswer, RemoteError>,
    calls: AtomicU32,
    requests: Mutex<Vec<IdentifyRequest>>,
}

impl ScriptedBackend {
    pub fn always(result: Result<ProviderAnswer, RemoteError>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: result,
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn answering(title: &str, artist: &str) -> Arc<Self> {
        Self::always(Ok(answer(title, artist)))
    }

    pub fn push(&self, result: Result<ProviderAnswer, RemoteError>) {
        self.steps.lock().unwrap().push_back(Step { result, gate: None });
    }

    /// Queue a result that is only returned once the returned gate is notified
    pub fn push_gated(&self, result: Result<ProviderAnswer, RemoteError>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.steps.lock().unwrap().push_back(Step {
            result,
            gate: Some(gate.clone()),
        });
        gate
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<IdentifyRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentifyBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn match_source(&self) -> MatchSource {
        MatchSource::Remote
    }

    async fn identify_once(&self, request: &IdentifyRequest) -> Result<ProviderAnswer, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step { result, gate }) => {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                result
            }
            None => self.fallback.clone(),
        }
    }
}

// ============================================================================
// Orchestrator Harness
// ============================================================================

/// Orchestrator wired to scripted seams, a memory-backed cache and the real extractor
pub struct Harness {
    pub orchestrator: Arc<IdentificationOrchestrator>,
    pub cache: Arc<LocalMatchCache>,
    pub backend: Arc<ScriptedBackend>,
    pub clips: Arc<dyn ClipSource>,
    pub event_bus: EventBus,
}

impl Harness {
    pub fn new(clips: Arc<dyn ClipSource>, backend: Arc<ScriptedBackend>) -> Self {
        Self::with_settings(clips, backend, ListeningSettings::default())
    }

    pub fn with_settings(
        clips: Arc<dyn ClipSource>,
        backend: Arc<ScriptedBackend>,
        settings: ListeningSettings,
    ) -> Self {
        let cache = Arc::new(LocalMatchCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            CacheConfig::default(),
        ));
        // Millisecond backoff keeps retry paths fast in real time
        let remote = Arc::new(RemoteIdentifierClient::new(
            backend.clone(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        ));
        let event_bus = EventBus::new(100);

        let orchestrator = Arc::new(IdentificationOrchestrator::new(
            clips.clone(),
            Arc::new(FeatureExtractor::default()),
            cache.clone(),
            remote,
            event_bus.clone(),
            settings,
        ));

        Self {
            orchestrator,
            cache,
            backend,
            clips,
            event_bus,
        }
    }
}
