//! Remote Identifier Client
//!
//! Wraps a provider backend (Gemini, or the offline simulator) with the
//! retry policy and an optional client-side quota guard.
//!
//! **Failure policy:** every failure resolves to `None` ("not identified").
//! - Transient: retried up to the cap with linear backoff
//! - QuotaExceeded: never retried
//! - Permanent / MalformedResponse: logged, not retried

use super::retry::{RemoteError, RetryPolicy};
use crate::types::{EncodedAudio, MatchSource, SongIdentification};
use async_trait::async_trait;
use base64::Engine;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Wire Types
// ============================================================================

/// Provider-agnostic identification request
///
/// Built once per `identify` call and reused across retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    /// Base64 (standard alphabet) clip bytes
    pub audio: String,
    pub mime_type: String,
    pub instructions: String,
    pub target_region: String,
    pub target_language: String,
}

impl IdentifyRequest {
    pub fn new(clip: &EncodedAudio, language: &str, region: &str) -> Self {
        Self {
            audio: base64::engine::general_purpose::STANDARD.encode(&clip.bytes),
            mime_type: clip.mime_type.clone(),
            instructions: build_instructions(language, region),
            target_region: region.to_string(),
            target_language: language.to_string(),
        }
    }
}

/// Answer JSON the provider is instructed to produce
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAnswer {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub lyrics_snippet: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub identified: bool,
    /// Grounding source, filled in by the backend rather than the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ProviderAnswer {
    /// Confirmed identification, or `None` when the model declined or left fields blank
    pub fn into_identification(self, match_source: MatchSource) -> Option<SongIdentification> {
        let song = SongIdentification {
            title: self.title.trim().to_string(),
            artist: self.artist.trim().to_string(),
            lyrics_excerpt: self.lyrics_snippet.filter(|s| !s.trim().is_empty()),
            mood: self.mood.filter(|s| !s.trim().is_empty()),
            identified: self.identified,
            source_url: self.source_url.filter(|s| !s.trim().is_empty()),
            match_source,
        };
        song.is_confirmed().then_some(song)
    }
}

/// Instructions sent alongside the clip
pub fn build_instructions(language: &str, region: &str) -> String {
    format!(
        "Listen to this short recording and identify the song that is playing. \
         The listener is in {region} and prefers {language}; favour songs popular there \
         when the audio is ambiguous. Before answering, confirm your guess with a web search \
         for the title and artist. If you cannot confirm the song, set \"identified\" to false \
         instead of guessing. Reply with only a JSON object of the form \
         {{\"title\": string, \"artist\": string, \"lyricsSnippet\": string (optional, at most two lines), \
         \"mood\": string (optional, one or two words), \"identified\": boolean}}."
    )
}

// ============================================================================
// Backend Seam
// ============================================================================

/// One provider round-trip, with failures already classified
#[async_trait]
pub trait IdentifyBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stamp applied to confirmed answers from this backend
    fn match_source(&self) -> MatchSource;

    async fn identify_once(&self, request: &IdentifyRequest) -> Result<ProviderAnswer, RemoteError>;
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

// ============================================================================
// Client
// ============================================================================

pub struct RemoteIdentifierClient {
    backend: Arc<dyn IdentifyBackend>,
    policy: RetryPolicy,
    limiter: Option<DirectLimiter>,
}

impl RemoteIdentifierClient {
    pub fn new(backend: Arc<dyn IdentifyBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            limiter: None,
        }
    }

    /// Guard the provider with a client-side quota; 0 disables the guard
    pub fn with_requests_per_minute(mut self, requests_per_minute: u32) -> Self {
        self.limiter = NonZeroU32::new(requests_per_minute)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Identify `clip`, resolving every failure to `None`
    pub async fn identify(
        &self,
        clip: &EncodedAudio,
        language: &str,
        region: &str,
    ) -> Option<SongIdentification> {
        match self.try_identify(clip, language, region).await {
            Ok(song) => song,
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    kind = e.kind(),
                    error = %e,
                    "Remote identification failed"
                );
                None
            }
        }
    }

    /// Identify `clip`, surfacing the final classified failure
    pub async fn try_identify(
        &self,
        clip: &EncodedAudio,
        language: &str,
        region: &str,
    ) -> Result<Option<SongIdentification>, RemoteError> {
        let request = IdentifyRequest::new(clip, language, region);
        let backend = self.backend.as_ref();
        let limiter = self.limiter.as_ref();
        let request_ref = &request;

        debug!(
            backend = backend.name(),
            clip_bytes = clip.bytes.len(),
            language,
            region,
            "Calling remote identifier"
        );

        let answer = self
            .policy
            .run("remote identify", move |attempt| async move {
                if let Some(limiter) = limiter {
                    if limiter.check().is_err() {
                        return Err(RemoteError::QuotaExceeded(
                            "client-side request quota exhausted".to_string(),
                        ));
                    }
                }
                debug!(backend = backend.name(), attempt, "Remote attempt");
                backend.identify_once(request_ref).await
            })
            .await?;

        let song = answer.into_identification(backend.match_source());
        match &song {
            Some(song) => info!(
                backend = backend.name(),
                title = %song.title,
                artist = %song.artist,
                "Remote identification succeeded"
            ),
            None => info!(backend = backend.name(), "Remote provider could not identify song"),
        }
        Ok(song)
    }
}
