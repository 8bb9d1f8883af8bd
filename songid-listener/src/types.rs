//! Core types for the identification pipeline
//!
//! Song-level types live in `songid_common::song` so events can carry them;
//! they are re-exported here for convenience.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

pub use songid_common::song::{MatchSource, SongIdentification};

// ============================================================================
// Feature Set
// ============================================================================

/// Set of frequency-bin indices that were spectrally dominant at some point in a clip
///
/// Serialized as a plain sorted number array. Only ever compared by
/// similarity, never displayed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeSet<u16>);

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bin: u16) -> bool {
        self.0.insert(bin)
    }

    pub fn contains(&self, bin: u16) -> bool {
        self.0.contains(&bin)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    /// Jaccard similarity |A∩B| / |A∪B|
    ///
    /// Two empty sets score 0.0: "no features" never counts as a match.
    pub fn jaccard(&self, other: &FeatureSet) -> f64 {
        let intersection = self.0.intersection(&other.0).count();
        let union = self.0.len() + other.0.len() - intersection;
        if union == 0 {
            return 0.0;
        }
        intersection as f64 / union as f64
    }
}

impl FromIterator<u16> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[u16; N]> for FeatureSet {
    fn from(bins: [u16; N]) -> Self {
        bins.into_iter().collect()
    }
}

// ============================================================================
// Audio Types
// ============================================================================

/// An encoded audio clip (container bytes plus MIME type)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl EncodedAudio {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn wav(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "audio/wav")
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension hint for the decoder probe
    pub fn extension_hint(&self) -> Option<&'static str> {
        match self.mime_type.as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
            "audio/flac" | "audio/x-flac" => Some("flac"),
            "audio/mpeg" | "audio/mp3" => Some("mp3"),
            "audio/ogg" => Some("ogg"),
            "audio/webm" => Some("webm"),
            "audio/mp4" | "audio/aac" => Some("m4a"),
            _ => None,
        }
    }
}

/// Format of a live PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// One chunk of interleaved f32 PCM from a live stream
pub type PcmChunk = Arc<[f32]>;

// ============================================================================
// Request Token
// ============================================================================

/// Monotonically increasing token minted per identification attempt
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RequestToken(pub u64);

impl RequestToken {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
