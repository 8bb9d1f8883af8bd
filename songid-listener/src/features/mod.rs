//! Feature Extractor
//!
//! Turns an encoded clip into a [`FeatureSet`]: the set of frequency bins
//! that were ever dominant inside a fixed low/low-mid band.
//!
//! # Algorithm
//! 1. Decode the clip to mono PCM (symphonia) and resample to the analysis rate
//! 2. Every `step_ms`, analyze one `window_size` frame (no overlap)
//! 3. Find the strongest bin in `[min_bin, max_bin)`; the lowest bins are
//!    skipped to reject DC and mains hum
//! 4. Keep the bin if its byte-scaled magnitude exceeds `noise_floor`
//!
//! Duplicates collapse: the result says which bins were ever dominant, not
//! when. Identical bytes always produce an identical set; two captures of
//! the same song overlap without matching exactly, which the cache's
//! similarity threshold absorbs.

pub mod spectrum;

use crate::types::{EncodedAudio, FeatureSet};
use crate::utils::{decode_audio_bytes, resample_mono};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use spectrum::{peak_in_band, SpectrumAnalyzer};
use tracing::{debug, warn};

/// Largest window whose bins all fit a `u16` feature
pub const MAX_WINDOW_SIZE: usize = 2 * (u16::MAX as usize + 1);

/// Extraction parameters
///
/// The defaults are empirical; keep them configurable rather than derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Sample rate clips are resampled to before analysis (Hz)
    pub analysis_sample_rate: u32,
    /// FFT window length in samples
    pub window_size: usize,
    /// Interval between analyzed windows (ms)
    pub step_ms: u32,
    /// First bin of the search band (inclusive)
    pub min_bin: usize,
    /// End of the search band (exclusive)
    pub max_bin: usize,
    /// Byte-scaled magnitude a peak must exceed to count
    pub noise_floor: u8,
    /// Magnitude mapped to byte value 0
    pub min_decibels: f32,
    /// Magnitude mapped to byte value 255
    pub max_decibels: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            analysis_sample_rate: 44100,
            window_size: 1024,
            step_ms: 200,
            min_bin: 2,
            max_bin: 48,
            noise_floor: 128,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 4 {
            bail!("window_size must be at least 4 (got {})", self.window_size);
        }
        if self.window_size > MAX_WINDOW_SIZE {
            bail!(
                "window_size must be at most {} (got {})",
                MAX_WINDOW_SIZE,
                self.window_size
            );
        }
        if self.step_ms == 0 {
            bail!("step_ms must be positive");
        }
        if self.analysis_sample_rate == 0 {
            bail!("analysis_sample_rate must be positive");
        }
        if self.min_bin >= self.max_bin || self.max_bin > self.window_size / 2 {
            bail!(
                "band [{}, {}) must be non-empty and within {} bins",
                self.min_bin,
                self.max_bin,
                self.window_size / 2
            );
        }
        if self.min_decibels >= self.max_decibels {
            bail!("min_decibels must be below max_decibels");
        }
        Ok(())
    }

    /// Samples between the starts of consecutive analyzed windows
    pub fn step_samples(&self) -> usize {
        ((self.analysis_sample_rate as u64 * self.step_ms as u64) / 1000).max(1) as usize
    }
}

/// Extracts [`FeatureSet`]s from encoded clips
pub struct FeatureExtractor {
    config: ExtractorConfig,
    analyzer: SpectrumAnalyzer,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let analyzer =
            SpectrumAnalyzer::new(config.window_size, config.min_decibels, config.max_decibels);
        Self { config, analyzer }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract features from a clip; an undecodable clip yields an empty set
    pub fn extract_features(&self, clip: &EncodedAudio) -> FeatureSet {
        match self.try_extract(clip) {
            Ok(features) => features,
            Err(e) => {
                warn!(error = %e, mime_type = %clip.mime_type, "Feature extraction failed, no local features");
                FeatureSet::new()
            }
        }
    }

    /// Extract features, surfacing decode errors
    pub fn try_extract(&self, clip: &EncodedAudio) -> Result<FeatureSet> {
        if clip.is_empty() {
            bail!("Clip is empty");
        }
        let decoded = decode_audio_bytes(&clip.bytes, clip.extension_hint())?;
        self.features_from_samples(&decoded.samples, decoded.sample_rate)
    }

    /// Extract features from mono PCM at `sample_rate`
    pub fn features_from_samples(&self, samples: &[f32], sample_rate: u32) -> Result<FeatureSet> {
        let samples = resample_mono(samples, sample_rate, self.config.analysis_sample_rate)?;

        let window = self.config.window_size;
        let step = self.config.step_samples();
        let mut features = FeatureSet::new();
        let mut frames = 0usize;

        let mut position = 0;
        while position + window <= samples.len() {
            let spectrum = self.analyzer.byte_spectrum(&samples[position..position + window]);
            if let Some((bin, value)) =
                peak_in_band(&spectrum, self.config.min_bin, self.config.max_bin)
            {
                if value > self.config.noise_floor {
                    let bin = u16::try_from(bin)
                        .map_err(|_| anyhow::anyhow!("bin {} does not fit a feature", bin))?;
                    features.insert(bin);
                }
            }
            frames += 1;
            position += step;
        }

        debug!(frames, feature_count = features.len(), "Extracted features");
        Ok(features)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}
