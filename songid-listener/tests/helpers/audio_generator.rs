//! Audio Test Fixture Generator
//!
//! Tone sequences whose frequencies sit exactly on analysis bins, so the
//! extracted feature set is known in advance.

use songid_listener::types::{EncodedAudio, FeatureSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Bin width of the default extractor (44.1kHz, 1024-point window)
const ANALYSIS_RATE: f32 = 44100.0;
const WINDOW_SIZE: f32 = 1024.0;

#[derive(Debug, Clone)]
pub struct ToneConfig {
    /// One tone per bin, played back to back
    pub bins: Vec<usize>,
    /// Should be a multiple of 0.2s so no analysis frame straddles two tones
    pub seconds_per_tone: f64,
    pub channels: u16,
    pub amplitude: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            bins: vec![5, 9, 14, 20, 27, 33],
            seconds_per_tone: 1.0,
            channels: 1,
            amplitude: 0.05,
        }
    }
}

impl ToneConfig {
    pub fn with_bins(bins: &[usize]) -> Self {
        Self {
            bins: bins.to_vec(),
            ..Default::default()
        }
    }

    /// Feature set the default extractor should produce for this sequence
    pub fn expected_features(&self) -> FeatureSet {
        self.bins.iter().map(|&b| b as u16).collect()
    }
}

/// Mono f32 samples at 44.1kHz
pub fn tone_samples(config: &ToneConfig) -> Vec<f32> {
    let per_tone = (config.seconds_per_tone * ANALYSIS_RATE as f64).round() as usize;
    let mut samples = Vec::with_capacity(per_tone * config.bins.len());

    for (index, &bin) in config.bins.iter().enumerate() {
        let freq = bin as f32 * ANALYSIS_RATE / WINDOW_SIZE;
        for i in 0..per_tone {
            let t = (index * per_tone + i) as f32 / ANALYSIS_RATE;
            samples.push(config.amplitude * (2.0 * std::f32::consts::PI * freq * t).sin());
        }
    }
    samples
}

fn wav_spec(config: &ToneConfig) -> hound::WavSpec {
    hound::WavSpec {
        channels: config.channels,
        sample_rate: ANALYSIS_RATE as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_samples<W: std::io::Write + std::io::Seek>(
    writer: &mut hound::WavWriter<W>,
    config: &ToneConfig,
) -> anyhow::Result<()> {
    for sample in tone_samples(config) {
        let value = (sample * i16::MAX as f32) as i16;
        for _ in 0..config.channels {
            writer.write_sample(value)?;
        }
    }
    Ok(())
}

/// In-memory WAV clip, as the capture controller would produce it
pub fn tone_clip(config: &ToneConfig) -> EncodedAudio {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(config)).unwrap();
        write_samples(&mut writer, config).unwrap();
        writer.finalize().unwrap();
    }
    EncodedAudio::wav(cursor.into_inner())
}

/// Write the tone sequence to `path` as a WAV file
pub fn generate_tone_wav(path: &Path, config: &ToneConfig) -> anyhow::Result<PathBuf> {
    let mut writer = hound::WavWriter::create(path, wav_spec(config))?;
    write_samples(&mut writer, config)?;
    writer.finalize()?;
    Ok(path.to_path_buf())
}
