//! Utility modules for songid-listener

pub mod audio_decoder;
pub mod resampler;

pub use audio_decoder::{decode_audio_bytes, decode_audio_file, DecodedAudio};
pub use resampler::resample_mono;
