//! Capture Controller
//!
//! Records a bounded clip from a live PCM stream and encodes it as a 16-bit
//! WAV. Recording stops when the duration elapses or the stream ends,
//! whichever comes first; a clip is never longer than the duration.

use crate::types::{EncodedAudio, PcmChunk, StreamFormat};
use async_trait::async_trait;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default clip length
pub const DEFAULT_CAPTURE_DURATION_MS: u64 = 6000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The stream closed before any audio arrived
    #[error("Audio stream ended before any audio was captured")]
    StreamEnded,

    /// The capture window elapsed with no audio
    #[error("No audio captured")]
    Empty,

    #[error("Failed to encode clip: {0}")]
    Encode(String),
}

// ============================================================================
// Stream Seam
// ============================================================================

/// An already-open live audio stream
pub trait AudioStream: Send + Sync {
    fn format(&self) -> StreamFormat;

    /// Receive every chunk pushed from now on
    fn subscribe(&self) -> broadcast::Receiver<PcmChunk>;
}

/// [`AudioStream`] fed by whoever holds a sender
pub struct BroadcastAudioStream {
    format: StreamFormat,
    tx: Mutex<Option<broadcast::Sender<PcmChunk>>>,
}

impl BroadcastAudioStream {
    pub fn new(format: StreamFormat, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            format,
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Push one interleaved chunk; returns the number of receivers reached
    pub fn push(&self, chunk: PcmChunk) -> usize {
        match self.tx.lock() {
            Ok(guard) => guard
                .as_ref()
                .and_then(|tx| tx.send(chunk).ok())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// End the stream; current and future subscribers see it closed
    pub fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().map(|g| g.is_none()).unwrap_or(true)
    }
}

impl AudioStream for BroadcastAudioStream {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn subscribe(&self) -> broadcast::Receiver<PcmChunk> {
        if let Ok(guard) = self.tx.lock() {
            if let Some(tx) = guard.as_ref() {
                return tx.subscribe();
            }
        }
        // Closed: hand out a receiver whose sender is already gone
        let (tx, rx) = broadcast::channel(1);
        drop(tx);
        rx
    }
}

// ============================================================================
// Capture
// ============================================================================

/// Record up to `duration_ms` from `stream` and encode it as WAV
pub async fn capture_clip(
    stream: &dyn AudioStream,
    duration_ms: u64,
) -> Result<EncodedAudio, CaptureError> {
    let format = stream.format();
    let channels = format.channels.max(1) as usize;
    let max_samples = (format.sample_rate as u64 * duration_ms / 1000) as usize * channels;

    let mut rx = stream.subscribe();
    let deadline = tokio::time::sleep(Duration::from_millis(duration_ms));
    tokio::pin!(deadline);

    let mut samples: Vec<f32> = Vec::with_capacity(max_samples);
    let mut stream_ended = false;

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            received = rx.recv() => match received {
                Ok(chunk) => {
                    samples.extend_from_slice(&chunk);
                    if samples.len() >= max_samples {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Capture fell behind the live stream, chunks dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    stream_ended = true;
                    break;
                }
            },
        }
    }

    samples.truncate(max_samples);
    samples.truncate(samples.len() - samples.len() % channels);

    if samples.is_empty() {
        return Err(if stream_ended {
            CaptureError::StreamEnded
        } else {
            CaptureError::Empty
        });
    }

    debug!(
        samples = samples.len(),
        sample_rate = format.sample_rate,
        channels,
        stream_ended,
        "Capture complete"
    );

    encode_wav(&samples, format)
}

/// Encode interleaved f32 samples as a 16-bit PCM WAV
pub fn encode_wav(samples: &[f32], format: StreamFormat) -> Result<EncodedAudio, CaptureError> {
    let spec = hound::WavSpec {
        channels: format.channels.max(1),
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(value)
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
    }

    Ok(EncodedAudio::wav(cursor.into_inner()))
}

/// Where the orchestrator gets its clips from
#[async_trait]
pub trait ClipSource: Send + Sync {
    async fn capture(&self) -> Result<EncodedAudio, CaptureError>;
}

/// Captures fixed-duration clips from one live stream
pub struct CaptureController {
    stream: Arc<dyn AudioStream>,
    duration_ms: u64,
}

impl CaptureController {
    pub fn new(stream: Arc<dyn AudioStream>, duration_ms: u64) -> Self {
        Self {
            stream,
            duration_ms,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

#[async_trait]
impl ClipSource for CaptureController {
    async fn capture(&self) -> Result<EncodedAudio, CaptureError> {
        capture_clip(self.stream.as_ref(), self.duration_ms).await
    }
}
