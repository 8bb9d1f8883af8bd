//! File replay as a live audio stream
//!
//! Decodes a file once and pushes 100ms mono chunks into a
//! [`BroadcastAudioStream`] at real-time pace, optionally looping, until
//! cancelled. Stands in for a microphone when running headless.

use super::capture::BroadcastAudioStream;
use crate::types::StreamFormat;
use crate::utils::decode_audio_file;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const CHUNK_MS: u64 = 100;
const STREAM_CAPACITY: usize = 128;

pub struct FileAudioSource {
    stream: Arc<BroadcastAudioStream>,
    samples: Vec<f32>,
    chunk_len: usize,
    looping: bool,
    wait_for_listener: bool,
}

impl FileAudioSource {
    /// Decode `path` (any format symphonia supports) into a replay source
    pub fn open(path: &Path, looping: bool) -> Result<Self> {
        let decoded = decode_audio_file(path)?;
        info!(
            path = %path.display(),
            duration_seconds = format!("{:.1}", decoded.duration_seconds),
            sample_rate = decoded.sample_rate,
            looping,
            "Opened file audio source"
        );
        Ok(Self::from_samples(decoded.samples, decoded.sample_rate, looping))
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, looping: bool) -> Self {
        let format = StreamFormat {
            sample_rate,
            channels: 1,
        };
        Self {
            stream: Arc::new(BroadcastAudioStream::new(format, STREAM_CAPACITY)),
            samples,
            chunk_len: ((sample_rate as u64 * CHUNK_MS / 1000) as usize).max(1),
            looping,
            wait_for_listener: false,
        }
    }

    /// Hold playback at the start until someone subscribes
    pub fn wait_for_listener(mut self, wait: bool) -> Self {
        self.wait_for_listener = wait;
        self
    }

    pub fn stream(&self) -> Arc<BroadcastAudioStream> {
        self.stream.clone()
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_millis(CHUNK_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut position = 0usize;
        let mut started = !self.wait_for_listener;

        while !self.samples.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("File audio source cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let end = (position + self.chunk_len).min(self.samples.len());
                    let reached = self.stream.push(Arc::from(&self.samples[position..end]));

                    if !started {
                        if reached == 0 {
                            continue;
                        }
                        started = true;
                    }

                    position = end;
                    if position >= self.samples.len() {
                        if !self.looping {
                            debug!("File audio source reached end of file");
                            break;
                        }
                        position = 0;
                    }
                }
            }
        }

        self.stream.close();
    }
}
