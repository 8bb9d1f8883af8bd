//! Test Helper Utilities
//!
//! Shared utilities for testing songid-listener

#![allow(dead_code)]

pub mod audio_generator;
pub mod mocks;

// Re-export commonly used items
pub use audio_generator::{generate_tone_wav, tone_clip, tone_samples, ToneConfig};
pub use mocks::{answer, Harness, ScriptedBackend, StaticClipSource};

use std::time::Duration;

/// Poll until `condition` holds; panics after five seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}
