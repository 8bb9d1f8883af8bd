//! Offline identifier used when no API key is configured
//!
//! Answers every request with the next song from a small fixed catalogue
//! after a short delay, stamped `SIMULATED`.

use super::remote_identifier::{IdentifyBackend, IdentifyRequest, ProviderAnswer};
use super::retry::RemoteError;
use crate::types::MatchSource;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const CATALOGUE: &[(&str, &str, &str)] = &[
    ("Blue in Green", "Miles Davis", "Reflective"),
    ("Clair de Lune", "Claude Debussy", "Dreamy"),
    ("Take Five", "The Dave Brubeck Quartet", "Cool"),
    ("Gymnopedie No. 1", "Erik Satie", "Calm"),
];

pub struct SimulatedIdentifier {
    delay: Duration,
    next: AtomicUsize,
}

impl SimulatedIdentifier {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next: AtomicUsize::new(0),
        }
    }
}

impl Default for SimulatedIdentifier {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}

#[async_trait]
impl IdentifyBackend for SimulatedIdentifier {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn match_source(&self) -> MatchSource {
        MatchSource::Simulated
    }

    async fn identify_once(&self, _request: &IdentifyRequest) -> Result<ProviderAnswer, RemoteError> {
        tokio::time::sleep(self.delay).await;

        let index = self.next.fetch_add(1, Ordering::Relaxed) % CATALOGUE.len();
        let (title, artist, mood) = CATALOGUE[index];
        Ok(ProviderAnswer {
            title: title.to_string(),
            artist: artist.to_string(),
            lyrics_snippet: None,
            mood: Some(mood.to_string()),
            identified: true,
            source_url: None,
        })
    }
}
