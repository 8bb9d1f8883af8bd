//! Song identification result shared by all songid components

use serde::{Deserialize, Serialize};

/// Where an identification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchSource {
    /// Answered by the remote model
    Remote,
    /// Answered by the local match cache
    Local,
    /// Answered by the offline simulator (no API key configured)
    Simulated,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::Remote => "REMOTE",
            MatchSource::Local => "LOCAL",
            MatchSource::Simulated => "SIMULATED",
        }
    }
}

impl std::fmt::Display for MatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of identifying one clip
///
/// Immutable once produced; copies with a different `match_source` are made
/// with [`SongIdentification::with_match_source`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongIdentification {
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics_excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    pub identified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub match_source: MatchSource,
}

impl SongIdentification {
    /// Confirmed identification with no optional fields
    pub fn identified(
        title: impl Into<String>,
        artist: impl Into<String>,
        match_source: MatchSource,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            lyrics_excerpt: None,
            mood: None,
            identified: true,
            source_url: None,
            match_source,
        }
    }

    /// Copy of this identification stamped with another source
    pub fn with_match_source(&self, match_source: MatchSource) -> Self {
        Self {
            match_source,
            ..self.clone()
        }
    }

    /// Case-insensitive (title, artist) key used for de-duplication
    pub fn dedup_key(&self) -> (String, String) {
        (
            self.title.trim().to_lowercase(),
            self.artist.trim().to_lowercase(),
        )
    }

    /// Whether this may be cached or published: identified with a non-blank title and artist
    pub fn is_confirmed(&self) -> bool {
        self.identified && !self.title.trim().is_empty() && !self.artist.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_source_wire_format() {
        let json = serde_json::to_string(&MatchSource::Simulated).unwrap();
        assert_eq!(json, "\"SIMULATED\"");
        let parsed: MatchSource = serde_json::from_str("\"LOCAL\"").unwrap();
        assert_eq!(parsed, MatchSource::Local);
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut song = SongIdentification::identified("Song X", "Band", MatchSource::Remote);
        song.lyrics_excerpt = Some("la la".to_string());
        song.source_url = Some("https://example.com/x".to_string());

        let value = serde_json::to_value(&song).unwrap();
        assert_eq!(value["lyricsExcerpt"], "la la");
        assert_eq!(value["sourceUrl"], "https://example.com/x");
        assert_eq!(value["matchSource"], "REMOTE");
        assert!(value.get("mood").is_none());
    }

    #[test]
    fn test_with_match_source_leaves_original_untouched() {
        let remote = SongIdentification::identified("Song X", "Band", MatchSource::Remote);
        let local = remote.with_match_source(MatchSource::Local);

        assert_eq!(remote.match_source, MatchSource::Remote);
        assert_eq!(local.match_source, MatchSource::Local);
        assert_eq!(local.title, remote.title);
    }

    #[test]
    fn test_dedup_key_ignores_case_and_padding() {
        let a = SongIdentification::identified("Song X ", "The Band", MatchSource::Remote);
        let b = SongIdentification::identified("song x", "THE BAND", MatchSource::Local);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_blank_fields_are_not_confirmed() {
        let mut song = SongIdentification::identified("  ", "Band", MatchSource::Remote);
        assert!(!song.is_confirmed());
        song.title = "Title".to_string();
        assert!(song.is_confirmed());
        song.identified = false;
        assert!(!song.is_confirmed());
    }
}
