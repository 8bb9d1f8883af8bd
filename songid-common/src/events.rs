//! Event types and EventBus for songid
//!
//! Events are broadcast over a `tokio::sync::broadcast` channel and are
//! serialized as tagged JSON for SSE transmission.

use crate::song::SongIdentification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// How an identification attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentificationOutcome {
    /// A confirmed song was published
    Identified,
    /// Pipeline completed without a confirmed song
    NotIdentified,
    /// Capture produced no audio
    CaptureFailed,
    /// A newer attempt (or shutdown) superseded this one; nothing was published
    Stale,
}

/// songid event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SongIdEvent {
    /// A new identification attempt started capturing
    IdentificationStarted {
        /// Request token minted for the attempt
        token: u64,
        timestamp: DateTime<Utc>,
    },

    /// A confirmed identification was published
    SongIdentified {
        token: u64,
        song: SongIdentification,
        timestamp: DateTime<Utc>,
    },

    /// An attempt finished (always emitted, whatever the outcome)
    IdentificationFinished {
        token: u64,
        outcome: IdentificationOutcome,
        timestamp: DateTime<Utc>,
    },

    /// Enable flag, language or region changed
    ListeningSettingsChanged {
        enabled: bool,
        language: String,
        region: String,
        timestamp: DateTime<Utc>,
    },
}

impl SongIdEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SongIdEvent::IdentificationStarted { .. } => "IdentificationStarted",
            SongIdEvent::SongIdentified { .. } => "SongIdentified",
            SongIdEvent::IdentificationFinished { .. } => "IdentificationFinished",
            SongIdEvent::ListeningSettingsChanged { .. } => "ListeningSettingsChanged",
        }
    }
}

/// Broadcast bus for [`SongIdEvent`]s
///
/// Cloning shares the same underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SongIdEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SongIdEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SongIdEvent,
    ) -> Result<usize, broadcast::error::SendError<SongIdEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SongIdEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
