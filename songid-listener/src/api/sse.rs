//! Server-Sent Events stream of identification events
//!
//! Forwards every [`SongIdEvent`] as `event: <type>` / `data: <json>`, with
//! a 15s heartbeat comment.

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use songid_common::events::SongIdEvent;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const HEARTBEAT: Duration = Duration::from_secs(15);

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => match received {
                    Ok(event) => {
                        if let Some(sse_event) = to_sse_event(&event) {
                            yield Ok(sse_event);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "SSE: Client lagged, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        info!("SSE: Event bus closed, ending stream");
                        break;
                    }
                },
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("heartbeat"))
}

fn to_sse_event(event: &SongIdEvent) -> Option<Event> {
    let event_type = event.event_type();
    match serde_json::to_string(event) {
        Ok(json) => {
            debug!("SSE: Broadcasting event: {}", event_type);
            Some(Event::default().event(event_type).data(json))
        }
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
            None
        }
    }
}
