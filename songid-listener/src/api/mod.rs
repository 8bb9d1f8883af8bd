//! HTTP API handlers for songid-listener
//!
//! REST endpoints over the orchestrator outputs plus an SSE event stream.

pub mod cache;
pub mod health;
pub mod identify;
pub mod sse;

pub use cache::cache_routes;
pub use health::health_routes;
pub use identify::identify_routes;
pub use sse::event_stream;
