//! Identification pipeline services
//!
//! - `capture`: Capture Controller and the live-stream seam
//! - `file_source`: file replay standing in for a microphone
//! - `retry`, `remote_identifier`, `gemini_client`, `simulated_identifier`:
//!   Remote Identifier Client and its backends
//! - `orchestrator`: single-flight, staleness-safe coordination
//! - `auto_listener`: periodic re-trigger loop

pub mod auto_listener;
pub mod capture;
pub mod file_source;
pub mod gemini_client;
pub mod orchestrator;
pub mod remote_identifier;
pub mod retry;
pub mod simulated_identifier;

pub use auto_listener::AutoListener;
pub use capture::{
    capture_clip, AudioStream, BroadcastAudioStream, CaptureController, CaptureError, ClipSource,
};
pub use file_source::FileAudioSource;
pub use gemini_client::GeminiClient;
pub use orchestrator::{
    IdentificationOrchestrator, ListeningSettings, OrchestratorStatus, Phase, SettingsUpdate,
    TriggerRejection,
};
pub use remote_identifier::{IdentifyBackend, IdentifyRequest, ProviderAnswer, RemoteIdentifierClient};
pub use retry::{RemoteError, RetryPolicy};
pub use simulated_identifier::SimulatedIdentifier;
