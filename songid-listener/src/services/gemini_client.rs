//! Gemini `generateContent` backend
//!
//! Sends the clip as inline base64 audio with the instructions as text and
//! the `google_search` tool enabled so the model can verify its guess.
//!
//! **Classification:**
//! - 429, or an error body with status `RESOURCE_EXHAUSTED` → QuotaExceeded
//! - 408/500/502/503/504, connect and timeout errors → Transient
//! - any other non-success status → Permanent
//! - unparsable body or answer → MalformedResponse

use super::remote_identifier::{IdentifyBackend, IdentifyRequest, ProviderAnswer};
use super::retry::RemoteError;
use crate::types::MatchSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const USER_AGENT: &str = concat!("songid-listener/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Response Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            api_key,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(request: &IdentifyRequest) -> serde_json::Value {
        json!({
            "contents": [{
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": request.mime_type,
                            "data": request.audio,
                        }
                    },
                    { "text": request.instructions }
                ]
            }],
            "tools": [{ "google_search": {} }]
        })
    }
}

#[async_trait]
impl IdentifyBackend for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn match_source(&self) -> MatchSource {
        MatchSource::Remote
    }

    async fn identify_once(&self, request: &IdentifyRequest) -> Result<ProviderAnswer, RemoteError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify_transport(&e))?;

        debug!(status = status.as_u16(), body_bytes = body.len(), "Gemini responded");

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        parse_response(&body)
    }
}

// ============================================================================
// Classification & Parsing
// ============================================================================

/// Classify a non-success HTTP status (with its body)
pub(crate) fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let provider_status = envelope.as_ref().and_then(|e| e.error.status.clone());
    let message = envelope
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    if status == StatusCode::TOO_MANY_REQUESTS
        || provider_status.as_deref() == Some("RESOURCE_EXHAUSTED")
    {
        return RemoteError::QuotaExceeded(message);
    }

    match status {
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => RemoteError::Transient(message),
        _ => RemoteError::Permanent(message),
    }
}

fn classify_transport(error: &reqwest::Error) -> RemoteError {
    if error.is_builder() {
        RemoteError::Permanent(error.to_string())
    } else {
        // Connect, timeout, interrupted body: all worth another attempt
        RemoteError::Transient(error.to_string())
    }
}

/// Parse a successful `generateContent` body
pub(crate) fn parse_response(body: &str) -> Result<ProviderAnswer, RemoteError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| RemoteError::MalformedResponse(format!("Response is not JSON: {}", e)))?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| RemoteError::MalformedResponse("No candidates in response".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    let mut answer = parse_answer_text(&text)?;

    answer.source_url = candidate
        .grounding_metadata
        .into_iter()
        .flat_map(|m| m.grounding_chunks)
        .filter_map(|chunk| chunk.web.and_then(|w| w.uri))
        .find(|uri| !uri.trim().is_empty());

    Ok(answer)
}

/// Extract the answer object from model text, tolerating code fences and prose
pub(crate) fn parse_answer_text(text: &str) -> Result<ProviderAnswer, RemoteError> {
    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(RemoteError::MalformedResponse(format!(
                "No JSON object in model text ({} chars)",
                text.len()
            )))
        }
    };

    serde_json::from_str(&text[start..=end])
        .map_err(|e| RemoteError::MalformedResponse(format!("Answer JSON invalid: {}", e)))
}
