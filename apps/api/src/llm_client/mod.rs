//! LLM client — the single point of entry for all Gemini API calls.
//!
//! ARCHITECTURAL RULE: No other module may call the Gemini API directly.
//! All LLM interactions MUST go through this module.
//!
//! Model: gemini-2.5-flash (hardcoded — do not make configurable to prevent drift)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// The model used for all LLM calls.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "gemini-2.5-flash";
/// Total delivery budget: 1 initial attempt + 4 retries.
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key missing")]
    MissingApiKey,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("no successful response after {attempts} attempts: {last}")]
    AttemptsExhausted { attempts: u32, last: String },
}

/// Transport-level failure: the request never completed, or the reply body
/// could not be read. Always retry-eligible.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Raw HTTP reply, before any envelope interpretation.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

/// Raw image payload forwarded inline with the prompt.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Bytes,
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

/// Request body for `generateContent`: one content entry whose parts are the
/// text prompt first, then the optional inline image.
#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GenerateContentRequest {
    fn new(prompt: &str, image: Option<&InlineImage>) -> Self {
        let mut parts = vec![Part::Text {
            text: prompt.to_string(),
        }];
        if let Some(image) = image {
            parts.push(Part::Inline {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: STANDARD.encode(&image.data),
                },
            });
        }
        Self {
            contents: vec![Content { parts }],
        }
    }
}

/// Response envelope. Every level is optional on the wire; absence at any
/// depth degrades to empty text rather than an error.
#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate; empty when any level is absent.
    fn first_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Transport seam
// ────────────────────────────────────────────────────────────────────────────

/// Wire seam between the client and the network. The production
/// implementation posts with reqwest; tests script replies through it.
///
/// Carried in `GeminiClient` as `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dispatch(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> Result<Reply, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dispatch(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> Result<Reply, TransportError> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(Reply { status, body })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// The single Gemini client used by all services.
/// Wraps `generateContent` with bounded retry and envelope extraction.
#[derive(Clone)]
pub struct GeminiClient {
    transport: Arc<dyn Transport>,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            transport: Arc::new(HttpTransport::new()),
            api_key,
        }
    }

    /// Constructs a client over a caller-supplied transport.
    pub fn with_transport(api_key: String, transport: Arc<dyn Transport>) -> Self {
        Self { transport, api_key }
    }

    /// Sends the prompt (and optional inline image) to Gemini and returns the
    /// generated text.
    ///
    /// Delivery policy: at most 5 total attempts. Transport failures and
    /// HTTP 429 are retried after 1s, 2s, 4s, 8s; any other failing status
    /// terminates immediately. A well-formed reply whose envelope is missing
    /// candidates, content, parts, or text yields an empty string.
    pub async fn generate(
        &self,
        prompt: &str,
        image: Option<&InlineImage>,
    ) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let url = format!(
            "{GEMINI_API_BASE}/{MODEL}:generateContent?key={}",
            self.api_key
        );
        let request = GenerateContentRequest::new(prompt, image);

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s
                let delay = Duration::from_secs(1 << (attempt - 1));
                warn!(
                    "Gemini call attempt {} failed, retrying after {}s...",
                    attempt,
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }

            let reply = match self.transport.dispatch(&url, &request).await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Transport(e.to_string()));
                    continue;
                }
            };

            if reply.status == 429 {
                warn!("Gemini API rate limited: {}", reply.body);
                last_error = Some(LlmError::Api {
                    status: reply.status,
                    message: reply.body,
                });
                continue;
            }

            if !(200..300).contains(&reply.status) {
                // Try to parse the structured error message
                let message = serde_json::from_str::<GeminiError>(&reply.body)
                    .map(|e| e.error.message)
                    .unwrap_or(reply.body);
                return Err(LlmError::Api {
                    status: reply.status,
                    message,
                });
            }

            let envelope: GenerateContentResponse = match serde_json::from_str(&reply.body) {
                Ok(parsed) => parsed,
                Err(e) => {
                    last_error =
                        Some(LlmError::Transport(format!("unparseable response body: {e}")));
                    continue;
                }
            };

            let text = envelope.first_text();
            debug!(
                "Gemini call succeeded on attempt {} ({} bytes of text)",
                attempt,
                text.len()
            );
            return Ok(text);
        }

        Err(LlmError::AttemptsExhausted {
            attempts: MAX_ATTEMPTS,
            last: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}
