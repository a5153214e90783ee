//! Structured extraction — turns a job-posting screenshot plus an instruction
//! prompt into recipient / subject / body fields for the application email.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm_client::{GeminiClient, InlineImage, LlmError};

pub mod handlers;
pub mod prompts;

/// Body text reported when no API key is configured.
pub const MISSING_KEY_BODY: &str = "API key missing.";
/// Body text reported when the delivery budget is exhausted.
pub const RETRIES_EXHAUSTED_BODY: &str = "Failed after multiple retries.";

/// The three extracted fields. All are always present; a failure is encoded
/// as an explanatory body with the other two fields empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionOutcome {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl ExtractionOutcome {
    fn failure(body: impl Into<String>) -> Self {
        Self {
            recipient: String::new(),
            subject: String::new(),
            body: body.into(),
        }
    }
}

/// The model's reply contract. Key names are fixed by the extraction prompt;
/// keys the model omits come back as empty strings.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(rename = "MAIL_ID", default)]
    recipient: String,
    #[serde(rename = "SUBJECT_LINE", default)]
    subject: String,
    #[serde(rename = "EMAIL_CONTENT", default)]
    body: String,
}

impl From<RawExtraction> for ExtractionOutcome {
    fn from(raw: RawExtraction) -> Self {
        Self {
            recipient: raw.recipient,
            subject: raw.subject,
            body: raw.body,
        }
    }
}

/// Runs the extraction pipeline against the LLM.
///
/// Never fails outward: a missing API key, retry exhaustion, a terminal
/// service error, and an unparseable reply all come back as a fully-formed
/// outcome whose fields encode what happened.
pub async fn extract(
    llm: &GeminiClient,
    prompt: &str,
    image: Option<InlineImage>,
) -> ExtractionOutcome {
    match llm.generate(prompt, image.as_ref()).await {
        Ok(text) => parse_outcome(&text),
        Err(LlmError::MissingApiKey) => ExtractionOutcome::failure(MISSING_KEY_BODY),
        Err(LlmError::AttemptsExhausted { .. }) => {
            ExtractionOutcome::failure(RETRIES_EXHAUSTED_BODY)
        }
        Err(e) => {
            warn!("extraction request failed: {e}");
            ExtractionOutcome::failure(format!("Error processing request: {e}"))
        }
    }
}

/// Parses the model text into an outcome.
///
/// Chain: whole text as JSON → first `{` to last `}` substring as JSON →
/// the whole text verbatim as the body with recipient and subject empty.
/// Code fences are stripped before the JSON attempts only; the verbatim
/// fallback keeps the original text.
fn parse_outcome(text: &str) -> ExtractionOutcome {
    let candidate = strip_json_fences(text);

    if let Ok(raw) = serde_json::from_str::<RawExtraction>(candidate) {
        return raw.into();
    }

    if let Some(span) = brace_span(candidate) {
        if let Ok(raw) = serde_json::from_str::<RawExtraction>(span) {
            return raw.into();
        }
    }

    ExtractionOutcome {
        recipient: String::new(),
        subject: String::new(),
        body: text.to_string(),
    }
}

/// Greedy brace-delimited span: from the first `{` to the last `}`.
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::llm_client::{GenerateContentRequest, Reply, Transport, TransportError};

    use super::*;

    // ── parse_outcome ────────────────────────────────────────────────────────

    #[test]
    fn test_parses_clean_json_object() {
        let text = r#"{"MAIL_ID":"a@b.com","SUBJECT_LINE":"Hi","EMAIL_CONTENT":"Body"}"#;
        let outcome = parse_outcome(text);

        assert_eq!(outcome.recipient, "a@b.com");
        assert_eq!(outcome.subject, "Hi");
        assert_eq!(outcome.body, "Body");
    }

    #[test]
    fn test_parses_object_embedded_in_prose() {
        let text = concat!(
            "Some preamble... ",
            r#"{"MAIL_ID":"x@y.com","SUBJECT_LINE":"S","EMAIL_CONTENT":"C"}"#,
            " trailing text"
        );
        let outcome = parse_outcome(text);

        assert_eq!(outcome.recipient, "x@y.com");
        assert_eq!(outcome.subject, "S");
        assert_eq!(outcome.body, "C");
    }

    #[test]
    fn test_parses_fenced_json() {
        let text = "```json\n{\"MAIL_ID\":\"hr@corp.com\",\"SUBJECT_LINE\":\"Application\",\"EMAIL_CONTENT\":\"Dear team\"}\n```";
        let outcome = parse_outcome(text);

        assert_eq!(outcome.recipient, "hr@corp.com");
        assert_eq!(outcome.subject, "Application");
        assert_eq!(outcome.body, "Dear team");
    }

    #[test]
    fn test_prose_without_json_becomes_body_verbatim() {
        let text = "I could not find an email address in this image.";
        let outcome = parse_outcome(text);

        assert_eq!(outcome.recipient, "");
        assert_eq!(outcome.subject, "");
        assert_eq!(outcome.body, text);
    }

    #[test]
    fn test_partial_object_defaults_missing_fields_to_empty() {
        let text = r#"{"MAIL_ID":"only@this.com"}"#;
        let outcome = parse_outcome(text);

        assert_eq!(outcome.recipient, "only@this.com");
        assert_eq!(outcome.subject, "");
        assert_eq!(outcome.body, "");
    }

    #[test]
    fn test_non_string_values_fall_back_to_body() {
        let text = r#"{"MAIL_ID": 42, "SUBJECT_LINE": true, "EMAIL_CONTENT": null}"#;
        let outcome = parse_outcome(text);

        assert_eq!(outcome.recipient, "");
        assert_eq!(outcome.subject, "");
        assert_eq!(outcome.body, text);
    }

    #[test]
    fn test_closing_brace_before_opening_is_not_a_span() {
        let text = "weird } text { with reversed braces";
        let outcome = parse_outcome(text);

        assert_eq!(outcome.body, text);
    }

    // ── extract ──────────────────────────────────────────────────────────────

    struct ScriptedTransport(Mutex<VecDeque<Result<Reply, TransportError>>>);

    impl ScriptedTransport {
        fn new(replies: Vec<Result<Reply, TransportError>>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(replies.into())))
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn dispatch(
            &self,
            _url: &str,
            _request: &GenerateContentRequest,
        ) -> Result<Reply, TransportError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .expect("no network call expected")
        }
    }

    fn reply_with_text(text: &str) -> Result<Reply, TransportError> {
        Ok(Reply {
            status: 200,
            body: json!({
                "candidates": [{"content": {"parts": [{"text": text}]}}]
            })
            .to_string(),
        })
    }

    #[tokio::test]
    async fn test_extract_without_api_key_reports_missing_key() {
        let llm = GeminiClient::with_transport(String::new(), ScriptedTransport::new(vec![]));

        let outcome = extract(&llm, "prompt", None).await;

        assert_eq!(outcome.recipient, "");
        assert_eq!(outcome.subject, "");
        assert_eq!(outcome.body, MISSING_KEY_BODY);
    }

    #[tokio::test]
    async fn test_extract_parses_successful_reply() {
        let transport = ScriptedTransport::new(vec![reply_with_text(
            r#"{"MAIL_ID":"jobs@acme.com","SUBJECT_LINE":"Rust Engineer","EMAIL_CONTENT":"Dear hiring team,"}"#,
        )]);
        let llm = GeminiClient::with_transport("key".to_string(), transport);

        let outcome = extract(&llm, "prompt", None).await;

        assert_eq!(outcome.recipient, "jobs@acme.com");
        assert_eq!(outcome.subject, "Rust Engineer");
        assert_eq!(outcome.body, "Dear hiring team,");
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_reports_exhaustion_after_persistent_rate_limit() {
        let rate_limited = || {
            Ok(Reply {
                status: 429,
                body: "quota exceeded".to_string(),
            })
        };
        let transport = ScriptedTransport::new(vec![
            rate_limited(),
            rate_limited(),
            rate_limited(),
            rate_limited(),
            rate_limited(),
        ]);
        let llm = GeminiClient::with_transport("key".to_string(), transport);

        let outcome = extract(&llm, "prompt", None).await;

        assert_eq!(outcome.recipient, "");
        assert_eq!(outcome.subject, "");
        assert_eq!(outcome.body, RETRIES_EXHAUSTED_BODY);
    }

    #[tokio::test]
    async fn test_extract_reports_terminal_service_error() {
        let transport = ScriptedTransport::new(vec![Ok(Reply {
            status: 403,
            body: json!({"error": {"message": "permission denied"}}).to_string(),
        })]);
        let llm = GeminiClient::with_transport("key".to_string(), transport);

        let outcome = extract(&llm, "prompt", None).await;

        assert_eq!(outcome.recipient, "");
        assert_eq!(outcome.subject, "");
        assert!(outcome.body.starts_with("Error processing request:"));
        assert!(outcome.body.contains("permission denied"));
    }

    #[tokio::test]
    async fn test_extract_with_empty_reply_text_yields_empty_body() {
        let transport = ScriptedTransport::new(vec![Ok(Reply {
            status: 200,
            body: json!({}).to_string(),
        })]);
        let llm = GeminiClient::with_transport("key".to_string(), transport);

        let outcome = extract(&llm, "prompt", None).await;

        assert_eq!(outcome, ExtractionOutcome::failure(""));
    }
}
