use std::sync::Arc;

use crate::llm_client::GeminiClient;
use crate::mail::Mailer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub llm: GeminiClient,
    /// Pluggable mail backend. Default: `SmtpMailer` over the configured relay.
    pub mailer: Arc<dyn Mailer>,
}
