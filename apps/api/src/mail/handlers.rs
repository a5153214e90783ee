//! Axum route handlers for the mail API.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::mail::OutgoingMail;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMailRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct SendMailResponse {
    pub status: String,
    /// File name of the attached CV, when one went out with the mail.
    pub attachment: Option<String>,
}

/// POST /api/v1/mail/send
///
/// Sends the reviewed application email. An empty recipient is rejected
/// before any SMTP contact; an extraction that found no address must be
/// corrected by the user first.
pub async fn handle_send(
    State(state): State<AppState>,
    Json(request): Json<SendMailRequest>,
) -> Result<Json<SendMailResponse>, AppError> {
    if request.recipient.trim().is_empty() {
        return Err(AppError::Validation(
            "No recipient email found.".to_string(),
        ));
    }

    let mail = OutgoingMail {
        recipient: request.recipient,
        subject: request.subject,
        body: request.body,
    };

    let receipt = state
        .mailer
        .send(&mail)
        .await
        .map_err(|e| AppError::Mail(e.to_string()))?;

    Ok(Json(SendMailResponse {
        status: "sent".to_string(),
        attachment: receipt.attachment,
    }))
}
