//! Axum route handlers for the extraction API.

use axum::extract::{Multipart, State};
use axum::Json;
use tracing::debug;

use crate::errors::AppError;
use crate::extraction::prompts::DEFAULT_EXTRACTION_PROMPT;
use crate::extraction::{extract, ExtractionOutcome};
use crate::llm_client::InlineImage;
use crate::state::AppState;

/// Media type assumed when the upload does not declare an image type.
const FALLBACK_IMAGE_MIME: &str = "image/jpeg";

/// POST /api/v1/extract
///
/// Multipart form: optional `prompt` text field (defaults to the built-in
/// extraction prompt) and optional `image` file field. Always returns a
/// fully-populated outcome; extraction failures are encoded in its fields,
/// so this endpoint only errors on a malformed upload.
pub async fn handle_extract(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractionOutcome>, AppError> {
    let mut prompt: Option<String> = None;
    let mut image: Option<InlineImage> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart request: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("prompt") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable prompt field: {e}")))?;
                if !text.trim().is_empty() {
                    prompt = Some(text);
                }
            }
            Some("image") => {
                let mime_type = field
                    .content_type()
                    .filter(|ct| ct.starts_with("image/"))
                    .unwrap_or(FALLBACK_IMAGE_MIME)
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable image field: {e}")))?;
                if !data.is_empty() {
                    image = Some(InlineImage { mime_type, data });
                }
            }
            _ => {}
        }
    }

    let prompt = prompt.unwrap_or_else(|| DEFAULT_EXTRACTION_PROMPT.to_string());
    debug!(has_image = image.is_some(), "running extraction");

    let outcome = extract(&state.llm, &prompt, image).await;
    Ok(Json(outcome))
}
