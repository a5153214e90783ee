pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::extraction::handlers as extraction_handlers;
use crate::mail::handlers as mail_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/extract", post(extraction_handlers::handle_extract))
        .route("/api/v1/mail/send", post(mail_handlers::handle_send))
        .with_state(state)
}
