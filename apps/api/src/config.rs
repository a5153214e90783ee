use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API key. May be empty; extraction then reports the missing
    /// key per request instead of refusing to boot.
    pub gemini_api_key: String,
    pub sender_email: String,
    pub sender_password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Local path of the CV PDF attached to outgoing applications.
    pub cv_path: PathBuf,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            gemini_api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            sender_email: require_env("SENDER_EMAIL")?,
            sender_password: require_env("SENDER_PASSWORD")?,
            smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            smtp_port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse::<u16>()
                .context("SMTP_PORT must be a valid port number")?,
            cv_path: PathBuf::from(
                std::env::var("CV_PATH").unwrap_or_else(|_| "cv.pdf".to_string()),
            ),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
