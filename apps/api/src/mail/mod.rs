//! Mail delivery — sends the reviewed application email over SMTP with the
//! CV PDF attached when one is present on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

pub mod handlers;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("could not assemble message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP failure: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// An outgoing application email, as reviewed by the user.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Delivery report returned to the caller.
#[derive(Debug, Clone)]
pub struct MailReceipt {
    /// File name of the attached CV, when one was found on disk.
    pub attachment: Option<String>,
}

/// Mail delivery seam. Implement this to swap backends without touching the
/// endpoint or handler code.
///
/// Carried in `AppState` as `Arc<dyn Mailer>`.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<MailReceipt, MailError>;
}

/// SMTP mailer over a STARTTLS relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: String,
    cv_path: PathBuf,
}

impl SmtpMailer {
    pub fn from_config(config: &Config) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.sender_email.clone(),
                config.sender_password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            sender: config.sender_email.clone(),
            cv_path: config.cv_path.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<MailReceipt, MailError> {
        let attachment = load_attachment(&self.cv_path).await;
        let receipt = MailReceipt {
            attachment: attachment.as_ref().map(|(name, _)| name.clone()),
        };

        let message = build_message(&self.sender, mail, attachment)?;
        self.transport.send(message).await?;

        info!(recipient = %mail.recipient, "application email sent");
        Ok(receipt)
    }
}

/// Reads the CV from disk. A missing or unreadable file downgrades to a
/// warning: the email still goes out, just without the attachment.
async fn load_attachment(path: &Path) -> Option<(String, Vec<u8>)> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "cv.pdf".to_string());
            Some((name, bytes))
        }
        Err(e) => {
            warn!("CV file not readable at {}: {e}", path.display());
            None
        }
    }
}

fn build_message(
    sender: &str,
    mail: &OutgoingMail,
    attachment: Option<(String, Vec<u8>)>,
) -> Result<Message, MailError> {
    let builder = Message::builder()
        .from(sender.parse::<Mailbox>()?)
        .to(mail.recipient.parse::<Mailbox>()?)
        .subject(mail.subject.clone());

    let body = SinglePart::builder()
        .header(ContentType::TEXT_PLAIN)
        .body(mail.body.clone());

    let message = match attachment {
        Some((name, bytes)) => {
            let pdf = ContentType::parse("application/pdf").expect("static MIME type");
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(body)
                    .singlepart(Attachment::new(name).body(bytes, pdf)),
            )?
        }
        None => builder.singlepart(body)?,
    };

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mail() -> OutgoingMail {
        OutgoingMail {
            recipient: "hr@acme.com".to_string(),
            subject: "Application for Rust Engineer".to_string(),
            body: "Dear hiring team, please find my CV attached.".to_string(),
        }
    }

    #[test]
    fn test_message_with_attachment_is_multipart_pdf() {
        let attachment = Some(("cv.pdf".to_string(), b"%PDF-1.4 fake".to_vec()));
        let message = build_message("me@sender.com", &sample_mail(), attachment).unwrap();

        let rendered = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(rendered.contains("To: hr@acme.com"));
        assert!(rendered.contains("Subject: Application for Rust Engineer"));
        assert!(rendered.contains("Content-Type: application/pdf"));
        assert!(rendered.contains("cv.pdf"));
    }

    #[test]
    fn test_message_without_attachment_is_plain_text() {
        let message = build_message("me@sender.com", &sample_mail(), None).unwrap();

        let rendered = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(rendered.contains("Dear hiring team"));
        assert!(!rendered.contains("application/pdf"));
    }

    #[test]
    fn test_invalid_recipient_is_an_address_error() {
        let mut mail = sample_mail();
        mail.recipient = "not-an-address".to_string();

        let err = build_message("me@sender.com", &mail, None).unwrap_err();
        assert!(matches!(err, MailError::Address(_)));
    }

    #[tokio::test]
    async fn test_load_attachment_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cv.pdf");
        std::fs::write(&path, b"%PDF-1.4 resume bytes").unwrap();

        let (name, bytes) = load_attachment(&path).await.unwrap();
        assert_eq!(name, "cv.pdf");
        assert_eq!(bytes, b"%PDF-1.4 resume bytes");
    }

    #[tokio::test]
    async fn test_load_attachment_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.pdf");

        assert!(load_attachment(&path).await.is_none());
    }
}
