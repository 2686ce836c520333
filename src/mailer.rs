//! Digest delivery over SMTP.
//!
//! [`Mailer`] is the capability the weekly job depends on; [`SmtpMailer`] is
//! the production implementation on top of `lettre`'s async transport.
//!
//! One call is one delivery attempt. Failures are classified into
//! [`MailError`] variants and never retried here: the weekly job decides what
//! happens next.

use crate::config::MailSettings;
use crate::errors::MailError;
use crate::models::Document;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Send a composed document to one recipient.
pub trait Mailer {
    async fn send(&self, document: &Document, recipient: &str) -> Result<(), MailError>;
}

/// Port that uses implicit TLS instead of STARTTLS.
const SMTPS_PORT: u16 = 465;

#[derive(Debug, Clone)]
pub struct SmtpMailer {
    settings: MailSettings,
}

impl SmtpMailer {
    pub fn new(settings: MailSettings) -> Self {
        Self { settings }
    }

    fn transport(&self, user: &str, password: &str) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let builder = if self.settings.port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.host)
        }
        .map_err(|e| MailError::Connection(e.to_string()))?;

        Ok(builder
            .port(self.settings.port)
            .credentials(Credentials::new(user.to_string(), password.to_string()))
            .build())
    }
}

impl Mailer for SmtpMailer {
    #[instrument(level = "info", skip_all, fields(%recipient, subject = %document.subject))]
    async fn send(&self, document: &Document, recipient: &str) -> Result<(), MailError> {
        let (Some(user), Some(password)) = (&self.settings.user, &self.settings.password) else {
            return Err(MailError::Auth("sender credentials are not configured".to_string()));
        };

        let message = build_message(document, user, recipient)?;
        let transport = self.transport(user, password)?;

        let t0 = Instant::now();
        match transport.send(message).await {
            Ok(response) => {
                info!(
                    elapsed_ms = t0.elapsed().as_millis(),
                    code = %response.code(),
                    "Digest accepted by SMTP server"
                );
                Ok(())
            }
            Err(e) => {
                let code = e.status().and_then(|c| c.to_string().parse::<u16>().ok());
                let err = classify(code, e.to_string(), recipient);
                warn!(elapsed_ms = t0.elapsed().as_millis(), ?code, error = %err, "Digest delivery failed");
                Err(err)
            }
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Build the HTML message for `document`.
pub fn build_message(document: &Document, from: &str, to: &str) -> Result<Message, MailError> {
    Message::builder()
        .from(parse_mailbox(from)?)
        .to(parse_mailbox(to)?)
        .subject(document.subject.clone())
        .header(ContentType::TEXT_HTML)
        .body(document.html.clone())
        .map_err(|e| MailError::Build(e.to_string()))
}

/// Map an SMTP failure to a [`MailError`].
///
/// `code` is the server's reply code when the failure came from a reply;
/// transport-level failures (DNS, TLS, dropped connection) carry none.
pub fn classify(code: Option<u16>, detail: String, recipient: &str) -> MailError {
    match code {
        Some(530 | 534 | 535 | 538) => MailError::Auth(detail),
        Some(450 | 451 | 452 | 550 | 551 | 552 | 553 | 554) => MailError::RecipientRejected {
            recipient: recipient.to_string(),
            reason: detail,
        },
        _ => MailError::Connection(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use std::collections::BTreeMap;

    fn document() -> Document {
        Document {
            subject: "Infopiguła Podsumowanie Tygodnia - 2026-10-17".to_string(),
            html: "<html><body><h1>Test</h1></body></html>".to_string(),
            counts: BTreeMap::from([(Category::Polska, 0), (Category::Swiat, 0)]),
        }
    }

    #[test]
    fn test_build_message_is_html() {
        let message = build_message(&document(), "nadawca@example.com", "odbiorca@example.com").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("To: odbiorca@example.com"));
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let err = build_message(&document(), "nadawca@example.com", "not an address").unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress { .. }));
    }

    #[test]
    fn test_classify_auth_failure() {
        let err = classify(Some(535), "535 5.7.8 bad credentials".to_string(), "a@example.com");
        assert!(matches!(err, MailError::Auth(_)));
    }

    #[test]
    fn test_classify_recipient_rejected() {
        let err = classify(Some(550), "550 no such user".to_string(), "a@example.com");
        match err {
            MailError::RecipientRejected { recipient, .. } => assert_eq!(recipient, "a@example.com"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classify_without_reply_is_connection() {
        let err = classify(None, "connection refused".to_string(), "a@example.com");
        assert!(matches!(err, MailError::Connection(_)));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_as_auth() {
        let mailer = SmtpMailer::new(MailSettings {
            host: "localhost".to_string(),
            port: 2525,
            user: None,
            password: None,
            recipient: Some("a@example.com".to_string()),
        });

        let err = mailer.send(&document(), "a@example.com").await.unwrap_err();
        assert!(matches!(err, MailError::Auth(_)));
    }
}
