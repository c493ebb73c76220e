//! Email delivery collaborator.
//!
//! Authentication hands a recipient and a rendered message to a [`Mailer`]
//! and treats the outcome per flow: registration swallows failures, resend
//! and forgot-password surface them. Transport itself lives behind the
//! trait: [`LogMailer`] writes deliveries to the log for development, and
//! [`MemoryMailer`] captures them (or fails on demand) for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::{AppError, Result};

pub mod templates;

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

/// Delivery boundary for outbound mail.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers `message` to `to`. An error means the message did not go
    /// out; the caller decides whether that is fatal for its flow.
    async fn deliver(&self, to: &str, message: &EmailMessage) -> Result<()>;
}

/// Development transport: writes each delivery to the log. Message bodies
/// carry raw secrets, so they only appear at debug level.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, to: &str, message: &EmailMessage) -> Result<()> {
        tracing::info!(to, subject = %message.subject, "email delivery");
        tracing::debug!(body = %message.body, "email body");
        Ok(())
    }
}

/// One message captured by [`MemoryMailer`].
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Capturing transport for tests: records every delivery and can be
/// switched into a failing mode.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<SentEmail>>,
    failing: AtomicBool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent deliveries fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of everything delivered so far.
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().clone()
    }

    /// Most recent delivery to `to`, if any.
    pub fn last_to(&self, to: &str) -> Option<SentEmail> {
        self.sent.lock().iter().rev().find(|m| m.to == to).cloned()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn deliver(&self, to: &str, message: &EmailMessage) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::DeliveryFailed(
                "mail transport unavailable".to_string(),
            ));
        }
        self.sent.lock().push(SentEmail {
            to: to.to_string(),
            subject: message.subject.clone(),
            body: message.body.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_mailer_captures_deliveries() {
        let mailer = MemoryMailer::new();
        let message = EmailMessage {
            subject: "Hello".to_string(),
            body: "World".to_string(),
        };

        mailer
            .deliver("jane@example.com", &message)
            .await
            .expect("delivery should succeed");

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jane@example.com");
        assert_eq!(sent[0].subject, "Hello");
        assert!(mailer.last_to("jane@example.com").is_some());
        assert!(mailer.last_to("other@example.com").is_none());
    }

    #[tokio::test]
    async fn memory_mailer_failure_mode_records_nothing() {
        let mailer = MemoryMailer::new();
        mailer.set_failing(true);

        let message = EmailMessage {
            subject: "Hello".to_string(),
            body: "World".to_string(),
        };
        let result = mailer.deliver("jane@example.com", &message).await;

        assert!(matches!(result, Err(AppError::DeliveryFailed(_))));
        assert!(mailer.sent().is_empty(), "failed delivery leaves no record");

        mailer.set_failing(false);
        mailer
            .deliver("jane@example.com", &message)
            .await
            .expect("delivery should succeed after recovery");
        assert_eq!(mailer.sent().len(), 1);
    }
}
