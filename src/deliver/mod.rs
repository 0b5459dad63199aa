//! Delivery collaborator
//!
//! Best-effort, single-attempt email delivery. The core only sees the
//! [`Delivery`] trait; errors propagate, there is no retry and no status
//! callback.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::EmailConfig;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no recipients configured")]
    NoRecipients,

    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// One rendered report ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub from_name: String,
    pub from_email: String,
}

impl EmailMessage {
    /// Build a message addressed per the email config: the test list for
    /// test runs, otherwise the production list plus the test list.
    pub fn addressed(
        email: &EmailConfig,
        production_to: &[String],
        is_test: bool,
        subject: String,
        html_body: String,
    ) -> Self {
        let mut to = Vec::new();
        if !is_test {
            to.extend(production_to.iter().cloned());
        }
        to.extend(email.test_to.iter().cloned());
        Self {
            to,
            subject,
            html_body,
            from_name: email.from_name.clone(),
            from_email: email.from_email.clone(),
        }
    }
}

/// Performs delivery of a rendered report.
pub trait Delivery {
    fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError>;
}

/// SMTP relay delivery.
pub struct SmtpDelivery {
    relay: String,
}

impl SmtpDelivery {
    pub fn new(relay: &str) -> Self {
        Self {
            relay: relay.to_string(),
        }
    }
}

impl Delivery for SmtpDelivery {
    fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        if message.to.is_empty() {
            return Err(DeliveryError::NoRecipients);
        }

        let from: Mailbox =
            format!("{} <{}>", message.from_name, message.from_email).parse()?;
        let mut builder = Message::builder().from(from).subject(&message.subject);
        for recipient in &message.to {
            builder = builder.to(recipient.parse()?);
        }
        let email = builder
            .header(ContentType::TEXT_HTML)
            .body(message.html_body.clone())?;

        let transport = SmtpTransport::builder_dangerous(&self.relay).build();
        transport.send(&email)?;
        info!(recipients = message.to.len(), subject = %message.subject, "report sent");
        Ok(())
    }
}

/// Best-effort failure notification to the maintaining team, sent through
/// the same delivery channel. Never fails the caller; a notification
/// failure is only logged.
pub fn notify_failure(delivery: &dyn Delivery, email: &EmailConfig, context: &str) {
    let message = EmailMessage {
        to: email.failure_recipients().to_vec(),
        subject: "Error running GRACC report".to_string(),
        html_body: format!("<pre>{context}</pre>"),
        from_name: email.from_name.clone(),
        from_email: email.from_email.clone(),
    };
    if let Err(err) = delivery.send(&message) {
        warn!(error = %err, "failed to deliver failure notification");
    }
}
