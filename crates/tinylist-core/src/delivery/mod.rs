//! Outbound mail: the transport capability and VERP list delivery.

mod debug;
mod smtp;
pub mod verp;

pub use debug::{DebugTransport, SentMessage};
pub use smtp::SmtpTransport;

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::bounce;
use crate::list::List;
use crate::{BotConfig, Result};

/// Hands one message to one envelope recipient.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `message` from `envelope_from` to `envelope_to`.
    async fn send(
        &self,
        envelope_from: &str,
        envelope_to: &str,
        message: &[u8],
    ) -> std::result::Result<(), TransportError>;
}

/// Builds the transport the configuration asks for.
#[must_use]
pub fn from_config(config: &BotConfig) -> Box<dyn Transport> {
    if config.debug {
        Box::new(DebugTransport::new())
    } else {
        Box::new(SmtpTransport::new(config.smtp.clone()))
    }
}

/// A single send that failed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The SMTP exchange failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] tinylist_smtp::Error),

    /// The exchange did not finish in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// An envelope address was rejected before sending.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Recipients of one list that could not be reached.
#[derive(Debug, Error)]
#[error(
    "Delivery to {list} failed for {} of {attempted} recipients: {}",
    .failures.len(),
    summarize(.failures)
)]
pub struct DeliveryError {
    /// List address.
    pub list: String,
    /// Number of recipients a send was attempted for.
    pub attempted: usize,
    /// Failed recipients with their errors, in send order.
    pub failures: Vec<(String, TransportError)>,
}

fn summarize(failures: &[(String, TransportError)]) -> String {
    let mut out = String::new();
    for (i, (recipient, err)) in failures.iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        let _ = write!(out, "{recipient} ({err})");
    }
    out
}

/// Recipients of a list post: active subscribers, then the list's bcc.
///
/// Subscribers inside their bounce suppression window at `now` are left out.
///
/// # Errors
///
/// Returns a storage error if the subscribers cannot be read.
pub async fn recipients(list: List<'_>, now: DateTime<Utc>) -> Result<Vec<String>> {
    let mut recipients: Vec<String> = list
        .subscribers()
        .await?
        .into_iter()
        .filter(|sub| {
            let suppressed = bounce::is_suppressed(sub, now);
            if suppressed {
                tracing::debug!(list = %list.address, subscriber = %sub.address, bounces = sub.bounces, "Skipping bouncing subscriber");
            }
            !suppressed
        })
        .map(|sub| sub.address)
        .collect();
    recipients.extend(list.bcc.iter().cloned());
    Ok(recipients)
}

/// Sends one copy of `message` per recipient of `list`, each with its own
/// envelope sender.
///
/// The recipient set is read once before the first send. A failed
/// recipient does not stop the others. Returns the number of copies sent.
///
/// # Errors
///
/// Returns `Error::Delivery` listing every failed recipient, or a storage
/// error if the recipients cannot be read.
pub async fn send_to_list(
    transport: &dyn Transport,
    list: List<'_>,
    message: &[u8],
    bounces_address: &str,
    now: DateTime<Utc>,
) -> Result<usize> {
    let recipients = recipients(list, now).await?;
    let mut failures = Vec::new();

    for recipient in &recipients {
        let sent = match verp::envelope_sender(bounces_address, &list.address, recipient) {
            Ok(envelope_from) => transport.send(&envelope_from, recipient, message).await,
            Err(err) => Err(err),
        };
        if let Err(err) = sent {
            tracing::warn!(list = %list.address, recipient = %recipient, error = %err, "Send failed");
            failures.push((recipient.clone(), err));
        }
    }

    if failures.is_empty() {
        Ok(recipients.len())
    } else {
        Err(DeliveryError {
            list: list.address.clone(),
            attempted: recipients.len(),
            failures,
        }
        .into())
    }
}
