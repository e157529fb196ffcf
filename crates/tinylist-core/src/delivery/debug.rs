use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{Transport, TransportError};

/// A message captured by [`DebugTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Envelope sender (`MAIL FROM`).
    pub envelope_from: String,
    /// Envelope recipient (`RCPT TO`).
    pub envelope_to: String,
    /// The message as it would have gone out.
    pub message: Vec<u8>,
}

/// Transport that logs messages instead of sending them.
///
/// Clones share the captured messages.
#[derive(Debug, Clone, Default)]
pub struct DebugTransport {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl DebugTransport {
    /// Creates a transport with nothing captured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for DebugTransport {
    async fn send(
        &self,
        envelope_from: &str,
        envelope_to: &str,
        message: &[u8],
    ) -> Result<(), TransportError> {
        tracing::info!(
            from = %envelope_from,
            to = %envelope_to,
            "SENDING MESSAGE\n{}",
            String::from_utf8_lossy(message)
        );

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentMessage {
                envelope_from: envelope_from.to_string(),
                envelope_to: envelope_to.to_string(),
                message: message.to_vec(),
            });
        Ok(())
    }
}
