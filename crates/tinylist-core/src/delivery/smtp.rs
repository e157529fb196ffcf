//! SMTP transport for list mail.
//!
//! Opens one connection per message using the `tinylist-smtp` client.

use std::time::Duration;

use async_trait::async_trait;
use tinylist_smtp::connection::{connect, connect_tls};
use tinylist_smtp::{Address, Authenticated, Client, Connected, ServerInfo, SmtpConnection};

use super::{Transport, TransportError};
use crate::config::{Security, SmtpConfig};

/// A greeted, possibly encrypted and authenticated connection.
enum Session {
    Anonymous(Client<Connected>),
    Authenticated(Client<Authenticated>),
}

impl Session {
    fn server_info(&self) -> &ServerInfo {
        match self {
            Self::Anonymous(client) => client.server_info(),
            Self::Authenticated(client) => client.server_info(),
        }
    }

    async fn quit(self) -> tinylist_smtp::Result<()> {
        match self {
            Self::Anonymous(client) => client.quit().await,
            Self::Authenticated(client) => client.quit().await,
        }
    }
}

/// Sends mail through the configured SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    config: SmtpConfig,
}

impl SmtpTransport {
    /// Creates a transport for the given relay.
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Connects, greets, upgrades and authenticates as configured, then
    /// quits. Returns what the server advertised.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails or the exchange times out.
    pub async fn check(&self) -> Result<ServerInfo, TransportError> {
        let timeout = self.timeout();
        tokio::time::timeout(timeout, async {
            let session = self.open().await?;
            let info = session.server_info().clone();
            session.quit().await?;
            Ok::<_, TransportError>(info)
        })
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn open(&self) -> Result<Session, TransportError> {
        let config = &self.config;

        let stream = match config.security {
            Security::Tls => connect_tls(&config.host, config.port).await?,
            Security::None | Security::Opportunistic | Security::StartTls => {
                connect(&config.host, config.port).await?
            }
        };

        let client = Client::from_stream(stream).await?;
        let client = client.ehlo(&config.helo).await?;

        let client = match config.security {
            Security::StartTls => client.starttls(&config.host).await?,
            Security::Opportunistic if client.server_info().supports_starttls() => {
                client.starttls(&config.host).await?
            }
            Security::None | Security::Opportunistic | Security::Tls => client,
        };

        if config.username.is_empty() {
            Ok(Session::Anonymous(client))
        } else {
            let client = client
                .auth_plain(&config.username, &config.password)
                .await?;
            Ok(Session::Authenticated(client))
        }
    }

    async fn deliver(
        &self,
        from: Address,
        to: Address,
        message: &[u8],
    ) -> Result<(), TransportError> {
        let size = Some(message.len());
        let client = match self.open().await? {
            Session::Anonymous(client) => client.mail_from(from, size).await?,
            Session::Authenticated(client) => client.mail_from(from, size).await?,
        };

        let client = client.rcpt_to(to).await?;
        let client = client.data().await?;
        let client = client.send_message(message).await?;
        client.quit().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(
        &self,
        envelope_from: &str,
        envelope_to: &str,
        message: &[u8],
    ) -> Result<(), TransportError> {
        let from = Address::new(envelope_from)
            .map_err(|_| TransportError::InvalidAddress(envelope_from.to_string()))?;
        let to = Address::new(envelope_to)
            .map_err(|_| TransportError::InvalidAddress(envelope_to.to_string()))?;

        let timeout = self.timeout();
        tokio::time::timeout(timeout, self.deliver(from, to, message))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        tracing::debug!(
            host = %self.config.host,
            from = %envelope_from,
            to = %envelope_to,
            "Message handed to relay"
        );
        Ok(())
    }
}
