//! Low-level SMTP stream handling.

use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
    /// Scripted in-memory dialogue.
    #[cfg(test)]
    Mock(BufReader<tokio_test::io::Mock>),
}

impl SmtpStream {
    /// Reads a line from the stream, without the line terminator.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the server closed the connection.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = match self {
            Self::Tcp(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
            #[cfg(test)]
            Self::Mock(reader) => reader.read_line(&mut line).await?,
        };
        if read == 0 {
            return Err(Error::Protocol("Connection closed by server".into()));
        }
        Ok(line.trim_end().to_string())
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            #[cfg(test)]
            Self::Mock(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Upgrades a TCP stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("Already using TLS".into())),
            #[cfg(test)]
            Self::Mock(_) => return Err(Error::NotSupported("TLS on a mock stream".into())),
        };

        let tls_stream = tls_handshake(hostname, tcp_stream).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls_stream))))
    }

    /// Wraps a scripted mock for protocol tests.
    #[cfg(test)]
    pub(crate) fn mock(mock: tokio_test::io::Mock) -> Self {
        Self::Mock(BufReader::new(mock))
    }
}

/// Connects to an SMTP server over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let stream = TcpStream::connect((hostname, port)).await?;
    tracing::debug!(hostname, port, "SMTP connected");
    Ok(SmtpStream::Tcp(BufReader::new(stream)))
}

/// Connects to an SMTP server over TLS (implicit TLS on port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails.
pub async fn connect_tls(hostname: &str, port: u16) -> Result<SmtpStream> {
    let tcp_stream = TcpStream::connect((hostname, port)).await?;
    let tls_stream = tls_handshake(hostname, tcp_stream).await?;
    tracing::debug!(hostname, port, "SMTP connected over TLS");
    Ok(SmtpStream::Tls(Box::new(BufReader::new(tls_stream))))
}

async fn tls_handshake(
    hostname: &str,
    tcp_stream: TcpStream,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let connector = create_tls_connector();
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("Invalid hostname: {hostname}")))?;

    Ok(connector.connect(server_name, tcp_stream).await?)
}

/// Creates a TLS connector trusting the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
