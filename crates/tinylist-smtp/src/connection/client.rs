//! Type-state SMTP client.

use super::{ServerInfo, SmtpStream};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use std::collections::HashSet;
use std::marker::PhantomData;

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns an error.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = read_reply(&mut stream).await?;
        if !greeting.is_success() {
            return Err(Error::smtp_error(
                greeting.code.as_u16(),
                greeting.message_text(),
            ));
        }

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            _state: PhantomData,
        })
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        self.server_info.extensions = self.send_ehlo(client_hostname).await?;
        Ok(self)
    }

    /// Upgrades the connection to TLS using STARTTLS and repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not supported or if the upgrade fails.
    pub async fn starttls(mut self, hostname: &str) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        self.expect_success(Command::StartTls).await?;
        self.stream = self.stream.upgrade_to_tls(hostname).await?;

        // Capabilities may differ once the channel is encrypted
        self.server_info.extensions = self.send_ehlo(hostname).await?;
        Ok(self)
    }

    /// Authenticates using the PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not offer AUTH or rejects the credentials.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        if !self.server_info.supports_auth() {
            return Err(Error::NotSupported("AUTH".into()));
        }

        // PLAIN response: \0username\0password
        let credentials = format!("\0{username}\0{password}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());

        self.expect_success(Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(encoded),
        })
        .await?;

        Ok(self.transition())
    }

    /// Starts a mail transaction without authentication.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(
        mut self,
        from: Address,
        message_size: Option<usize>,
    ) -> Result<Client<MailTransaction>> {
        self.start_transaction(from, message_size).await?;
        Ok(self.transition())
    }

    async fn send_ehlo(&mut self, client_hostname: &str) -> Result<HashSet<Extension>> {
        let reply = self
            .expect_success(Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?;

        // First line is the greeting, the rest are keywords
        Ok(reply
            .message
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect())
    }
}

impl Client<Authenticated> {
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(
        mut self,
        from: Address,
        message_size: Option<usize>,
    ) -> Result<Client<MailTransaction>> {
        self.start_transaction(from, message_size).await?;
        Ok(self.transition())
    }
}

impl Client<MailTransaction> {
    /// Adds the first recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Client<RecipientAdded>> {
        self.expect_success(Command::RcptTo { to }).await?;
        Ok(self.transition())
    }
}

impl Client<RecipientAdded> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Self> {
        self.expect_success(Command::RcptTo { to }).await?;
        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error if the DATA command fails.
    pub async fn data(mut self) -> Result<Client<Data>> {
        let reply = self.send_command(Command::Data).await?;

        if reply.code != ReplyCode::START_DATA {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        Ok(self.transition())
    }
}

impl Client<Data> {
    /// Sends the message content and completes the transaction.
    ///
    /// Line endings are normalized to CRLF, lines starting with `.` are
    /// dot-stuffed and the terminating `.` line is appended.
    ///
    /// # Errors
    ///
    /// Returns an error if sending the message fails or server rejects it.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<Connected>> {
        self.stream.write_all(&encode_data(message)).await?;

        let reply = read_reply(&mut self.stream).await?;
        if !reply.is_success() {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        Ok(self.transition())
    }
}

// Common implementation for all states
impl<S> Client<S> {
    fn transition<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            _state: PhantomData,
        }
    }

    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        tracing::trace!(command = %cmd.redacted(), "SMTP >");
        self.stream.write_all(&cmd.serialize()).await?;
        let reply = read_reply(&mut self.stream).await?;
        tracing::trace!(code = %reply.code, "SMTP <");
        Ok(reply)
    }

    async fn expect_success(&mut self, cmd: Command) -> Result<Reply> {
        let reply = self.send_command(cmd).await?;
        if !reply.is_success() {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }
        Ok(reply)
    }

    async fn start_transaction(&mut self, from: Address, message_size: Option<usize>) -> Result<()> {
        let limit = self.server_info.max_message_size().filter(|limit| *limit > 0);
        if let (Some(size), Some(limit)) = (message_size, limit)
            && size > limit
        {
            return Err(Error::MessageTooLarge { size, limit });
        }

        let size = message_size.filter(|_| {
            self.server_info
                .extensions
                .iter()
                .any(|ext| matches!(ext, Extension::Size(_)))
        });
        let body = self
            .server_info
            .supports(&Extension::EightBitMime)
            .then_some("8BITMIME");

        self.expect_success(Command::MailFrom { from, body, size })
            .await?;
        Ok(())
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(Command::Quit).await?;

        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        Ok(())
    }
}

async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        if line.is_empty() {
            continue;
        }

        let is_last = is_last_reply_line(&line);
        lines.push(line);

        if is_last {
            break;
        }
    }

    parse_reply(&lines)
}

/// Encodes a message for the DATA phase.
fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(message.len() + 16);
    let mut lines: Vec<&[u8]> = message.split(|&b| b == b'\n').collect();

    // A trailing newline would otherwise produce an extra empty line
    if lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }

    for line in lines {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            buf.push(b'.');
        }
        buf.extend_from_slice(line);
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(b".\r\n");
    buf
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const GREETING: &[u8] = b"220 mx.example.com ESMTP ready\r\n";

    #[test]
    fn test_encode_data_dot_stuffing() {
        let encoded = encode_data(b"Subject: x\n\n.hidden\r\nlast");
        assert_eq!(encoded, b"Subject: x\r\n\r\n..hidden\r\nlast\r\n.\r\n");
    }

    #[test]
    fn test_encode_data_trailing_newline() {
        assert_eq!(encode_data(b"body\r\n"), b"body\r\n.\r\n");
    }

    #[tokio::test]
    async fn test_full_transaction() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"EHLO lists.example.com\r\n")
            .read(b"250-mx.example.com\r\n250-8BITMIME\r\n250 SIZE 1000\r\n")
            .write(b"MAIL FROM:<bounces+x=example.com@example.com> BODY=8BITMIME SIZE=21\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<bob@example.org>\r\n")
            .read(b"250 OK\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"Subject: hi\r\n\r\nHello\r\n.\r\n")
            .read(b"250 queued\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n")
            .build();

        let client = Client::from_stream(SmtpStream::mock(mock)).await.unwrap();
        assert_eq!(client.server_info().hostname, "mx.example.com");

        let client = client.ehlo("lists.example.com").await.unwrap();
        assert_eq!(client.server_info().max_message_size(), Some(1000));

        let client = client
            .mail_from(
                Address::new("bounces+x=example.com@example.com").unwrap(),
                Some(21),
            )
            .await
            .unwrap();
        let client = client
            .rcpt_to(Address::new("bob@example.org").unwrap())
            .await
            .unwrap();
        let client = client.data().await.unwrap();
        let client = client
            .send_message(b"Subject: hi\r\n\r\nHello")
            .await
            .unwrap();
        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_plain() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"EHLO client\r\n")
            .read(b"250-mx.example.com\r\n250 AUTH PLAIN\r\n")
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"235 accepted\r\n")
            .build();

        let client = Client::from_stream(SmtpStream::mock(mock)).await.unwrap();
        let client = client.ehlo("client").await.unwrap();
        client.auth_plain("user", "pass").await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_requires_advertisement() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"EHLO client\r\n")
            .read(b"250 mx.example.com\r\n")
            .build();

        let client = Client::from_stream(SmtpStream::mock(mock)).await.unwrap();
        let client = client.ehlo("client").await.unwrap();
        let err = client.auth_plain("user", "pass").await.unwrap_err();
        assert!(matches!(err, Error::NotSupported(ref what) if what == "AUTH"));
    }

    #[tokio::test]
    async fn test_message_too_large_is_rejected_locally() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"EHLO client\r\n")
            .read(b"250-mx.example.com\r\n250 SIZE 10\r\n")
            .build();

        let client = Client::from_stream(SmtpStream::mock(mock)).await.unwrap();
        let client = client.ehlo("client").await.unwrap();
        let err = client
            .mail_from(Address::new("a@example.com").unwrap(), Some(11))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { size: 11, limit: 10 }));
    }

    #[tokio::test]
    async fn test_rejected_recipient() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"EHLO client\r\n")
            .read(b"250 mx.example.com\r\n")
            .write(b"MAIL FROM:<a@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<nobody@example.org>\r\n")
            .read(b"550 no such user\r\n")
            .build();

        let client = Client::from_stream(SmtpStream::mock(mock)).await.unwrap();
        let client = client.ehlo("client").await.unwrap();
        let client = client
            .mail_from(Address::new("a@example.com").unwrap(), Some(5))
            .await
            .unwrap();
        let err = client
            .rcpt_to(Address::new("nobody@example.org").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_rejected_greeting() {
        let mock = Builder::new().read(b"554 go away\r\n").build();
        let err = Client::from_stream(SmtpStream::mock(mock))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SmtpError { code: 554, .. }));
    }
}
