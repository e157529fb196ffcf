//! SMTP command builder.

use crate::types::{Address, AuthMechanism};

/// SMTP command sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (SASL-IR)
        initial_response: Option<String>,
    },
    /// MAIL FROM - Start mail transaction with the envelope sender
    MailFrom {
        /// Envelope sender
        from: Address,
        /// BODY parameter (8BITMIME)
        body: Option<&'static str>,
        /// SIZE parameter
        size: Option<usize>,
    },
    /// RCPT TO - Add an envelope recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to bytes, including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response,
            } => match initial_response {
                Some(resp) => format!("AUTH {} {resp}", mechanism.as_str()),
                None => format!("AUTH {}", mechanism.as_str()),
            },
            Self::MailFrom { from, body, size } => {
                let mut line = format!("MAIL FROM:<{from}>");
                if let Some(body) = body {
                    line.push_str(" BODY=");
                    line.push_str(body);
                }
                if let Some(size) = size {
                    line.push_str(&format!(" SIZE={size}"));
                }
                line
            }
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Quit => "QUIT".to_string(),
        };

        let mut buf = line.into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns a loggable form of the command with credentials masked.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Auth { mechanism, .. } => format!("AUTH {} ****", mechanism.as_str()),
            other => String::from_utf8_lossy(&other.serialize())
                .trim_end()
                .to_string(),
        }
    }
}
