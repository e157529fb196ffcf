//! SMTP connection management with type-state pattern.

mod client;
mod stream;

pub use client::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded, SmtpConnection,
};
pub use stream::{SmtpStream, connect, connect_tls};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// Server capabilities from the EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if the server advertised AUTH at all.
    #[must_use]
    pub fn supports_auth(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Auth(_)))
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}
