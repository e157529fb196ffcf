//! Bot configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tinylist_mime::is_valid_address;

/// Security/encryption mode for the outbound SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// Plain text only.
    None,
    /// STARTTLS when the server offers it, plain text otherwise.
    #[default]
    Opportunistic,
    /// STARTTLS required.
    StartTls,
    /// Implicit TLS (connect directly with TLS).
    Tls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Opportunistic => "STARTTLS if offered",
            Self::StartTls => "STARTTLS",
            Self::Tls => "SSL/TLS",
        }
    }
}

/// SMTP relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Username for AUTH PLAIN; empty disables authentication.
    pub username: String,
    /// Password for AUTH PLAIN.
    pub password: String,
    /// Name sent in EHLO.
    pub helo: String,
    /// Bound on one complete send, in seconds.
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            security: Security::default(),
            username: String::new(),
            password: String::new(),
            helo: "localhost".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Everything the bot needs to know about its own identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Address that receives commands and sends replies.
    pub command_address: String,
    /// Base address for VERP envelope senders.
    pub bounces_address: String,
    /// Senders whose commands run with admin rights.
    #[serde(default)]
    pub admin_addresses: Vec<String>,
    /// Capture outbound mail instead of sending it.
    #[serde(default)]
    pub debug: bool,
    /// Outbound relay.
    #[serde(default)]
    pub smtp: SmtpConfig,
}

impl BotConfig {
    /// Checks the addresses the bot cannot work without.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_address(&self.command_address) {
            return Err(Error::Config(format!(
                "command_address {:?} is not a valid email address",
                self.command_address
            )));
        }
        if !is_valid_address(&self.bounces_address) {
            return Err(Error::Config(format!(
                "bounces_address {:?} is not a valid email address",
                self.bounces_address
            )));
        }
        if let Some(bad) = self
            .admin_addresses
            .iter()
            .find(|address| !is_valid_address(address))
        {
            return Err(Error::Config(format!(
                "admin address {bad:?} is not a valid email address"
            )));
        }
        if self.smtp.timeout_secs == 0 {
            return Err(Error::Config("smtp.timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Checks whether an address belongs to an admin.
    #[must_use]
    pub fn is_admin(&self, address: &str) -> bool {
        self.admin_addresses
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(address))
    }
}
