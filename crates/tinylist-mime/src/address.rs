//! Mailbox and address-list helpers.

use crate::error::{Error, Result};
use mailparse::MailAddr;
use std::fmt;

/// A single mailbox: optional display name plus address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name, if any.
    pub name: Option<String>,
    /// The `local@domain` address.
    pub address: String,
}

impl Mailbox {
    /// Parses the first mailbox of an address header value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not contain a mailbox.
    pub fn parse(input: &str) -> Result<Self> {
        parse_address_list(input)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidAddress {
                input: input.to_string(),
                reason: "no mailbox".to_string(),
            })
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// Parses an address list header value into mailboxes.
///
/// Groups are flattened into their members. An empty value yields an empty
/// list.
///
/// # Errors
///
/// Returns an error if the value is not a valid address list.
pub fn parse_address_list(input: &str) -> Result<Vec<Mailbox>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let parsed = mailparse::addrparse(input).map_err(|e| Error::InvalidAddress {
        input: input.to_string(),
        reason: e.to_string(),
    })?;

    let mut mailboxes = Vec::new();
    for addr in parsed.iter() {
        match addr {
            MailAddr::Single(info) => mailboxes.push(Mailbox {
                name: info.display_name.clone(),
                address: info.addr.clone(),
            }),
            MailAddr::Group(group) => {
                mailboxes.extend(group.addrs.iter().map(|info| Mailbox {
                    name: info.display_name.clone(),
                    address: info.addr.clone(),
                }));
            }
        }
    }

    if let Some(bad) = mailboxes.iter().find(|m| !is_valid_address(&m.address)) {
        return Err(Error::InvalidAddress {
            input: input.to_string(),
            reason: format!("{} is not a local@domain address", bad.address),
        });
    }

    Ok(mailboxes)
}

/// Checks that an address has exactly one `@` with non-empty parts.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !address.chars().any(|c| c.is_whitespace() || c.is_control())
        }
        None => false,
    }
}
