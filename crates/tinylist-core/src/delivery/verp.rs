//! Variable envelope return paths.
//!
//! Every copy of a list post leaves with its own envelope sender,
//! `bounces+list=example.com+bob=example.org@example.com`, so a bounce
//! names the exact list and subscriber that failed.

use super::TransportError;

/// Replaces the `@` of an address so it can sit inside a local part.
fn token(address: &str) -> String {
    address.replacen('@', "=", 1)
}

/// Reverses [`token`], splitting on the last `=`.
fn untoken(token: &str) -> Option<String> {
    let (local, domain) = token.rsplit_once('=')?;
    (!local.is_empty() && !domain.is_empty()).then(|| format!("{local}@{domain}"))
}

/// Builds the envelope sender for one recipient of one list.
///
/// # Errors
///
/// Returns `TransportError::InvalidAddress` if `bounces_address` has no `@`.
pub fn envelope_sender(
    bounces_address: &str,
    list: &str,
    recipient: &str,
) -> Result<String, TransportError> {
    let (local, domain) = bounces_address
        .split_once('@')
        .ok_or_else(|| TransportError::InvalidAddress(bounces_address.to_string()))?;
    Ok(format!("{local}+{}+{}@{domain}", token(list), token(recipient)))
}

/// A recipient address decoded as a possible bounce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BounceTarget {
    /// The address with every `+` extension removed.
    pub base: String,
    /// List the bounced copy was sent for.
    pub list: Option<String>,
    /// Subscriber the bounced copy was sent to.
    pub recipient: Option<String>,
}

impl BounceTarget {
    /// Decodes `address`. Returns `None` only if it has no `@`.
    ///
    /// Missing or malformed tokens leave `list`/`recipient` unset; it is up
    /// to the caller to decide whether `base` is the bounce address at all.
    #[must_use]
    pub fn parse(address: &str) -> Option<Self> {
        let (local, domain) = address.split_once('@')?;
        let mut parts = local.splitn(3, '+');
        let base = format!("{}@{domain}", parts.next().unwrap_or_default());
        Some(Self {
            base,
            list: parts.next().and_then(untoken),
            recipient: parts.next().and_then(untoken),
        })
    }

    /// Both the list and the subscriber, if the address carried them.
    #[must_use]
    pub fn resolved(&self) -> Option<(&str, &str)> {
        Some((self.list.as_deref()?, self.recipient.as_deref()?))
    }
}
