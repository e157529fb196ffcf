//! List and subscription model types.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;

/// Configuration of one mailing list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Definition {
    /// List address (unique key).
    pub address: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Left out of the public `lists` reply.
    pub hidden: bool,
    /// Membership changes restricted to admins.
    pub locked: bool,
    /// Posting restricted to subscribers.
    pub subscribers_only: bool,
    /// Allow-list of posters; empty allows everyone.
    pub posters: Vec<String>,
    /// Addresses that receive every post.
    pub bcc: Vec<String>,
}

impl Definition {
    /// Creates a definition with only address and name set.
    #[must_use]
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Posting policy for a sender whose subscription state is known.
    ///
    /// Both gates must pass: a subscribers-only list requires a subscription,
    /// and a non-empty poster list requires membership in it.
    #[must_use]
    pub fn allows_poster(&self, sender: &str, subscribed: bool) -> bool {
        if self.subscribers_only && !subscribed {
            return false;
        }
        self.posters.is_empty()
            || self
                .posters
                .iter()
                .any(|poster| poster.eq_ignore_ascii_case(sender))
    }

    /// Returns the part of the address before the `@`.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.address
            .split_once('@')
            .map_or(self.address.as_str(), |(local, _)| local)
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}>: {}\nHidden: {} | Locked: {} | Subscribers only: {}\nPosters: {}\nBcc: {}",
            self.name,
            self.address,
            self.description,
            self.hidden,
            self.locked,
            self.subscribers_only,
            self.posters.join(", "),
            self.bcc.join(", ")
        )
    }
}

/// One address subscribed to one list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// List address.
    pub list: String,
    /// Subscriber address (lower-case).
    pub address: String,
    /// Consecutive bounces, saturating.
    pub bounces: u16,
    /// Time of the most recent bounce.
    pub last_bounce: DateTime<Utc>,
}

impl Subscription {
    /// Creates a fresh subscription without bounces.
    #[must_use]
    pub fn new(list: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            list: list.into(),
            address: address.into(),
            bounces: 0,
            last_bounce: DateTime::default(),
        }
    }
}

/// A redistributed message kept for the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedMessage {
    /// Hex SHA-256 of the stored bytes.
    pub id: String,
    /// Sender address.
    pub sender: String,
    /// Subject line.
    pub subject: String,
    /// Arrival time.
    pub received: DateTime<Utc>,
    /// The serialized message.
    pub message: Vec<u8>,
}

impl ArchivedMessage {
    /// Creates an archive entry, deriving the id from the content.
    #[must_use]
    pub fn new(
        message: Vec<u8>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        received: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("{:x}", Sha256::digest(&message)),
            sender: sender.into(),
            subject: subject.into(),
            received,
            message,
        }
    }
}
