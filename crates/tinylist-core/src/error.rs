//! Error types for the core library.

use crate::delivery::{DeliveryError, TransportError};
use thiserror::Error;

/// Errors that can occur in core operations.
///
/// The policy variants carry the text that is sent back to the user in a
/// command reply.
#[derive(Debug, Error)]
pub enum Error {
    /// The inbound message could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] tinylist_mime::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Storage contract violated or storage state unusable.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No list matches the given address.
    #[error("{0} is not a valid mailing list")]
    UnknownList(String),

    /// The address is already subscribed.
    #[error("You are already subscribed to {0}")]
    AlreadySubscribed(String),

    /// The address has no subscription to the list.
    #[error("{address} is not subscribed to {list}")]
    NotSubscribed {
        /// List address.
        list: String,
        /// Subscriber address.
        address: String,
    },

    /// Only admins may change a locked list's membership.
    #[error("List {0} is locked, only admins can add subscribers")]
    ListLocked(String),

    /// A list with this address already exists.
    #[error("A list with address {0} already exists")]
    ListExists(String),

    /// Unsubscribe-from-everything found nothing to do.
    #[error("Unable to unsubscribe {0} from any list - no subscriptions found")]
    NoSubscriptions(String),

    /// The sender may not post to the list.
    #[error(
        "You are not an approved poster for this mailing list. Your message has not been delivered to {0}"
    )]
    NotAuthorized(String),

    /// Some recipients of a list could not be reached.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// A single send failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed email address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
