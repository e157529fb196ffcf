//! List registry storage.
//!
//! [`ListStore`] is the only way the bot touches persisted state. Every
//! backend honours the same contract:
//!
//! - list addresses are unique, compared case-insensitively
//! - subscriber addresses are stored lower-cased, unique per list
//! - create, modify and delete change all related rows or none
//! - renaming a list carries its subscriptions and archive along
//! - `unsubscribe`/`set_bounce` on a missing subscription is
//!   `Error::NotSubscribed`

mod memory;
mod sql;

pub use memory::MemoryStore;
pub use sql::{MySqlStore, SqliteStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::list::{ArchivedMessage, Definition, Subscription};
use crate::{Error, Result};

/// Storage capability for list definitions and subscriptions.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// All list definitions, ordered by address.
    async fn lists(&self) -> Result<Vec<Definition>>;

    /// Finds a list by address, ignoring case.
    async fn lookup_list(&self, address: &str) -> Result<Option<Definition>>;

    /// Creates a list with its posters and bcc addresses.
    ///
    /// Fails with `Error::ListExists` if the address is taken.
    async fn create_list(&self, def: &Definition) -> Result<()>;

    /// Replaces the definition of the list at `address`.
    ///
    /// If `def.address` differs, the list is renamed. Fails with
    /// `Error::UnknownList` or, when renaming onto another list,
    /// `Error::ListExists`.
    async fn modify_list(&self, address: &str, def: &Definition) -> Result<()>;

    /// Deletes a list with its subscriptions, posters and bcc addresses.
    /// The archive is kept.
    async fn delete_list(&self, address: &str) -> Result<()>;

    /// Subscribes an address; `Error::AlreadySubscribed` if present.
    async fn subscribe(&self, list: &str, address: &str) -> Result<()>;

    /// Removes a subscription.
    async fn unsubscribe(&self, list: &str, address: &str) -> Result<()>;

    /// Overwrites the bounce state of a subscription.
    async fn set_bounce(
        &self,
        list: &str,
        address: &str,
        bounces: u16,
        last_bounce: DateTime<Utc>,
    ) -> Result<()>;

    /// Subscriptions of a list, ordered by subscriber address.
    async fn subscribers(&self, list: &str) -> Result<Vec<Subscription>>;

    /// The subscription of one address to one list.
    async fn subscription(&self, list: &str, address: &str) -> Result<Option<Subscription>>;

    /// Stores an archived message; returns false if the id already exists
    /// for this list.
    async fn archive(&self, list: &str, entry: &ArchivedMessage) -> Result<bool>;

    /// Archived messages of a list, oldest first.
    async fn archived(&self, list: &str) -> Result<Vec<ArchivedMessage>>;
}

/// Rejects a definition that names the same poster or bcc address twice.
pub(crate) fn validate_members(def: &Definition) -> Result<()> {
    for (what, addresses) in [("poster", &def.posters), ("bcc", &def.bcc)] {
        for (i, address) in addresses.iter().enumerate() {
            if addresses[..i]
                .iter()
                .any(|other| other.eq_ignore_ascii_case(address))
            {
                return Err(Error::Storage(format!(
                    "duplicate {what} {address} for list {}",
                    def.address
                )));
            }
        }
    }
    Ok(())
}
