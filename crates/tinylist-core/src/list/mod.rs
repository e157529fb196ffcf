//! Mailing lists: definitions, subscriptions and the runtime list view.

mod model;

pub use model::{ArchivedMessage, Definition, Subscription};

use crate::Result;
use crate::bounce;
use crate::store::ListStore;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::ops::Deref;
use tinylist_mime::ListIdentity;

/// A list definition bound to the store that owns its subscriptions.
#[derive(Clone, Copy)]
pub struct List<'a> {
    def: &'a Definition,
    store: &'a dyn ListStore,
}

impl<'a> List<'a> {
    /// Binds a definition to a store.
    #[must_use]
    pub const fn new(def: &'a Definition, store: &'a dyn ListStore) -> Self {
        Self { def, store }
    }

    /// Adds a subscriber.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadySubscribed` or a storage error.
    pub async fn subscribe(&self, address: &str) -> Result<()> {
        self.store.subscribe(&self.def.address, address).await
    }

    /// Removes a subscriber.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotSubscribed` or a storage error.
    pub async fn unsubscribe(&self, address: &str) -> Result<()> {
        self.store.unsubscribe(&self.def.address, address).await
    }

    /// Overwrites a subscriber's bounce state.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotSubscribed` or a storage error.
    pub async fn set_bounce(
        &self,
        address: &str,
        bounces: u16,
        last_bounce: DateTime<Utc>,
    ) -> Result<()> {
        self.store
            .set_bounce(&self.def.address, address, bounces, last_bounce)
            .await
    }

    /// Returns all subscriptions, ordered by address.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn subscribers(&self) -> Result<Vec<Subscription>> {
        self.store.subscribers(&self.def.address).await
    }

    /// Returns the subscription of an address, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn is_subscribed(&self, address: &str) -> Result<Option<Subscription>> {
        self.store.subscription(&self.def.address, address).await
    }

    /// Checks whether `sender` may post to this list.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the subscription lookup.
    pub async fn can_post(&self, sender: &str) -> Result<bool> {
        let subscribed = if self.def.subscribers_only {
            self.is_subscribed(sender).await?.is_some()
        } else {
            false
        };
        Ok(self.def.allows_poster(sender, subscribed))
    }

    /// Archives a redistributed message. Returns false if it was already
    /// archived.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn archive(&self, entry: &ArchivedMessage) -> Result<bool> {
        self.store.archive(&self.def.address, entry).await
    }

    /// The identity redistributed copies carry.
    #[must_use]
    pub fn identity(&self, command_address: &str) -> ListIdentity {
        ListIdentity {
            name: self.def.name.clone(),
            address: self.def.address.clone(),
            unsubscribe: (!self.def.locked).then(|| command_address.to_string()),
        }
    }

    /// Definition plus every subscriber and its bounce state, for admins.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn describe(&self, now: DateTime<Utc>) -> Result<String> {
        let mut out = format!("{}\nSubscribers:", self.def);
        for sub in self.subscribers().await? {
            let state = if bounce::is_suppressed(&sub, now) {
                "disabled, "
            } else {
                ""
            };
            let _ = write!(
                out,
                "\n  - {} ({state}{} bounces, last on {})",
                sub.address,
                sub.bounces,
                sub.last_bounce.to_rfc3339()
            );
        }
        Ok(out)
    }
}

impl Deref for List<'_> {
    type Target = Definition;

    fn deref(&self) -> &Self::Target {
        self.def
    }
}

impl std::fmt::Debug for List<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("List").field("def", self.def).finish_non_exhaustive()
    }
}
