//! List and subscription management shared by email commands and the CLI.

use chrono::Utc;
use tinylist_mime::is_valid_address;

use super::Bot;
use crate::bounce::MAX_BOUNCES;
use crate::list::{Definition, List};
use crate::{Error, Result};

/// A partial change to a list definition. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListUpdate {
    /// New address; renames the list and moves its subscriptions.
    pub address: Option<String>,
    /// New display name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New hidden flag.
    pub hidden: Option<bool>,
    /// New locked flag.
    pub locked: Option<bool>,
    /// New subscribers-only flag.
    pub subscribers_only: Option<bool>,
    /// Replacement poster allow-list.
    pub posters: Option<Vec<String>>,
    /// Replacement bcc addresses.
    pub bcc: Option<Vec<String>>,
}

impl ListUpdate {
    /// Returns `def` with this update applied.
    #[must_use]
    pub fn apply(&self, def: &Definition) -> Definition {
        Definition {
            address: self.address.clone().unwrap_or_else(|| def.address.clone()),
            name: self.name.clone().unwrap_or_else(|| def.name.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| def.description.clone()),
            hidden: self.hidden.unwrap_or(def.hidden),
            locked: self.locked.unwrap_or(def.locked),
            subscribers_only: self.subscribers_only.unwrap_or(def.subscribers_only),
            posters: self.posters.clone().unwrap_or_else(|| def.posters.clone()),
            bcc: self.bcc.clone().unwrap_or_else(|| def.bcc.clone()),
        }
    }
}

fn check_addresses(def: &Definition) -> Result<()> {
    std::iter::once(&def.address)
        .chain(&def.posters)
        .chain(&def.bcc)
        .find(|address| !is_valid_address(address))
        .map_or(Ok(()), |bad| Err(Error::InvalidAddress(bad.clone())))
}

fn check_subscriber(address: &str) -> Result<String> {
    if is_valid_address(address) {
        Ok(address.to_lowercase())
    } else {
        Err(Error::InvalidAddress(address.to_string()))
    }
}

impl Bot {
    /// All lists ordered by address, hidden ones only if asked for.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn lists(&self, include_hidden: bool) -> Result<Vec<Definition>> {
        let mut lists = self.store.lists().await?;
        if !include_hidden {
            lists.retain(|def| !def.hidden);
        }
        Ok(lists)
    }

    /// Finds a list by full address or, for a key without `@`, by the
    /// local part of its address.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn lookup_list(&self, key: &str) -> Result<Option<Definition>> {
        if key.contains('@') {
            return self.store.lookup_list(key).await;
        }
        Ok(self
            .store
            .lists()
            .await?
            .into_iter()
            .find(|def| def.local_part().eq_ignore_ascii_case(key)))
    }

    async fn resolve(&self, key: &str) -> Result<Definition> {
        self.lookup_list(key)
            .await?
            .ok_or_else(|| Error::UnknownList(key.to_string()))
    }

    /// Creates a list.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAddress` for a malformed list, poster or bcc
    /// address, `Error::ListExists` if the address is taken, or a storage
    /// error.
    pub async fn create_list(&self, def: Definition) -> Result<Definition> {
        check_addresses(&def)?;
        if let Some(existing) = self.store.lookup_list(&def.address).await? {
            return Err(Error::ListExists(existing.address));
        }
        self.store.create_list(&def).await?;
        tracing::info!(list = %def.address, "LIST_CREATED");
        Ok(def)
    }

    /// Applies a partial update, renaming the list if the update carries
    /// a new address. Returns the new definition.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownList`, `Error::InvalidAddress`,
    /// `Error::ListExists` when renaming onto another list, or a storage
    /// error.
    pub async fn modify_list(&self, key: &str, update: &ListUpdate) -> Result<Definition> {
        let current = self.resolve(key).await?;
        let def = update.apply(&current);
        check_addresses(&def)?;
        self.store.modify_list(&current.address, &def).await?;
        tracing::info!(list = %current.address, address = %def.address, "LIST_MODIFIED");
        Ok(def)
    }

    /// Deletes a list and its subscriptions. Returns the removed definition.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownList` or a storage error.
    pub async fn delete_list(&self, key: &str) -> Result<Definition> {
        let def = self.resolve(key).await?;
        self.store.delete_list(&def.address).await?;
        tracing::info!(list = %def.address, "LIST_DELETED");
        Ok(def)
    }

    /// The definition followed by every subscriber and its bounce state.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn describe_list(&self, def: &Definition) -> Result<String> {
        List::new(def, self.store.as_ref())
            .describe(Utc::now())
            .await
    }

    /// Subscribes `address` to the list named by `key`.
    ///
    /// Without `admin`, a locked list refuses new subscribers.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownList`, `Error::AlreadySubscribed`,
    /// `Error::ListLocked`, `Error::InvalidAddress` or a storage error.
    pub async fn subscribe(&self, address: &str, key: &str, admin: bool) -> Result<Definition> {
        let address = check_subscriber(address)?;
        let def = self.resolve(key).await?;
        let list = List::new(&def, self.store.as_ref());

        if list.is_subscribed(&address).await?.is_some() {
            return Err(Error::AlreadySubscribed(def.address.clone()));
        }
        if def.locked && !admin {
            return Err(Error::ListLocked(def.address.clone()));
        }

        list.subscribe(&address).await?;
        tracing::info!(user = %address, list = %def.address, "SUBSCRIPTION_CREATED");
        Ok(def)
    }

    /// Unsubscribes `address` from the list named by `key`.
    ///
    /// Without `admin`, leaving a locked list keeps the subscription but
    /// sets its bounce counter to the maximum so nothing is delivered.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownList`, `Error::NotSubscribed`,
    /// `Error::InvalidAddress` or a storage error.
    pub async fn unsubscribe(&self, address: &str, key: &str, admin: bool) -> Result<Definition> {
        let address = check_subscriber(address)?;
        let def = self.resolve(key).await?;
        let list = List::new(&def, self.store.as_ref());

        if list.is_subscribed(&address).await?.is_none() {
            return Err(Error::NotSubscribed {
                list: def.address.clone(),
                address,
            });
        }
        remove(list, &address, admin).await?;
        Ok(def)
    }

    /// Unsubscribes `address` from every list it is subscribed to.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSubscriptions` if there was nothing to leave,
    /// `Error::InvalidAddress` or a storage error.
    pub async fn unsubscribe_all(&self, address: &str, admin: bool) -> Result<Vec<Definition>> {
        let address = check_subscriber(address)?;
        let mut left = Vec::new();

        for def in self.store.lists().await? {
            let list = List::new(&def, self.store.as_ref());
            if list.is_subscribed(&address).await?.is_none() {
                continue;
            }
            remove(list, &address, admin).await?;
            left.push(def);
        }

        if left.is_empty() {
            return Err(Error::NoSubscriptions(address));
        }
        Ok(left)
    }
}

async fn remove(list: List<'_>, address: &str, admin: bool) -> Result<()> {
    if list.locked && !admin {
        list.set_bounce(address, MAX_BOUNCES, Utc::now()).await?;
        tracing::info!(user = %address, list = %list.address, "UNSUBSCRIPTION_SET_BOUNCE");
    } else {
        list.unsubscribe(address).await?;
        tracing::info!(user = %address, list = %list.address, "SUBSCRIPTION_REMOVED");
    }
    Ok(())
}
