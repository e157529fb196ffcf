use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ListStore, validate_members};
use crate::list::{ArchivedMessage, Definition, Subscription};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct State {
    /// Keyed by lower-cased list address.
    lists: BTreeMap<String, Definition>,
    /// Keyed by (list address, subscriber address).
    subscriptions: BTreeMap<(String, String), Subscription>,
    archive: Vec<(String, ArchivedMessage)>,
}

impl State {
    fn key_of(&self, address: &str) -> Option<String> {
        let key = address.to_lowercase();
        self.lists.contains_key(&key).then_some(key)
    }

    fn canonical(&self, address: &str) -> Result<String> {
        self.key_of(address)
            .and_then(|key| self.lists.get(&key))
            .map(|def| def.address.clone())
            .ok_or_else(|| Error::UnknownList(address.to_string()))
    }
}

/// In-memory list store.
///
/// Every operation runs under one lock, which makes multi-row changes atomic.
/// Clones share the same state. Intended for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListStore for MemoryStore {
    async fn lists(&self) -> Result<Vec<Definition>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.lists.values().cloned().collect())
    }

    async fn lookup_list(&self, address: &str) -> Result<Option<Definition>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.lists.get(&address.to_lowercase()).cloned())
    }

    async fn create_list(&self, def: &Definition) -> Result<()> {
        validate_members(def)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.key_of(&def.address).is_some() {
            return Err(Error::ListExists(def.address.clone()));
        }
        state.lists.insert(def.address.to_lowercase(), def.clone());
        Ok(())
    }

    async fn modify_list(&self, address: &str, def: &Definition) -> Result<()> {
        validate_members(def)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old = state.canonical(address)?;
        let old_key = old.to_lowercase();
        let new_key = def.address.to_lowercase();

        if new_key != old_key && state.lists.contains_key(&new_key) {
            return Err(Error::ListExists(def.address.clone()));
        }

        state.lists.remove(&old_key);
        state.lists.insert(new_key, def.clone());

        if old != def.address {
            let moved: Vec<_> = state
                .subscriptions
                .keys()
                .filter(|(list, _)| *list == old)
                .cloned()
                .collect();
            for key in moved {
                if let Some(mut sub) = state.subscriptions.remove(&key) {
                    sub.list.clone_from(&def.address);
                    state
                        .subscriptions
                        .insert((def.address.clone(), key.1), sub);
                }
            }
            for (list, _) in &mut state.archive {
                if *list == old {
                    list.clone_from(&def.address);
                }
            }
        }
        Ok(())
    }

    async fn delete_list(&self, address: &str) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let list = state.canonical(address)?;
        state.lists.remove(&list.to_lowercase());
        state.subscriptions.retain(|(l, _), _| *l != list);
        Ok(())
    }

    async fn subscribe(&self, list: &str, address: &str) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let list = state.canonical(list)?;
        let key = (list.clone(), address.to_lowercase());
        if state.subscriptions.contains_key(&key) {
            return Err(Error::AlreadySubscribed(list));
        }
        let sub = Subscription::new(list, key.1.clone());
        state.subscriptions.insert(key, sub);
        Ok(())
    }

    async fn unsubscribe(&self, list: &str, address: &str) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let key = (list.to_string(), address.to_lowercase());
        state
            .subscriptions
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| Error::NotSubscribed {
                list: key.0,
                address: key.1,
            })
    }

    async fn set_bounce(
        &self,
        list: &str,
        address: &str,
        bounces: u16,
        last_bounce: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let key = (list.to_string(), address.to_lowercase());
        let Some(sub) = state.subscriptions.get_mut(&key) else {
            return Err(Error::NotSubscribed {
                list: key.0,
                address: key.1,
            });
        };
        sub.bounces = bounces;
        sub.last_bounce = last_bounce;
        Ok(())
    }

    async fn subscribers(&self, list: &str) -> Result<Vec<Subscription>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .subscriptions
            .iter()
            .filter(|((l, _), _)| l == list)
            .map(|(_, sub)| sub.clone())
            .collect())
    }

    async fn subscription(&self, list: &str, address: &str) -> Result<Option<Subscription>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .subscriptions
            .get(&(list.to_string(), address.to_lowercase()))
            .cloned())
    }

    async fn archive(&self, list: &str, entry: &ArchivedMessage) -> Result<bool> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state
            .archive
            .iter()
            .any(|(l, archived)| l == list && archived.id == entry.id)
        {
            return Ok(false);
        }
        state.archive.push((list.to_string(), entry.clone()));
        Ok(true)
    }

    async fn archived(&self, list: &str) -> Result<Vec<ArchivedMessage>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .archive
            .iter()
            .filter(|(l, _)| l == list)
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}
