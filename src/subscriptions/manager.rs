//! Copy-on-write subscription table.
//!
//! Readers take an `Arc` of the current list and drop the lock straight
//! away, so a publish pass iterates a frozen snapshot while writers swap in
//! new lists. Removed entries are handed back to the caller so that user
//! values they own are dropped outside the lock.

use crate::token::TokenId;
use crate::types::EventType;
use parking_lot::RwLock;
use std::sync::Arc;

use super::types::Subscription;

/// Stored subscription, keyed by its token.
pub(crate) type Entry = Arc<dyn Subscription>;

/// Point-in-time view of the table, in registration order.
pub(crate) type Snapshot = Arc<Vec<Entry>>;

pub(crate) struct SubscriptionTable {
    entries: RwLock<Snapshot>,
}

impl SubscriptionTable {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::with_capacity(capacity))),
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.entries.read())
    }

    pub(crate) fn insert(&self, entry: Entry) {
        let mut entries = self.entries.write();
        Arc::make_mut(&mut *entries).push(entry);
    }

    pub(crate) fn get(&self, id: TokenId) -> Option<Entry> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.token().id() == id)
            .cloned()
    }

    pub(crate) fn remove(&self, id: TokenId) -> Option<Entry> {
        self.remove_first(|entry| entry.token().id() == id)
    }

    /// Remove the first entry, in registration order, matching `pred`.
    pub(crate) fn remove_first<F>(&self, pred: F) -> Option<Entry>
    where
        F: Fn(&Entry) -> bool,
    {
        let mut entries = self.entries.write();
        let index = entries.iter().position(pred)?;
        Some(Arc::make_mut(&mut *entries).remove(index))
    }

    /// Remove every entry matching `pred`.
    pub(crate) fn remove_where<F>(&self, pred: F) -> Vec<Entry>
    where
        F: Fn(&Entry) -> bool,
    {
        let mut entries = self.entries.write();
        if !entries.iter().any(&pred) {
            return Vec::new();
        }

        let (removed, kept): (Vec<Entry>, Vec<Entry>) =
            entries.iter().cloned().partition(|entry| pred(entry));
        *entries = Arc::new(kept);
        removed
    }

    pub(crate) fn clear(&self) -> Snapshot {
        std::mem::replace(&mut *self.entries.write(), Arc::new(Vec::new()))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn count_for(&self, event_type: EventType) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.event_type() == event_type)
            .count()
    }
}
