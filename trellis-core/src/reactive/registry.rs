//! Dependency Registry
//!
//! Maps dependency keys to the subscribers that currently read them, and
//! each subscriber to the keys it owns. Both directions are kept so that a
//! subscriber's stale keys can be dropped in one pass when it re-runs or is
//! stopped, without scanning the whole table.

use std::collections::HashMap;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::target::TargetId;
use super::SubscriberId;

/// A trackable location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named property of an object target.
    Prop(TargetId, String),
    /// An element of an array target.
    Index(TargetId, usize),
    /// The key set of an object or the length/shape of an array.
    Iterate(TargetId),
    /// The output of a computed value.
    Computed(SubscriberId),
}

/// Subscriber snapshot taken before notifying, so that subscribers may
/// re-subscribe while the notification loop runs.
pub(crate) type SubscriberList = SmallVec<[SubscriberId; 8]>;

#[derive(Debug, Default)]
pub(crate) struct Registry {
    subscribers: HashMap<DepKey, IndexSet<SubscriberId>>,
    dependencies: HashMap<SubscriberId, IndexSet<DepKey>>,
}

impl Registry {
    /// Subscribe `id` to `key`. Subscribing twice is a no-op and keeps the
    /// original registration position.
    pub(crate) fn subscribe(&mut self, key: DepKey, id: SubscriberId) -> bool {
        let added = self.subscribers.entry(key.clone()).or_default().insert(id);
        self.dependencies.entry(id).or_default().insert(key);
        added
    }

    fn unsubscribe(&mut self, key: &DepKey, id: SubscriberId) {
        if let Some(set) = self.subscribers.get_mut(key) {
            set.shift_remove(&id);
            if set.is_empty() {
                self.subscribers.remove(key);
            }
        }
    }

    /// Replace the dependency set of `id` with `next`.
    ///
    /// Keys present in both sets keep their position in the per-key
    /// subscriber order; stale keys are unsubscribed and new keys appended.
    pub(crate) fn swap(&mut self, id: SubscriberId, next: IndexSet<DepKey>) {
        let prev = self.dependencies.remove(&id).unwrap_or_default();

        for key in prev.iter().filter(|key| !next.contains(*key)) {
            self.unsubscribe(key, id);
        }
        for key in next.iter().filter(|key| !prev.contains(*key)) {
            self.subscribers.entry(key.clone()).or_default().insert(id);
        }

        if !next.is_empty() {
            self.dependencies.insert(id, next);
        }
    }

    /// Drop every subscription owned by `id`.
    pub(crate) fn clear(&mut self, id: SubscriberId) {
        if let Some(prev) = self.dependencies.remove(&id) {
            for key in &prev {
                self.unsubscribe(key, id);
            }
        }
    }

    pub(crate) fn subscribers_of(&self, key: &DepKey) -> SubscriberList {
        self.subscribers
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn dependencies_of(&self, id: SubscriberId) -> Vec<DepKey> {
        self.dependencies
            .get(&id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn dependency_count(&self, id: SubscriberId) -> usize {
        self.dependencies.get(&id).map_or(0, IndexSet::len)
    }

    /// Number of keys with at least one subscriber.
    pub(crate) fn key_count(&self) -> usize {
        self.subscribers.len()
    }
}
