//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: an
//! effect, a computed value or a watcher. The runtime stores one tagged
//! [`SubscriberRef`] per live subscriber and dispatches notifications by
//! matching on the variant.

use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::computed::ComputedNode;
use super::effect::EffectInner;
use super::watch::WatcherInner;

/// Unique identifier for a subscriber.
///
/// IDs are handed out in creation order, which is also the order in which
/// a batch flush runs pending subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// What kind of computation a subscriber is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    /// Eager side effect; re-runs when a dependency changes.
    Effect,
    /// Lazy cached value; marked dirty when a dependency changes.
    Computed,
    /// Explicit observer receiving `(new, old)`.
    Watcher,
}

/// The runtime's handle on a live subscriber.
///
/// Effects and watchers are owned by the runtime until they are stopped, so
/// that dropping the user's handle does not silently end them. Computed
/// values are owned by their handles and only referenced weakly.
#[derive(Clone)]
pub(crate) enum SubscriberRef {
    Effect(Rc<EffectInner>),
    Computed(Weak<dyn ComputedNode>),
    Watcher(Rc<WatcherInner>),
}

impl SubscriberRef {
    pub(crate) fn kind(&self) -> SubscriberKind {
        match self {
            SubscriberRef::Effect(_) => SubscriberKind::Effect,
            SubscriberRef::Computed(_) => SubscriberKind::Computed,
            SubscriberRef::Watcher(_) => SubscriberKind::Watcher,
        }
    }
}
