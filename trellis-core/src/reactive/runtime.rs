//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects reactive targets,
//! computed values, effects and watchers. It owns the tracking context, the
//! dependency registry, the table of live subscribers and the batch frame.
//!
//! # How It Works
//!
//! 1. A computation runs inside a tracking frame; every reactive read
//!    records its key into the frame.
//!
//! 2. When the computation completes, the runtime swaps the recorded keys
//!    in as the subscriber's dependency set.
//!
//! 3. When a target's value changes, the runtime:
//!    a. Finds all subscribers of the written key
//!    b. Marks computed subscribers dirty and forwards the notification to
//!       whoever reads them
//!    c. Fires key watchers with `(new, old)`
//!    d. Queues effects and getter watchers in the pending set
//!
//! 4. When the outermost batch frame closes, the pending set is flushed in
//!    subscriber registration order. Work queued during the flush is picked
//!    up by the same flush loop, so re-entrant writes never recurse into a
//!    running effect.
//!
//! # Threading
//!
//! One runtime exists per thread. All handles are `Rc`-based and never
//! cross threads, so no locking is involved.

use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexSet;

use super::context::TrackingContext;
use super::registry::{DepKey, Registry};
use super::subscriber::SubscriberRef;
use super::SubscriberId;
use crate::Value;

/// Upper bound on flush rounds before the runtime gives up on a flush that
/// keeps re-queueing work.
pub const MAX_FLUSH_ROUNDS: usize = 10_000;

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

#[derive(Debug, Default)]
struct BatchFrame {
    depth: usize,
    pending: IndexSet<SubscriberId>,
    flushing: bool,
}

/// The per-thread reactive runtime.
///
/// All operations are associated functions acting on the current thread's
/// instance.
pub struct Runtime {
    context: RefCell<TrackingContext>,
    registry: RefCell<Registry>,
    subscribers: RefCell<HashMap<SubscriberId, SubscriberRef>>,
    batch: RefCell<BatchFrame>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            context: RefCell::new(TrackingContext::default()),
            registry: RefCell::new(Registry::default()),
            subscribers: RefCell::new(HashMap::new()),
            batch: RefCell::new(BatchFrame::default()),
        }
    }

    fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Like [`Runtime::with`], but tolerates thread teardown, where the
    /// runtime may already be gone while handles are still being dropped.
    fn try_with<R>(f: impl FnOnce(&Runtime) -> R) -> Option<R> {
        RUNTIME.try_with(f).ok()
    }

    // ------------------------------------------------------------------
    // Tracking context
    // ------------------------------------------------------------------

    pub(crate) fn push_frame(subscriber: Option<SubscriberId>) {
        Self::with(|rt| rt.context.borrow_mut().push(subscriber));
    }

    pub(crate) fn pop_frame() -> Option<(Option<SubscriberId>, IndexSet<DepKey>)> {
        Self::try_with(|rt| rt.context.borrow_mut().pop()).flatten()
    }

    /// Get the subscriber whose reads are currently recorded, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        Self::with(|rt| rt.context.borrow().current())
    }

    /// Check if reads are currently being recorded.
    pub fn is_tracking() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Record a read of `key` by the current subscriber.
    pub(crate) fn track(key: DepKey) {
        Self::with(|rt| rt.context.borrow_mut().track(key));
    }

    // ------------------------------------------------------------------
    // Subscriber table and registry
    // ------------------------------------------------------------------

    pub(crate) fn register(id: SubscriberId, subscriber: SubscriberRef) {
        tracing::trace!(?id, kind = ?subscriber.kind(), "registering subscriber");
        Self::with(|rt| rt.subscribers.borrow_mut().insert(id, subscriber));
    }

    /// Remove a subscriber and every subscription it owns.
    pub(crate) fn unregister(id: SubscriberId) {
        let removed = Self::try_with(|rt| {
            if let Ok(mut registry) = rt.registry.try_borrow_mut() {
                registry.clear(id);
            } else {
                tracing::warn!(?id, "registry busy; subscriber left for later pruning");
            }
            if let Ok(mut frame) = rt.batch.try_borrow_mut() {
                frame.pending.shift_remove(&id);
            }
            rt.subscribers
                .try_borrow_mut()
                .ok()
                .and_then(|mut table| table.remove(&id))
        })
        .flatten();

        // Dropped outside of any runtime borrow: the subscriber's closure
        // may own handles whose own `Drop` calls back into the runtime.
        drop(removed);
    }

    fn lookup(id: SubscriberId) -> Option<SubscriberRef> {
        Self::with(|rt| rt.subscribers.borrow().get(&id).cloned())
    }

    /// Subscribe `id` to a single fixed key, outside of any tracking frame.
    pub(crate) fn subscribe(key: DepKey, id: SubscriberId) {
        Self::with(|rt| rt.registry.borrow_mut().subscribe(key, id));
    }

    /// Replace the dependency set of `id` with the keys read in its last run.
    pub(crate) fn swap_dependencies(id: SubscriberId, dependencies: IndexSet<DepKey>) {
        Self::with(|rt| rt.registry.borrow_mut().swap(id, dependencies));
    }

    /// Number of keys `id` currently depends on.
    pub fn dependency_count(id: SubscriberId) -> usize {
        Self::with(|rt| rt.registry.borrow().dependency_count(id))
    }

    /// The keys `id` currently depends on, in first-read order.
    pub fn dependencies_of(id: SubscriberId) -> Vec<DepKey> {
        Self::with(|rt| rt.registry.borrow().dependencies_of(id))
    }

    /// Number of live effects, watchers and computed values on this thread.
    pub fn subscriber_count() -> usize {
        Self::with(|rt| rt.subscribers.borrow().len())
    }

    /// Number of keys with at least one subscriber on this thread.
    pub fn tracked_key_count() -> usize {
        Self::with(|rt| rt.registry.borrow().key_count())
    }

    // ------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------

    /// Notify every subscriber of `key`.
    ///
    /// `change` carries `(new, old)` for key watchers; it is `None` for
    /// synthetic keys.
    pub(crate) fn trigger(key: &DepKey, change: Option<(&Value, &Value)>) {
        let ids = Self::with(|rt| rt.registry.borrow().subscribers_of(key));
        if ids.is_empty() {
            return;
        }

        tracing::trace!(?key, subscribers = ids.len(), "notifying");

        Self::batch(|| {
            for id in ids {
                let Some(subscriber) = Self::lookup(id) else {
                    tracing::trace!(?id, "skipping unregistered subscriber");
                    continue;
                };

                match subscriber {
                    SubscriberRef::Effect(effect) => {
                        if !effect.is_disposed() {
                            Self::enqueue(id);
                        }
                    }
                    SubscriberRef::Computed(node) => {
                        if let Some(node) = node.upgrade() {
                            if node.mark_dirty() {
                                Self::trigger(&DepKey::Computed(id), None);
                            }
                        }
                    }
                    SubscriberRef::Watcher(watcher) => {
                        if watcher.is_getter() {
                            Self::enqueue(id);
                        } else if let Some((new, old)) = change {
                            watcher.fire(new, old);
                        }
                    }
                }
            }
        });
    }

    fn enqueue(id: SubscriberId) {
        Self::with(|rt| rt.batch.borrow_mut().pending.insert(id));
    }

    // ------------------------------------------------------------------
    // Batching
    // ------------------------------------------------------------------

    /// Run `f` inside a batch frame.
    ///
    /// Effects triggered inside the frame are deduplicated and run once
    /// when the outermost frame closes.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        Self::with(|rt| rt.batch.borrow_mut().depth += 1);
        let guard = BatchGuard;
        let result = f();
        drop(guard);
        Self::flush();
        result
    }

    /// Check if a batch frame is open.
    pub fn in_batch() -> bool {
        Self::with(|rt| rt.batch.borrow().depth > 0)
    }

    fn flush() {
        let started = Self::with(|rt| {
            let mut frame = rt.batch.borrow_mut();
            if frame.depth > 0 || frame.flushing || frame.pending.is_empty() {
                return false;
            }
            frame.flushing = true;
            true
        });
        if !started {
            return;
        }

        let _guard = FlushGuard;
        for round in 1.. {
            let mut ids: Vec<SubscriberId> =
                Self::with(|rt| rt.batch.borrow_mut().pending.drain(..).collect());
            if ids.is_empty() {
                break;
            }
            if round > MAX_FLUSH_ROUNDS {
                tracing::warn!(
                    dropped = ids.len(),
                    "flush exceeded {MAX_FLUSH_ROUNDS} rounds; abandoning pending work"
                );
                break;
            }

            // Registration order, independent of which key was written first.
            ids.sort_unstable();
            tracing::debug!(round, pending = ids.len(), "flushing");

            for id in ids {
                match Self::lookup(id) {
                    Some(SubscriberRef::Effect(effect)) => effect.run(),
                    Some(SubscriberRef::Watcher(watcher)) => watcher.run(),
                    Some(SubscriberRef::Computed(_)) | None => {}
                }
            }
        }
    }
}

/// Closes a batch frame, also on unwind.
struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        Runtime::try_with(|rt| {
            if let Ok(mut frame) = rt.batch.try_borrow_mut() {
                frame.depth = frame.depth.saturating_sub(1);
            }
        });
    }
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        Runtime::try_with(|rt| {
            if let Ok(mut frame) = rt.batch.try_borrow_mut() {
                frame.flushing = false;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, Reactive};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn batch_depth_nests() {
        assert!(!Runtime::in_batch());
        Runtime::batch(|| {
            assert!(Runtime::in_batch());
            Runtime::batch(|| assert!(Runtime::in_batch()));
            assert!(Runtime::in_batch());
        });
        assert!(!Runtime::in_batch());
    }

    #[test]
    fn batch_returns_closure_result() {
        assert_eq!(Runtime::batch(|| 7), 7);
    }

    #[test]
    fn stopped_effects_leave_no_bookkeeping() {
        let state = Reactive::object();
        state.set("a", 1);
        state.set("b", 2);

        let fx = {
            let state = state.clone();
            effect(move || {
                state.get("a");
                state.get("b");
            })
        };

        assert_eq!(Runtime::subscriber_count(), 1);
        assert_eq!(Runtime::tracked_key_count(), 2);

        fx.stop();
        assert_eq!(Runtime::subscriber_count(), 0);
        assert_eq!(Runtime::tracked_key_count(), 0);
    }

    #[test]
    fn writes_during_flush_are_drained_by_the_same_flush() {
        let state = Reactive::object();
        state.set("source", 0);
        state.set("mirror", 0);
        let mirror_runs = Rc::new(Cell::new(0));

        let _copy = {
            let state = state.clone();
            effect(move || {
                let value = state.get("source");
                state.set("mirror", value);
            })
        };
        let _observe = {
            let state = state.clone();
            let mirror_runs = mirror_runs.clone();
            effect(move || {
                state.get("mirror");
                mirror_runs.set(mirror_runs.get() + 1);
            })
        };

        state.set("source", 5);
        assert_eq!(state.peek("mirror").as_f64(), Some(5.0));
        assert_eq!(mirror_runs.get(), 2);
    }

    #[test]
    fn self_triggering_effect_converges() {
        let state = Reactive::object();
        state.set("n", 0);
        let runs = Rc::new(Cell::new(0));

        let _clamp = {
            let state = state.clone();
            let runs = runs.clone();
            effect(move || {
                runs.set(runs.get() + 1);
                let n = state.get("n").as_f64().unwrap_or(0.0);
                if n > 10.0 {
                    state.set("n", 10);
                }
            })
        };

        state.set("n", 50);
        assert_eq!(state.peek("n").as_f64(), Some(10.0));
        // initial run, the write of 50, then the clamped write of 10
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn runaway_flush_is_abandoned() {
        let state = Reactive::object();
        state.set("ping", 0);
        state.set("pong", 0);

        let ping = {
            let state = state.clone();
            effect(move || {
                let n = state.get("ping").as_f64().unwrap_or(0.0);
                state.set("pong", n + 1.0);
            })
        };
        // Each effect keeps writing what the other reads.
        let pong = {
            let state = state.clone();
            effect(move || {
                let n = state.get("pong").as_f64().unwrap_or(0.0);
                state.set("ping", n + 1.0);
            })
        };

        let (pending, flushing) = Runtime::with(|rt| {
            let frame = rt.batch.borrow();
            (frame.pending.len(), frame.flushing)
        });
        assert_eq!(pending, 0);
        assert!(!flushing);
        assert!(!Runtime::in_batch());
        assert!(ping.run_count() + pong.run_count() > MAX_FLUSH_ROUNDS);

        ping.stop();
        pong.stop();

        let runs = Rc::new(Cell::new(0));
        let _after = {
            let (state, runs) = (state.clone(), runs.clone());
            effect(move || {
                state.get("ping");
                runs.set(runs.get() + 1);
            })
        };
        state.set("ping", -1);
        assert_eq!(runs.get(), 2);
    }
}
