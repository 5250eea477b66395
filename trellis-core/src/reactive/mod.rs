//! Reactive Primitives
//!
//! This module implements the core reactive system: reactive targets,
//! computed values, effects and watchers, tied together by a per-thread
//! runtime.
//!
//! # Concepts
//!
//! ## Targets
//!
//! A [`Reactive`] is a plain object or array whose reads are recorded as
//! dependencies of whatever computation is running, and whose writes
//! notify the computations that read the written location.
//!
//! ## Computed Values
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when read after one of its dependencies changed.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs whenever its
//! dependencies change. Re-runs are batched: any number of writes inside a
//! [`batch`] run each affected effect at most once.
//!
//! ## Watchers
//!
//! A [`Watch`] observes one key or one getter and receives `(new, old)`.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: the runtime keeps a stack of tracking
//! frames, and every read records its [`DepKey`] into the top frame. When
//! the computation finishes, the recorded keys replace its previous
//! dependency set in the registry.

mod computed;
mod context;
mod effect;
mod registry;
mod runtime;
mod subscriber;
mod target;
mod watch;

pub use computed::{computed, Computed, ComputedState};
pub use context::{ContextGuard, TrackingContext};
pub use effect::{effect, Cleanup, Effect, EffectOutput};
pub use registry::DepKey;
pub use runtime::{Runtime, MAX_FLUSH_ROUNDS};
pub use subscriber::{SubscriberId, SubscriberKind};
pub use target::{reactive, wrap, Reactive, TargetId, TargetKind};
pub use watch::{watch, watch_getter, Watch};

/// Run `f` without recording any of its reads into the running computation.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ContextGuard::untracked();
    f()
}

/// Run `f` with effect re-runs deferred until it returns.
///
/// Batches nest; queued effects run when the outermost batch closes.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::batch(f)
}
