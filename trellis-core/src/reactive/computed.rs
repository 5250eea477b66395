//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computed Values Work
//!
//! 1. On first access, the getter runs in its own tracking frame and the
//!    result is cached.
//!
//! 2. While clean, further reads return the cached value.
//!
//! 3. When a dependency changes, the value is marked dirty and the change
//!    is forwarded to whoever reads it, through the synthetic
//!    [`DepKey::Computed`] key. Nothing is recomputed at that point.
//!
//! 4. The next read recomputes, re-collects dependencies and marks the
//!    value clean again.
//!
//! A value that is never read again stays dirty and costs nothing. Because
//! a dirty value does not forward further changes, any number of writes
//! between two reads notify downstream subscribers once.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::ContextGuard;
use super::registry::DepKey;
use super::runtime::Runtime;
use super::subscriber::SubscriberRef;
use super::SubscriberId;

/// Dirty state for a computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,
    /// Never computed, or a dependency changed since the last computation.
    Dirty,
}

/// Type-erased view the runtime uses to invalidate a computed value.
pub(crate) trait ComputedNode {
    /// Mark the value dirty. Returns `true` only on the clean-to-dirty
    /// transition, i.e. when downstream readers need to hear about it.
    fn mark_dirty(&self) -> bool;
}

struct ComputedInner<T> {
    id: SubscriberId,
    compute: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    state: Cell<ComputedState>,
    compute_count: Cell<usize>,
}

impl<T: Clone> ComputedInner<T> {
    fn read(&self) -> T {
        if self.state.get() == ComputedState::Clean {
            if let Some(value) = self.value.borrow().as_ref() {
                return value.clone();
            }
        }
        self.recompute()
    }

    fn recompute(&self) -> T {
        let ctx = ContextGuard::enter(self.id);
        let value = (self.compute)();
        let dependencies = ctx.finish();

        Runtime::swap_dependencies(self.id, dependencies);
        *self.value.borrow_mut() = Some(value.clone());
        self.state.set(ComputedState::Clean);
        self.compute_count.set(self.compute_count.get() + 1);

        tracing::trace!(id = ?self.id, count = self.compute_count.get(), "computed");
        value
    }
}

impl<T> ComputedNode for ComputedInner<T> {
    fn mark_dirty(&self) -> bool {
        self.state.replace(ComputedState::Dirty) == ComputedState::Clean
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::unregister(self.id);
    }
}

/// A cached derived value that recomputes lazily when dependencies change.
///
/// Handles are cheap to clone and share one cache. The value is released
/// from the runtime when the last handle is dropped.
pub struct Computed<T: Clone + 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value. The getter is not run until the first read.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        let inner = Rc::new(ComputedInner {
            id: SubscriberId::new(),
            compute: Box::new(compute),
            value: RefCell::new(None),
            state: Cell::new(ComputedState::Dirty),
            compute_count: Cell::new(0),
        });

        let node: Weak<dyn ComputedNode> = Rc::downgrade(&inner) as Weak<dyn ComputedNode>;
        Runtime::register(inner.id, SubscriberRef::Computed(node));

        Self { inner }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Get the current value, recomputing if dirty. Inside a running
    /// computation this records a dependency on the computed value.
    pub fn get(&self) -> T {
        Runtime::track(DepKey::Computed(self.inner.id));
        self.inner.read()
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.read()
    }

    pub fn state(&self) -> ComputedState {
        self.inner.state.get()
    }

    pub fn is_dirty(&self) -> bool {
        self.state() == ComputedState::Dirty
    }

    /// Number of times the getter has run.
    pub fn compute_count(&self) -> usize {
        self.inner.compute_count.get()
    }

    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }
}

impl<T: Clone + 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("value", &self.inner.value.borrow())
            .field("compute_count", &self.compute_count())
            .finish()
    }
}

/// Create a computed value. Shorthand for [`Computed::new`].
pub fn computed<T: Clone + 'static>(compute: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
