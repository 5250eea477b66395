//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued in the current batch
//!    frame and re-runs when the outermost frame closes.
//!
//! 3. Each run records a fresh dependency set which replaces the previous
//!    one, so branches that are no longer taken stop triggering the effect.
//!
//! # Cleanup
//!
//! Effects can optionally return a [`Cleanup`]. It is called before the
//! effect re-runs and when the effect is stopped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::context::ContextGuard;
use super::runtime::Runtime;
use super::subscriber::SubscriberRef;
use super::SubscriberId;

/// Teardown returned from an effect run.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// What an effect body may return.
pub trait EffectOutput {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl EffectOutput for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl EffectOutput for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl EffectOutput for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

type EffectFn = Box<dyn FnMut() -> Option<Cleanup>>;

pub(crate) struct EffectInner {
    id: SubscriberId,
    run: RefCell<EffectFn>,
    cleanup: Cell<Option<Cleanup>>,
    disposed: Cell<bool>,
    running: Cell<bool>,
    run_count: Cell<usize>,
}

impl EffectInner {
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Run the effect body once, tracking what it reads.
    ///
    /// A run that is already in progress is not re-entered; if the body
    /// triggers itself, the queued run happens in the next flush round.
    pub(crate) fn run(&self) {
        if self.disposed.get() || self.running.get() {
            return;
        }

        if let Some(cleanup) = self.cleanup.take() {
            cleanup.run();
        }

        Runtime::batch(|| {
            let _running = RunningGuard::set(&self.running);
            let ctx = ContextGuard::enter(self.id);
            let output = match self.run.try_borrow_mut() {
                Ok(mut body) => body(),
                Err(_) => None,
            };
            let dependencies = ctx.finish();

            if self.disposed.get() {
                // Stopped from inside its own body.
                if let Some(cleanup) = output {
                    cleanup.run();
                }
            } else {
                Runtime::swap_dependencies(self.id, dependencies);
                self.cleanup.set(output);
            }

            self.run_count.set(self.run_count.get() + 1);
        });
    }

    fn stop(&self) {
        if self.disposed.replace(true) {
            return;
        }
        Runtime::unregister(self.id);
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.run();
        }
        tracing::debug!(id = ?self.id, runs = self.run_count.get(), "effect stopped");
    }
}

/// Clears the running flag when the run ends, also on unwind.
struct RunningGuard<'a>(&'a Cell<bool>);

impl<'a> RunningGuard<'a> {
    fn set(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The runtime keeps the effect alive until [`Effect::stop`] is called;
/// dropping the handle does not stop it.
///
/// # Example
///
/// ```rust
/// use trellis_core::{effect, Reactive};
///
/// let count = Reactive::object();
/// count.set("n", 0);
///
/// let log = {
///     let count = count.clone();
///     effect(move || println!("n is {}", count.get("n")))
/// };
///
/// count.set("n", 5); // prints "n is 5"
/// log.stop();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect and run it immediately.
    pub fn new<F, R>(mut f: F) -> Self
    where
        F: FnMut() -> R + 'static,
        R: EffectOutput,
    {
        let inner = Rc::new(EffectInner {
            id: SubscriberId::new(),
            run: RefCell::new(Box::new(move || f().into_cleanup())),
            cleanup: Cell::new(None),
            disposed: Cell::new(false),
            running: Cell::new(false),
            run_count: Cell::new(0),
        });

        Runtime::register(inner.id, SubscriberRef::Effect(inner.clone()));
        inner.run();

        Self { inner }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Run the effect now, outside of any notification.
    pub fn execute(&self) {
        self.inner.run();
    }

    /// Stop the effect: drop its subscriptions and run its pending cleanup.
    /// Stopping twice is a no-op.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Create an effect. Shorthand for [`Effect::new`].
pub fn effect<F, R>(f: F) -> Effect
where
    F: FnMut() -> R + 'static,
    R: EffectOutput,
{
    Effect::new(f)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
