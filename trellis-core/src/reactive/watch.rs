//! Watchers
//!
//! A watcher observes one source and calls back with `(new, old)` whenever
//! the source changes.
//!
//! Two sources are supported:
//!
//! - a single key of a reactive target. The callback fires synchronously,
//!   at the moment the write happens, with the written and previous value.
//! - a getter. The getter is evaluated in its own tracking frame; when one of
//!   its dependencies changes the watcher is queued like an effect, and at
//!   flush time the getter is re-evaluated and compared with the last result.
//!   Equal results do not fire.
//!
//! A callback that writes to its own source is not re-entered: the nested
//! notification is dropped with a warning.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::context::ContextGuard;
use super::registry::DepKey;
use super::runtime::Runtime;
use super::subscriber::SubscriberRef;
use super::target::Reactive;
use super::SubscriberId;
use crate::Value;

type Getter = Box<dyn Fn() -> Value>;
type Callback = Box<dyn FnMut(&Value, &Value)>;

pub(crate) enum WatchSource {
    Key(DepKey),
    Getter(Getter),
}

pub(crate) struct WatcherInner {
    id: SubscriberId,
    source: WatchSource,
    callback: RefCell<Callback>,
    last: RefCell<Value>,
    disposed: Cell<bool>,
}

impl WatcherInner {
    fn new(source: WatchSource, callback: Callback) -> Rc<Self> {
        let inner = Rc::new(Self {
            id: SubscriberId::new(),
            source,
            callback: RefCell::new(callback),
            last: RefCell::new(Value::Null),
            disposed: Cell::new(false),
        });
        Runtime::register(inner.id, SubscriberRef::Watcher(inner.clone()));
        inner
    }

    pub(crate) fn is_getter(&self) -> bool {
        matches!(self.source, WatchSource::Getter(_))
    }

    /// Invoke the callback with `(new, old)`.
    ///
    /// The callback runs untracked: reads inside it never become
    /// dependencies of whichever computation caused the write.
    pub(crate) fn fire(&self, new: &Value, old: &Value) {
        if self.disposed.get() {
            return;
        }
        let Ok(mut callback) = self.callback.try_borrow_mut() else {
            tracing::warn!(id = ?self.id, "watcher triggered its own source; nested change skipped");
            return;
        };
        let _untracked = ContextGuard::untracked();
        callback(new, old);
    }

    /// Re-evaluate a getter source and fire if the result changed.
    pub(crate) fn run(&self) {
        if self.disposed.get() {
            return;
        }
        let Some(next) = self.evaluate() else {
            return;
        };
        let prev = self.last.replace(next.clone());
        if !next.same_value(&prev) {
            self.fire(&next, &prev);
        }
    }

    fn evaluate(&self) -> Option<Value> {
        let WatchSource::Getter(getter) = &self.source else {
            return None;
        };
        let ctx = ContextGuard::enter(self.id);
        let value = getter();
        let dependencies = ctx.finish();
        if !self.disposed.get() {
            Runtime::swap_dependencies(self.id, dependencies);
        }
        Some(value)
    }

    fn stop(&self) {
        if self.disposed.replace(true) {
            return;
        }
        Runtime::unregister(self.id);
        tracing::debug!(id = ?self.id, "watcher stopped");
    }
}

/// Handle to a running watcher.
///
/// Like effects, watchers stay alive until stopped.
#[derive(Clone)]
pub struct Watch {
    inner: Rc<WatcherInner>,
}

impl Watch {
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Stop watching. Stopping twice is a no-op.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = if self.inner.is_getter() { "getter" } else { "key" };
        f.debug_struct("Watch")
            .field("id", &self.inner.id)
            .field("source", &source)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Watch a single key of `target`.
///
/// The callback runs synchronously for every changing write to the key,
/// including removal (where `new` is `Null`).
pub fn watch(
    target: &Reactive,
    key: &str,
    callback: impl FnMut(&Value, &Value) + 'static,
) -> Watch {
    let dep = DepKey::Prop(target.id(), key.to_string());
    let inner = WatcherInner::new(WatchSource::Key(dep.clone()), Box::new(callback));
    Runtime::subscribe(dep, inner.id);
    Watch { inner }
}

/// Watch the result of `getter`.
///
/// The getter runs once immediately to collect dependencies; the callback
/// is not called for that initial value.
pub fn watch_getter(
    getter: impl Fn() -> Value + 'static,
    callback: impl FnMut(&Value, &Value) + 'static,
) -> Watch {
    let inner = WatcherInner::new(WatchSource::Getter(Box::new(getter)), Box::new(callback));
    if let Some(initial) = inner.evaluate() {
        *inner.last.borrow_mut() = initial;
    }
    Watch { inner }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::computed;

    type Log = Rc<RefCell<Vec<(Value, Value)>>>;

    fn recorder() -> (Log, impl FnMut(&Value, &Value) + 'static) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |new: &Value, old: &Value| {
            sink.borrow_mut().push((new.clone(), old.clone()))
        })
    }

    #[test]
    fn key_watcher_receives_new_and_old() {
        let state = Reactive::object();
        state.set("name", "a");
        let (log, cb) = recorder();

        let _w = watch(&state, "name", cb);
        state.set("name", "b");
        state.set("name", "b");
        state.set("name", "c");

        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], (Value::from("b"), Value::from("a")));
        assert_eq!(log[1], (Value::from("c"), Value::from("b")));
    }

    #[test]
    fn key_watcher_fires_inside_batch_per_write() {
        let state = Reactive::object();
        let (log, cb) = recorder();
        let _w = watch(&state, "n", cb);

        Runtime::batch(|| {
            state.set("n", 1);
            state.set("n", 2);
        });

        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn getter_watcher_fires_once_per_batch() {
        let state = Reactive::object();
        state.set("a", 1);
        state.set("b", 1);
        let (log, cb) = recorder();

        let _w = {
            let state = state.clone();
            watch_getter(
                move || {
                    let a = state.get("a").as_f64().unwrap_or(0.0);
                    let b = state.get("b").as_f64().unwrap_or(0.0);
                    Value::from(a + b)
                },
                cb,
            )
        };
        assert!(log.borrow().is_empty());

        Runtime::batch(|| {
            state.set("a", 2);
            state.set("b", 3);
        });

        assert_eq!(*log.borrow(), vec![(Value::from(5), Value::from(2))]);
    }

    #[test]
    fn getter_watcher_skips_equal_results() {
        let state = Reactive::object();
        state.set("n", 1);
        let (log, cb) = recorder();

        let _w = {
            let state = state.clone();
            watch_getter(move || Value::from(state.get("n").as_f64().unwrap_or(0.0) > 0.0), cb)
        };

        state.set("n", 2);
        assert!(log.borrow().is_empty());
        state.set("n", -1);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn getter_can_read_computed() {
        let state = Reactive::object();
        state.set("n", 1);
        let double = {
            let state = state.clone();
            computed(move || state.get("n").as_f64().unwrap_or(0.0) * 2.0)
        };
        let (log, cb) = recorder();

        let _w = {
            let double = double.clone();
            watch_getter(move || Value::from(double.get()), cb)
        };

        state.set("n", 4);
        assert_eq!(*log.borrow(), vec![(Value::from(8), Value::from(2))]);
    }

    #[test]
    fn stopped_watcher_is_silent() {
        let state = Reactive::object();
        let (log, cb) = recorder();
        let w = watch(&state, "n", cb);

        w.stop();
        w.stop();
        state.set("n", 1);

        assert!(w.is_stopped());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn watcher_writing_its_own_key_is_not_reentered() {
        let state = Reactive::object();
        let calls = Rc::new(Cell::new(0));

        let _w = {
            let target = state.clone();
            let calls = calls.clone();
            watch(&state, "n", move |new, _| {
                calls.set(calls.get() + 1);
                let n = new.as_f64().unwrap_or(0.0);
                target.set("n", n + 1.0);
            })
        };

        state.set("n", 1);
        assert_eq!(calls.get(), 1);
        assert_eq!(state.peek("n").as_f64(), Some(2.0));
    }

    #[test]
    fn callback_reads_do_not_leak_into_the_writer() {
        let state = Reactive::object();
        state.set("src", 0);
        state.set("a", 0);
        state.set("b", 0);
        let runs = Rc::new(Cell::new(0));

        let _w = {
            let target = state.clone();
            watch(&state, "a", move |_, _| {
                target.get("b");
            })
        };
        let fx = {
            let (state, runs) = (state.clone(), runs.clone());
            crate::reactive::effect(move || {
                runs.set(runs.get() + 1);
                let src = state.get("src");
                state.set("a", src);
            })
        };

        state.set("src", 1);
        assert_eq!(runs.get(), 2);
        assert_eq!(fx.dependency_count(), 1);

        state.set("b", 99);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn key_watchers_fire_in_registration_order() {
        let state = Reactive::object();
        let order = Rc::new(RefCell::new(Vec::new()));

        let watchers: Vec<Watch> = ["first", "second", "third"]
            .into_iter()
            .map(|name| {
                let order = order.clone();
                watch(&state, "n", move |new, _| {
                    order.borrow_mut().push((name, new.as_f64()));
                })
            })
            .collect();

        state.set("n", 1);

        assert_eq!(watchers.len(), 3);
        assert_eq!(
            *order.borrow(),
            vec![("first", Some(1.0)), ("second", Some(1.0)), ("third", Some(1.0))]
        );
    }
}
