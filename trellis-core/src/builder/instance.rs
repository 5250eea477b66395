//! Live instances produced by [`Builder::build`](super::Builder::build).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::update::{is_selector_key, SelectorSink};
use super::{ActionFn, DestroyFn};
use crate::error::{Error, Result};
use crate::reactive::{
    batch, effect, untrack, watch, watch_getter, Computed, Effect, EffectOutput, Reactive, Watch,
};
use crate::Value;

pub(crate) struct InstanceInner {
    state: Reactive,
    computed: RefCell<IndexMap<String, Computed<Value>>>,
    actions: RefCell<IndexMap<String, ActionFn>>,
    effects: RefCell<Vec<Effect>>,
    watchers: RefCell<Vec<Watch>>,
    destroy_hooks: RefCell<Vec<DestroyFn>>,
    selector_sink: RefCell<Option<Rc<dyn SelectorSink>>>,
    destroyed: Cell<bool>,
}

impl InstanceInner {
    fn stop_owned(&self) {
        let effects = std::mem::take(&mut *self.effects.borrow_mut());
        let watchers = std::mem::take(&mut *self.watchers.borrow_mut());
        for fx in &effects {
            fx.stop();
        }
        for w in &watchers {
            w.stop();
        }
    }
}

impl Drop for InstanceInner {
    fn drop(&mut self) {
        self.stop_owned();
    }
}

/// A live reactive object with derived values, actions and owned effects.
///
/// Handles are cheap to clone. Effects and watchers created through the
/// instance are stopped by [`Instance::destroy`] or when the last handle is
/// dropped.
#[derive(Clone)]
pub struct Instance {
    inner: Rc<InstanceInner>,
}

impl Instance {
    pub(crate) fn new(state: Reactive) -> Self {
        Self {
            inner: Rc::new(InstanceInner {
                state,
                computed: RefCell::new(IndexMap::new()),
                actions: RefCell::new(IndexMap::new()),
                effects: RefCell::new(Vec::new()),
                watchers: RefCell::new(Vec::new()),
                destroy_hooks: RefCell::new(Vec::new()),
                selector_sink: RefCell::new(None),
                destroyed: Cell::new(false),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakInstance {
        WeakInstance(Rc::downgrade(&self.inner))
    }

    pub(crate) fn add_computed(&self, name: String, value: Computed<Value>) {
        self.inner.computed.borrow_mut().insert(name, value);
    }

    pub(crate) fn add_action(&self, name: String, action: ActionFn) {
        self.inner.actions.borrow_mut().insert(name, action);
    }

    pub(crate) fn add_destroy_hook(&self, hook: DestroyFn) {
        self.inner.destroy_hooks.borrow_mut().push(hook);
    }

    /// The underlying state target.
    pub fn state(&self) -> &Reactive {
        &self.inner.state
    }

    /// The computed value declared under `name`.
    pub fn computed(&self, name: &str) -> Option<Computed<Value>> {
        self.inner.computed.borrow().get(name).cloned()
    }

    pub fn is_computed(&self, name: &str) -> bool {
        self.inner.computed.borrow().contains_key(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.inner.actions.borrow().contains_key(name)
    }

    /// Read a state key or computed value, tracking the read.
    pub fn get(&self, key: &str) -> Value {
        match self.computed(key) {
            Some(value) => value.get(),
            None => self.inner.state.get(key),
        }
    }

    /// Write a state key. Computed keys are read-only.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        if self.is_computed(key) {
            tracing::warn!(key, "computed values are read-only; write ignored");
            return;
        }
        self.inner.state.set(key, value);
    }

    /// Invoke the action `name`. Writes made by the action are batched.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }
        let action = self
            .inner
            .actions
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownAction(name.to_string()))?;
        Ok(batch(|| action(self, args)))
    }

    /// Apply a mixed patch.
    ///
    /// Plain keys are written inside one batch frame, so dependents run
    /// once. Selector-like keys are forwarded to the installed
    /// [`SelectorSink`] after the writes have flushed.
    pub fn update<K, V>(&self, patch: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut selectors = Vec::new();
        batch(|| {
            for (key, value) in patch {
                let key = key.into();
                if is_selector_key(&key) {
                    selectors.push((key, value.into()));
                } else {
                    self.set(&key, value);
                }
            }
        });

        if selectors.is_empty() {
            return;
        }
        let sink = self.inner.selector_sink.borrow().clone();
        match sink {
            Some(sink) => {
                for (selector, value) in &selectors {
                    sink.apply(selector, value);
                }
            }
            None => tracing::debug!(
                count = selectors.len(),
                "no selector sink installed; selector keys dropped"
            ),
        }
    }

    /// [`Instance::update`] from a JSON object.
    pub fn update_json(&self, patch: serde_json::Value) {
        match patch {
            serde_json::Value::Object(map) => self.update(map),
            other => tracing::warn!(found = %other, "update patch is not an object; ignored"),
        }
    }

    /// Install the receiver for selector keys of [`Instance::update`].
    pub fn set_selector_sink(&self, sink: impl SelectorSink + 'static) {
        *self.inner.selector_sink.borrow_mut() = Some(Rc::new(sink));
    }

    /// Watch a state key or a computed value. The watcher is owned by the
    /// instance.
    pub fn watch(&self, key: &str, callback: impl FnMut(&Value, &Value) + 'static) -> Watch {
        let handle = match self.computed(key) {
            Some(value) => watch_getter(move || value.get(), callback),
            None => watch(&self.inner.state, key, callback),
        };
        self.inner.watchers.borrow_mut().push(handle.clone());
        handle
    }

    /// Create an effect owned by the instance.
    pub fn effect<F, R>(&self, f: F) -> Effect
    where
        F: FnMut() -> R + 'static,
        R: EffectOutput,
    {
        let handle = effect(f);
        self.inner.effects.borrow_mut().push(handle.clone());
        handle
    }

    /// Plain snapshot of state and computed values. Records no dependencies.
    pub fn to_json(&self) -> serde_json::Value {
        untrack(|| {
            let mut snapshot = match self.inner.state.to_json() {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            let computed: Vec<_> = self
                .inner
                .computed
                .borrow()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            for (name, value) in computed {
                snapshot.insert(name, value.get_untracked().to_json());
            }
            serde_json::Value::Object(snapshot)
        })
    }

    /// Run the destroy hooks and stop every owned effect and watcher.
    /// Destroying twice is a no-op.
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        let hooks = std::mem::take(&mut *self.inner.destroy_hooks.borrow_mut());
        for hook in &hooks {
            hook(self);
        }
        self.inner.stop_owned();
        tracing::debug!("instance destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("state", &self.inner.state)
            .field("computed", &self.inner.computed.borrow().keys().collect::<Vec<_>>())
            .field("actions", &self.inner.actions.borrow().keys().collect::<Vec<_>>())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Non-owning handle captured by declared closures, so that an instance's
/// own effects do not keep it alive.
#[derive(Clone)]
pub(crate) struct WeakInstance(Weak<InstanceInner>);

impl WeakInstance {
    pub(crate) fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(|inner| Instance { inner })
    }
}
