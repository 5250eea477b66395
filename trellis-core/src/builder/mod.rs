//! Builder
//!
//! A [`Builder`] collects declarations (state shape, computed values,
//! actions, watchers, effects, destroy hooks) without creating anything
//! reactive. [`Builder::build`] materializes them into a live [`Instance`].
//!
//! # How Building Works
//!
//! 1. Fresh targets are created from the merged state shape, so every build
//!    gets its own data and its own dependency entries.
//!
//! 2. Declarations are applied in phases: computed values and actions
//!    first, then watchers, then effects, then destroy hooks. Within a
//!    phase, declaration order is kept. Effects therefore see every
//!    computed value and action regardless of where they were declared.
//!
//! 3. Declared closures capture the instance weakly. Dropping the last
//!    instance handle stops its effects and watchers.
//!
//! Once built, a builder stays usable for further builds, but further
//! declarations are ignored.

mod instance;
mod update;

pub use instance::Instance;
pub use update::{is_selector_key, SelectorSink};

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::reactive::{Cleanup, Computed, EffectOutput, Reactive};
use crate::Value;

pub(crate) type ComputedFn = Rc<dyn Fn(&Instance) -> Value>;
pub(crate) type ActionFn = Rc<dyn Fn(&Instance, &[Value]) -> Value>;
pub(crate) type WatchFn = Rc<dyn Fn(&Instance, &Value, &Value)>;
pub(crate) type EffectFn = Rc<dyn Fn(&Instance) -> Option<Cleanup>>;
pub(crate) type DestroyFn = Rc<dyn Fn(&Instance)>;

enum Declaration {
    State(serde_json::Map<String, serde_json::Value>),
    Computed(String, ComputedFn),
    Action(String, ActionFn),
    Watch(String, WatchFn),
    Effect(EffectFn),
    Destroy(DestroyFn),
}

impl Declaration {
    fn kind(&self) -> &'static str {
        match self {
            Declaration::State(_) => "state",
            Declaration::Computed(..) => "computed",
            Declaration::Action(..) => "action",
            Declaration::Watch(..) => "watch",
            Declaration::Effect(_) => "effect",
            Declaration::Destroy(_) => "destroy",
        }
    }
}

/// Staged declaration list for reactive instances.
#[derive(Default)]
pub struct Builder {
    declarations: Vec<Declaration>,
    built: Cell<bool>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    fn declare(mut self, declaration: Declaration) -> Self {
        if self.built.get() {
            tracing::warn!(
                kind = declaration.kind(),
                "builder already built; declaration ignored"
            );
        } else {
            self.declarations.push(declaration);
        }
        self
    }

    /// Declare state keys. Repeated calls merge, later keys winning.
    pub fn state(self, shape: serde_json::Value) -> Self {
        match shape {
            serde_json::Value::Object(map) => self.declare(Declaration::State(map)),
            other => {
                tracing::warn!(found = %other, "state shape is not an object; ignored");
                self
            }
        }
    }

    pub fn computed<F, R>(self, name: &str, f: F) -> Self
    where
        F: Fn(&Instance) -> R + 'static,
        R: Into<Value>,
    {
        self.declare(Declaration::Computed(
            name.to_string(),
            Rc::new(move |instance: &Instance| -> Value { f(instance).into() }),
        ))
    }

    pub fn action<F, R>(self, name: &str, f: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> R + 'static,
        R: Into<Value>,
    {
        self.declare(Declaration::Action(
            name.to_string(),
            Rc::new(move |instance: &Instance, args: &[Value]| -> Value {
                f(instance, args).into()
            }),
        ))
    }

    /// Declare several actions at once.
    pub fn actions<I, S, F, R>(self, actions: I) -> Self
    where
        I: IntoIterator<Item = (S, F)>,
        S: AsRef<str>,
        F: Fn(&Instance, &[Value]) -> R + 'static,
        R: Into<Value>,
    {
        actions
            .into_iter()
            .fold(self, |builder, (name, f)| builder.action(name.as_ref(), f))
    }

    /// Watch a state key or a computed value by name.
    pub fn watch<F>(self, key: &str, f: F) -> Self
    where
        F: Fn(&Instance, &Value, &Value) + 'static,
    {
        self.declare(Declaration::Watch(key.to_string(), Rc::new(f)))
    }

    pub fn effect<F, R>(self, f: F) -> Self
    where
        F: Fn(&Instance) -> R + 'static,
        R: EffectOutput,
    {
        self.declare(Declaration::Effect(Rc::new(move |instance: &Instance| {
            f(instance).into_cleanup()
        })))
    }

    pub fn destroy<F>(self, f: F) -> Self
    where
        F: Fn(&Instance) + 'static,
    {
        self.declare(Declaration::Destroy(Rc::new(f)))
    }

    pub fn is_built(&self) -> bool {
        self.built.get()
    }

    /// Materialize a new, independent instance.
    pub fn build(&self) -> Instance {
        self.built.set(true);

        let mut shape = IndexMap::new();
        for declaration in &self.declarations {
            if let Declaration::State(map) = declaration {
                for (key, value) in map {
                    shape.insert(key.clone(), Value::from(value.clone()));
                }
            }
        }
        let instance = Instance::new(Reactive::object_from(shape));
        let weak = instance.downgrade();

        for declaration in &self.declarations {
            match declaration {
                Declaration::Computed(name, f) => {
                    let (f, weak) = (f.clone(), weak.clone());
                    let value = Computed::new(move || {
                        weak.upgrade()
                            .map(|instance| f(&instance))
                            .unwrap_or_default()
                    });
                    instance.add_computed(name.clone(), value);
                }
                Declaration::Action(name, f) => instance.add_action(name.clone(), f.clone()),
                _ => {}
            }
        }

        for declaration in &self.declarations {
            if let Declaration::Watch(key, f) = declaration {
                let (f, weak) = (f.clone(), weak.clone());
                instance.watch(key, move |new, old| {
                    if let Some(instance) = weak.upgrade() {
                        f(&instance, new, old);
                    }
                });
            }
        }

        for declaration in &self.declarations {
            if let Declaration::Effect(f) = declaration {
                let (f, weak) = (f.clone(), weak.clone());
                instance.effect(move || weak.upgrade().and_then(|instance| f(&instance)));
            }
        }

        for declaration in &self.declarations {
            if let Declaration::Destroy(f) = declaration {
                instance.add_destroy_hook(f.clone());
            }
        }

        tracing::debug!(declarations = self.declarations.len(), "instance built");
        instance
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field(
                "declarations",
                &self.declarations.iter().map(Declaration::kind).collect::<Vec<_>>(),
            )
            .field("built", &self.built.get())
            .finish()
    }
}

/// Start a new builder.
pub fn builder() -> Builder {
    Builder::new()
}

/// Build an instance with state only.
pub fn state(shape: serde_json::Value) -> Instance {
    builder().state(shape).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn declarations_are_inert_until_built() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let template = builder()
            .state(json!({ "n": 1 }))
            .effect(move |_| counter.set(counter.get() + 1));

        assert_eq!(runs.get(), 0);
        let _instance = template.build();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn state_declarations_merge() {
        let instance = builder()
            .state(json!({ "a": 1, "b": 1 }))
            .state(json!({ "b": 2 }))
            .build();

        assert_eq!(instance.to_json(), json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn effects_see_computed_declared_later() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let instance = builder()
            .state(json!({ "n": 2 }))
            .effect(move |i| sink.borrow_mut().push(i.get("square")))
            .computed("square", |i| {
                let n = i.get("n").as_f64().unwrap_or(0.0);
                n * n
            })
            .build();

        instance.set("n", 3);
        assert_eq!(*seen.borrow(), vec![Value::from(4), Value::from(9)]);
    }

    #[test]
    fn computed_keys_are_read_only() {
        let instance = builder()
            .state(json!({ "n": 1 }))
            .computed("double", |i| i.get("n").as_f64().unwrap_or(0.0) * 2.0)
            .build();

        instance.set("double", 100);
        assert_eq!(instance.get("double"), Value::from(2));
        assert!(!instance.state().has("double"));
    }

    #[test]
    fn dropping_instance_stops_its_effects() {
        let target = Reactive::object();
        let runs = Rc::new(Cell::new(0));

        let instance = {
            let target = target.clone();
            let runs = runs.clone();
            builder()
                .effect(move |_| {
                    target.get("x");
                    runs.set(runs.get() + 1);
                })
                .build()
        };

        target.set("x", 1);
        assert_eq!(runs.get(), 2);

        drop(instance);
        target.set("x", 2);
        assert_eq!(runs.get(), 2);
    }
}
