//! Integration Tests for Builder and Instances

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;
use trellis_core::{builder, effect, state, Error, Value};

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

/// Test the counter scenario end to end: two increments, one effect on the
/// derived value.
#[test]
fn counter_scenario() {
    let computes = counter();
    let template = {
        let computes = computes.clone();
        builder()
            .state(json!({ "n": 0 }))
            .computed("double", move |c| {
                computes.set(computes.get() + 1);
                c.get("n").as_f64().unwrap_or(0.0) * 2.0
            })
            .action("inc", |c, _| {
                let n = c.get("n").as_f64().unwrap_or(0.0);
                c.set("n", n + 1.0);
            })
    };
    let c = template.build();

    let calls = counter();
    let _fx = {
        let (c, calls) = (c.clone(), calls.clone());
        effect(move || {
            calls.set(calls.get() + 1);
            c.get("double");
        })
    };

    c.call("inc", &[]).unwrap();
    c.call("inc", &[]).unwrap();

    assert_eq!(calls.get(), 3);
    assert_eq!(c.get("double").as_f64(), Some(4.0));
    // once per dirty read: the initial read and one per increment
    assert_eq!(computes.get(), 3);
}

/// Test that two builds share nothing.
#[test]
fn builds_are_independent() {
    let template = builder()
        .state(json!({ "n": 0, "items": [] }))
        .computed("size", |c| {
            c.get("items").as_reactive().map_or(0, |items| items.len())
        });

    let a = template.build();
    let b = template.build();
    assert!(!a.state().ptr_eq(b.state()));

    let b_runs = counter();
    let _fx = {
        let (b, b_runs) = (b.clone(), b_runs.clone());
        effect(move || {
            b.get("n");
            b.get("size");
            b_runs.set(b_runs.get() + 1);
        })
    };

    a.set("n", 5);
    if let Some(items) = a.get("items").as_reactive() {
        items.push("x");
    }

    assert_eq!(a.get("size").as_f64(), Some(1.0));
    assert_eq!(b.get("size").as_f64(), Some(0.0));
    assert_eq!(b.get("n").as_f64(), Some(0.0));
    assert_eq!(b_runs.get(), 1);
}

/// Test that update writes plain keys in one batch and forwards selectors.
#[test]
fn update_batches_and_forwards_selectors() {
    let instance = state(json!({ "a": 0, "b": 0, "c": 0 }));
    let runs = counter();
    let forwarded = Rc::new(RefCell::new(Vec::new()));

    let _fx = {
        let (instance, runs) = (instance.clone(), runs.clone());
        effect(move || {
            instance.get("a");
            instance.get("b");
            instance.get("c");
            runs.set(runs.get() + 1);
        })
    };
    {
        let forwarded = forwarded.clone();
        instance.set_selector_sink(move |selector: &str, value: &Value| {
            forwarded
                .borrow_mut()
                .push((selector.to_string(), value.to_json()));
        });
    }

    instance.update_json(json!({
        "a": 1,
        "#title": "Hello",
        "b": 2,
        ".badge": 3,
        "c": 3,
    }));

    assert_eq!(runs.get(), 2);
    assert_eq!(
        *forwarded.borrow(),
        vec![
            ("#title".to_string(), json!("Hello")),
            (".badge".to_string(), json!(3)),
        ]
    );
    assert!(!instance.state().has("#title"));
}

/// Test declared watchers on state keys and computed values.
#[test]
fn declared_watchers_fire_with_new_and_old() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let template = {
        let (on_name, on_upper) = (log.clone(), log.clone());
        builder()
            .state(json!({ "name": "ada" }))
            .computed("upper", |c| c.get("name").to_string().to_uppercase())
            .watch("name", move |_, new, old| {
                on_name
                    .borrow_mut()
                    .push(format!("name {old} -> {new}"));
            })
            .watch("upper", move |_, new, old| {
                on_upper
                    .borrow_mut()
                    .push(format!("upper {old} -> {new}"));
            })
    };
    let instance = template.build();

    instance.set("name", "grace");

    assert_eq!(
        *log.borrow(),
        vec!["name ada -> grace", "upper ADA -> GRACE"]
    );
}

/// Test that destroy runs hooks once and stops owned effects.
#[test]
fn destroy_is_idempotent_and_stops_effects() {
    let destroyed = counter();
    let runs = counter();
    let template = {
        let (destroyed, runs) = (destroyed.clone(), runs.clone());
        builder()
            .state(json!({ "n": 0 }))
            .effect(move |c| {
                c.get("n");
                runs.set(runs.get() + 1);
            })
            .destroy(move |_| destroyed.set(destroyed.get() + 1))
    };
    let instance = template.build();

    instance.destroy();
    instance.destroy();
    instance.set("n", 1);

    assert!(instance.is_destroyed());
    assert_eq!(destroyed.get(), 1);
    assert_eq!(runs.get(), 1);
    assert_eq!(instance.call("anything", &[]), Err(Error::Destroyed));
}

/// Test actions with arguments and unknown names.
#[test]
fn actions_take_arguments() {
    let instance = builder()
        .state(json!({ "total": 0 }))
        .actions([(
            "add",
            |c: &trellis_core::Instance, args: &[Value]| {
                let total = c.get("total").as_f64().unwrap_or(0.0);
                let amount = args.first().and_then(Value::as_f64).unwrap_or(0.0);
                c.set("total", total + amount);
                Value::from(total + amount)
            },
        )])
        .build();

    assert_eq!(instance.call("add", &[Value::from(5)]), Ok(Value::from(5)));
    assert_eq!(instance.call("add", &[Value::from(2)]), Ok(Value::from(7)));
    assert_eq!(
        instance.call("missing", &[]),
        Err(Error::UnknownAction("missing".to_string()))
    );
}

/// Test that declarations after build are ignored.
#[test]
fn declarations_after_build_are_ignored() {
    let template = builder().state(json!({ "a": 1 }));
    let first = template.build();
    assert!(template.is_built());

    let template = template.state(json!({ "b": 2 })).action("noop", |_, _| ());
    let second = template.build();

    assert_eq!(first.to_json(), json!({ "a": 1 }));
    assert_eq!(second.to_json(), json!({ "a": 1 }));
    assert!(!second.has_action("noop"));
}

/// Test that the instance snapshot includes computed values.
#[test]
fn snapshot_includes_computed_values() {
    let instance = builder()
        .state(json!({ "first": "Ada", "last": "Lovelace" }))
        .computed("full", |c| format!("{} {}", c.get("first"), c.get("last")))
        .build();

    assert_eq!(
        instance.to_json(),
        json!({ "first": "Ada", "last": "Lovelace", "full": "Ada Lovelace" })
    );
}
