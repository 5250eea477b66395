//! Integration Tests for Forms

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_util::future;
use futures_util::FutureExt;
use serde_json::json;
use trellis_core::form::validators::{email, matches_field, min_length, required};
use trellis_core::{effect, form, BoxError, Form, FormStatus, SubmitError, Validator};

fn signup() -> Form {
    form(json!({ "email": "", "password": "", "confirm": "" }))
        .validator("email", required("Email is required").and(email("Invalid email")))
        .validator("password", min_length(8, "Too short"))
        .validator("confirm", matches_field("password", "Passwords differ"))
        .build()
}

/// Test the required + email field through edit, fix and reset.
#[test]
fn email_lifecycle() {
    let f = form(json!({ "email": "start@example.com" }))
        .validator("email", required("Email is required").and(email("Invalid email")))
        .build();

    f.set_value("email", "bad");
    assert!(f.error("email").is_some());
    assert!(!f.is_valid());

    f.set_value("email", "a@b.com");
    assert!(f.error("email").is_none());
    assert!(f.is_valid());
    assert!(f.is_dirty());

    f.reset();
    assert_eq!(f.value("email").as_str(), Some("start@example.com"));
    assert!(f.errors().is_empty());
    assert!(f.touched().is_empty());
    assert!(!f.is_dirty());
}

/// Test that effects follow the derived error visibility of a field.
#[test]
fn derived_state_drives_effects() {
    let f = signup();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let _fx = {
        let (f, seen) = (f.clone(), seen.clone());
        effect(move || seen.borrow_mut().push(f.should_show_error("email")))
    };

    f.set_value("email", "nope");
    f.set_value("email", "still nope");
    f.set_value("email", "ok@example.com");

    assert_eq!(*seen.borrow(), vec![false, true, false]);
}

/// Test that several values written together trigger one effect run.
#[test]
fn set_values_runs_one_batch() {
    let f = signup();
    let runs = Rc::new(Cell::new(0));

    let _fx = {
        let (f, runs) = (f.clone(), runs.clone());
        effect(move || {
            f.to_object();
            f.values().to_json_tracked();
            runs.set(runs.get() + 1);
        })
    };

    f.set_values([("email", "a@b.com"), ("password", "longenough"), ("confirm", "longenough")]);

    assert_eq!(runs.get(), 2);
    assert!(f.is_valid());
}

/// Test that an invalid submit never reaches the handler.
#[tokio::test]
async fn submit_invalid_skips_handler() {
    let called = Rc::new(Cell::new(false));
    let f = {
        let called = called.clone();
        form(json!({ "email": "" }))
            .validator("email", required("Email is required"))
            .on_submit(move |values| {
                called.set(true);
                async move { Ok::<_, BoxError>(values) }
            })
            .build()
    };

    let outcome = f.submit().await;

    match outcome {
        Err(SubmitError::Invalid(errors)) => {
            assert_eq!(errors.get("email").map(String::as_str), Some("Email is required"));
        }
        other => panic!("expected invalid submit, got {other:?}"),
    }
    assert!(!called.get());
    assert_eq!(f.submit_count(), 1);
    assert!(!f.is_submitting());
    assert_eq!(f.status(), FormStatus::Idle);
    assert!(f.is_touched("email"));
    assert!(f.should_show_error("email"));
}

/// Test the status sequence of a valid submit.
#[tokio::test]
async fn submit_valid_awaits_handler() {
    let statuses = Rc::new(RefCell::new(Vec::new()));
    let f = form(json!({ "name": "Ada", "age": 36 }))
        .validator("name", required("Name is required"))
        .on_submit(|values| async move {
            tokio::task::yield_now().await;
            Ok::<_, BoxError>(json!({ "saved": values["name"] }))
        })
        .build();

    let _status = {
        let (f, statuses) = (f.clone(), statuses.clone());
        effect(move || statuses.borrow_mut().push(f.status()))
    };

    let result = f.submit().await.unwrap();

    assert_eq!(result, json!({ "saved": "Ada" }));
    assert_eq!(
        *statuses.borrow(),
        vec![
            FormStatus::Idle,
            FormStatus::Validating,
            FormStatus::Submitting,
            FormStatus::Idle,
        ]
    );
    assert_eq!(f.submit_count(), 1);
    assert_eq!(f.to_object(), json!({ "name": "Ada", "age": 36 }));
}

/// Test that a failing handler surfaces its error and keeps the values.
#[tokio::test]
async fn handler_error_is_returned_and_values_kept() {
    let f = form(json!({ "name": "Ada" }))
        .on_submit(|_| async { Err::<serde_json::Value, BoxError>("server unavailable".into()) })
        .build();
    f.set_value("name", "Grace");

    let err = f.submit().await.unwrap_err();

    assert!(matches!(err, SubmitError::Handler(_)));
    assert_eq!(err.to_string(), "submit handler failed: server unavailable");
    assert_eq!(f.value("name").as_str(), Some("Grace"));
    assert!(!f.is_submitting());
}

/// Test that a submit without a handler resolves to the values.
#[tokio::test]
async fn submit_without_handler_returns_values() {
    let f = form(json!({ "q": "rust" })).build();
    assert_eq!(f.submit().await.unwrap(), json!({ "q": "rust" }));
    assert_eq!(f.submit().await.unwrap(), json!({ "q": "rust" }));
    assert_eq!(f.submit_count(), 2);
}

/// Test a validator that compares two fields.
#[test]
fn cross_field_validation() {
    let f = signup();
    f.set_value("password", "correct horse");
    f.set_value("confirm", "correct horse battery");
    assert_eq!(f.error("confirm").as_deref(), Some("Passwords differ"));

    f.set_value("confirm", "correct horse");
    assert_eq!(f.error("confirm"), None);
}

/// Test that a validator error marks the field with the generic message.
#[test]
fn failing_validator_marks_field_invalid() {
    let f = form(json!({ "code": "x" }))
        .validator(
            "code",
            Validator::try_new(|_, _, _| Err("lookup table missing".into())),
        )
        .build();

    assert!(!f.validate_field("code"));
    assert_eq!(
        f.error("code").as_deref(),
        Some(trellis_core::form::GENERIC_VALIDATION_MESSAGE)
    );
}

/// Test resetting one field next to manually set errors.
#[test]
fn reset_field_and_manual_errors() {
    let f = signup();
    f.set_value("email", "bad");
    f.set_value("password", "short");
    f.set_error("confirm", Some("Server says no".to_string()));

    f.reset_field("email");
    assert_eq!(f.error("email"), None);
    assert!(!f.is_touched("email"));
    assert_eq!(f.error("password").as_deref(), Some("Too short"));
    assert_eq!(f.error("confirm").as_deref(), Some("Server says no"));

    f.set_error("confirm", None);
    f.reset_field("password");
    assert!(f.is_valid());
}

/// Test that dropping an in-flight submit returns the form to idle.
#[test]
fn dropped_submit_releases_the_form() {
    let first = Rc::new(Cell::new(true));
    let f = {
        let first = first.clone();
        form(json!({ "q": "rust" }))
            .on_submit(move |values| {
                let hang = first.replace(false);
                async move {
                    if hang {
                        future::pending::<()>().await;
                    }
                    Ok::<_, BoxError>(values)
                }
            })
            .build()
    };

    assert!(f.submit().now_or_never().is_none());

    assert!(!f.is_submitting());
    assert_eq!(f.status(), FormStatus::Idle);
    assert_eq!(f.submit_count(), 1);

    let retry = f.submit().now_or_never();
    assert!(matches!(retry, Some(Ok(_))));
    assert_eq!(f.submit_count(), 2);
}
