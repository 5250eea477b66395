//! Field validators.
//!
//! A validator looks at one field's value (plus every other value, for
//! cross-field rules) and reports [`Validity`]. Validators may also fail
//! outright; a failing validator marks its field invalid with
//! [`GENERIC_VALIDATION_MESSAGE`] instead of aborting the whole form.

use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::BoxError;
use crate::reactive::{untrack, Reactive};
use crate::Value;

/// Message shown for a field whose validator returned an error.
pub const GENERIC_VALIDATION_MESSAGE: &str = "Invalid value";

/// Outcome of validating one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid(String),
}

impl Validity {
    /// `Valid` when `ok`, otherwise `Invalid(message)`.
    pub fn check(ok: bool, message: impl Into<String>) -> Self {
        if ok {
            Validity::Valid
        } else {
            Validity::Invalid(message.into())
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }
}

type ValidateFn = dyn Fn(&Value, &Reactive, &str) -> Result<Validity, BoxError>;

/// A field validator: `(value, all_values, field) -> Validity`.
#[derive(Clone)]
pub struct Validator(Rc<ValidateFn>);

impl Validator {
    /// Wrap an infallible rule.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &Reactive, &str) -> Validity + 'static,
    {
        Self(Rc::new(move |value: &Value, values: &Reactive, field: &str| {
            Ok(f(value, values, field))
        }))
    }

    /// Wrap a rule that may fail.
    pub fn try_new<F>(f: F) -> Self
    where
        F: Fn(&Value, &Reactive, &str) -> Result<Validity, BoxError> + 'static,
    {
        Self(Rc::new(f))
    }

    /// Run `self`, then `next` if `self` passed.
    pub fn and(self, next: Validator) -> Self {
        Self::all([self, next])
    }

    /// Run each validator in order; the first failure wins.
    pub fn all(validators: impl IntoIterator<Item = Validator>) -> Self {
        let chain: Vec<Validator> = validators.into_iter().collect();
        Self(Rc::new(move |value: &Value, values: &Reactive, field: &str| {
            for validator in &chain {
                let outcome = (validator.0)(value, values, field)?;
                if !outcome.is_valid() {
                    return Ok(outcome);
                }
            }
            Ok(Validity::Valid)
        }))
    }

    /// Validate `field`, returning the error message if it is invalid.
    /// Reads are untracked.
    pub(crate) fn run(&self, value: &Value, values: &Reactive, field: &str) -> Option<String> {
        match untrack(|| (self.0)(value, values, field)) {
            Ok(Validity::Valid) => None,
            Ok(Validity::Invalid(message)) => Some(message),
            Err(err) => {
                tracing::warn!(field, error = %err, "validator failed");
                Some(GENERIC_VALIDATION_MESSAGE.to_string())
            }
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator")
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => untrack(|| items.is_empty()),
        _ => false,
    }
}

fn text_len(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(untrack(|| items.len())),
        _ => None,
    }
}

/// Email shape: one `@`, a non-empty local part and a dotted domain, no
/// whitespace.
static EMAIL_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$"));

// ============================================================================
// Built-in Validators
// ============================================================================

/// Fails on `null`, blank strings and empty arrays.
pub fn required(message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |value, _, _| Validity::check(!is_blank(value), message.clone()))
}

/// Fails on non-empty strings that do not look like an email address.
/// Blank values pass; combine with [`required`] to reject them.
pub fn email(message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::try_new(move |value, _, _| match value {
        Value::String(s) if !s.is_empty() => {
            let pattern = EMAIL_PATTERN.as_ref().map_err(Clone::clone)?;
            Ok(Validity::check(pattern.is_match(s), message.clone()))
        }
        _ => Ok(Validity::Valid),
    })
}

/// String length (in characters) or array length at least `min`.
pub fn min_length(min: usize, message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |value, _, _| match text_len(value) {
        Some(len) if len > 0 => Validity::check(len >= min, message.clone()),
        _ => Validity::Valid,
    })
}

/// String length (in characters) or array length at most `max`.
pub fn max_length(max: usize, message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |value, _, _| match text_len(value) {
        Some(len) => Validity::check(len <= max, message.clone()),
        None => Validity::Valid,
    })
}

/// Number at least `min`. Non-numbers pass.
pub fn min(min: f64, message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |value, _, _| match value.as_f64() {
        Some(n) => Validity::check(n >= min, message.clone()),
        None => Validity::Valid,
    })
}

/// Number at most `max`. Non-numbers pass.
pub fn max(max: f64, message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |value, _, _| match value.as_f64() {
        Some(n) => Validity::check(n <= max, message.clone()),
        None => Validity::Valid,
    })
}

/// Equal to the value of `other` (e.g. password confirmation).
pub fn matches_field(other: impl Into<String>, message: impl Into<String>) -> Validator {
    let (other, message) = (other.into(), message.into());
    Validator::new(move |value, values, _| {
        Validity::check(value.same_value(&values.peek(&other)), message.clone())
    })
}
