//! Form Layer
//!
//! A [`Form`] keeps field values, validation errors and touched flags in
//! reactive targets, so effects bound to them update as the user types.
//!
//! # How Submission Works
//!
//! ```text
//! Idle -> Validating -> (invalid) -> Idle
//!                    -> (valid)   -> Submitting -> Idle
//! ```
//!
//! 1. `submitCount` is incremented and `isSubmitting` set.
//! 2. Every validator runs. Failures end the submit with
//!    [`SubmitError::Invalid`]; the handler is not called.
//! 3. The submit handler receives a plain snapshot of the values and is
//!    awaited. Its error, if any, comes back as [`SubmitError::Handler`].
//!
//! Values and errors are left as they are after a submit; call
//! [`Form::reset`] to start over.

mod config;
pub mod validators;

pub use config::FormConfig;
pub use validators::{Validator, Validity, GENERIC_VALIDATION_MESSAGE};

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use indexmap::IndexMap;

use crate::error::BoxError;
use crate::reactive::{batch, Computed, Reactive};
use crate::Value;

type SubmitHandler =
    Rc<dyn Fn(serde_json::Value) -> LocalBoxFuture<'static, Result<serde_json::Value, BoxError>>>;

const SUBMIT_COUNT: &str = "submitCount";
const IS_SUBMITTING: &str = "isSubmitting";
const STATUS: &str = "status";

/// Where a form is in its submit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormStatus {
    Idle,
    Validating,
    Submitting,
}

impl FormStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormStatus::Idle => "idle",
            FormStatus::Validating => "validating",
            FormStatus::Submitting => "submitting",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "validating" => FormStatus::Validating,
            "submitting" => FormStatus::Submitting,
            _ => FormStatus::Idle,
        }
    }
}

/// Why a submit did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Validation failed. Carries the error message of each invalid field.
    #[error("form has {} invalid field(s)", .0.len())]
    Invalid(IndexMap<String, String>),

    #[error("submit handler failed: {0}")]
    Handler(#[source] BoxError),

    #[error("a submit is already in progress")]
    InProgress,
}

/// Staged form configuration. Finish with [`FormBuilder::build`].
pub struct FormBuilder {
    initial: serde_json::Map<String, serde_json::Value>,
    validators: IndexMap<String, Validator>,
    on_submit: Option<SubmitHandler>,
    config: FormConfig,
}

impl FormBuilder {
    /// Attach a validator to `field`. A second validator for the same field
    /// runs after the first.
    pub fn validator(mut self, field: &str, validator: Validator) -> Self {
        let combined = match self.validators.shift_remove(field) {
            Some(existing) => existing.and(validator),
            None => validator,
        };
        self.validators.insert(field.to_string(), combined);
        self
    }

    /// Set the async submit handler. It receives a plain snapshot of the
    /// values.
    pub fn on_submit<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + 'static,
        Fut: Future<Output = Result<serde_json::Value, BoxError>> + 'static,
    {
        self.on_submit = Some(Rc::new(move |values| handler(values).boxed_local()));
        self
    }

    pub fn config(mut self, config: FormConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Form {
        // Normalized through `Value` so that numbers compare the way the
        // live values serialize.
        let initial = match Value::from(serde_json::Value::Object(self.initial)).to_json() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        let values = Reactive::object_from_json(serde_json::Value::Object(initial.clone()));
        let errors = Reactive::object();
        let touched = Reactive::object();
        let meta = Reactive::object();
        meta.set(SUBMIT_COUNT, 0);
        meta.set(IS_SUBMITTING, false);
        meta.set(STATUS, FormStatus::Idle.as_str());

        let is_valid = {
            let errors = errors.clone();
            Computed::new(move || errors.is_empty())
        };
        let is_dirty = {
            let values = values.clone();
            let initial = serde_json::Value::Object(initial.clone());
            Computed::new(move || values.to_json_tracked() != initial)
        };
        let has_errors = {
            let is_valid = is_valid.clone();
            Computed::new(move || !is_valid.get())
        };

        tracing::debug!(
            fields = initial.len(),
            validators = self.validators.len(),
            "form built"
        );

        Form {
            inner: Rc::new(FormInner {
                initial,
                values,
                errors,
                touched,
                meta,
                validators: self.validators,
                on_submit: self.on_submit,
                config: self.config,
                is_valid,
                is_dirty,
                has_errors,
            }),
        }
    }
}

/// Start building a form from its initial values.
pub fn form(initial: serde_json::Value) -> FormBuilder {
    let initial = match initial {
        serde_json::Value::Object(map) => map,
        other => {
            tracing::warn!(found = %other, "form initial values are not an object; starting empty");
            serde_json::Map::new()
        }
    };
    FormBuilder {
        initial,
        validators: IndexMap::new(),
        on_submit: None,
        config: FormConfig::default(),
    }
}

struct FormInner {
    initial: serde_json::Map<String, serde_json::Value>,
    values: Reactive,
    errors: Reactive,
    touched: Reactive,
    meta: Reactive,
    validators: IndexMap<String, Validator>,
    on_submit: Option<SubmitHandler>,
    config: FormConfig,
    is_valid: Computed<bool>,
    is_dirty: Computed<bool>,
    has_errors: Computed<bool>,
}

/// Reactive form state with validation and async submission.
#[derive(Clone)]
pub struct Form {
    inner: Rc<FormInner>,
}

impl Form {
    pub fn values(&self) -> &Reactive {
        &self.inner.values
    }

    /// Field → message. A field without an error has no key.
    pub fn errors(&self) -> &Reactive {
        &self.inner.errors
    }

    pub fn touched(&self) -> &Reactive {
        &self.inner.touched
    }

    pub fn config(&self) -> &FormConfig {
        &self.inner.config
    }

    pub fn value(&self, field: &str) -> Value {
        self.inner.values.get(field)
    }

    pub fn error(&self, field: &str) -> Option<String> {
        self.inner.errors.get(field).as_str().map(str::to_string)
    }

    pub fn is_touched(&self, field: &str) -> bool {
        self.inner.touched.get(field).is_truthy()
    }

    /// Field names in initial order, followed by fields added later.
    pub fn field_names(&self) -> Vec<String> {
        self.inner.values.keys()
    }

    // ------------------------------------------------------------------
    // Derived state
    // ------------------------------------------------------------------

    /// No field has an error.
    pub fn is_valid(&self) -> bool {
        self.inner.is_valid.get()
    }

    /// Some value differs from the initial snapshot.
    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty.get()
    }

    pub fn has_errors(&self) -> bool {
        self.inner.has_errors.get()
    }

    pub fn should_show_error(&self, field: &str) -> bool {
        self.is_touched(field) && self.inner.errors.get(field).is_truthy()
    }

    pub fn submit_count(&self) -> u64 {
        self.inner
            .meta
            .get(SUBMIT_COUNT)
            .as_i64()
            .map_or(0, |n| n.max(0) as u64)
    }

    pub fn is_submitting(&self) -> bool {
        self.inner.meta.get(IS_SUBMITTING).is_truthy()
    }

    pub fn status(&self) -> FormStatus {
        FormStatus::parse(self.inner.meta.get(STATUS).as_str().unwrap_or_default())
    }

    /// Plain snapshot of the values. Records no dependencies.
    pub fn to_object(&self) -> serde_json::Value {
        self.inner.values.to_json()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write a field, then touch and validate it per the form config.
    pub fn set_value(&self, field: &str, value: impl Into<Value>) {
        batch(|| {
            self.inner.values.set(field, value);
            if self.inner.config.touch_on_change {
                self.inner.touched.set(field, true);
            }
            if self.inner.config.validate_on_change {
                self.validate_field(field);
            }
        });
    }

    /// [`Form::set_value`] for several fields inside one batch.
    pub fn set_values<K, V>(&self, patch: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        batch(|| {
            for (field, value) in patch {
                self.set_value(field.as_ref(), value);
            }
        });
    }

    pub fn set_touched(&self, field: &str, touched: bool) {
        self.inner.touched.set(field, touched);
    }

    /// The field lost focus: touch it and validate per the form config.
    pub fn blur(&self, field: &str) {
        batch(|| {
            self.inner.touched.set(field, true);
            if self.inner.config.validate_on_blur {
                self.validate_field(field);
            }
        });
    }

    /// Set or clear a field's error by hand.
    pub fn set_error(&self, field: &str, message: Option<String>) {
        match message {
            Some(message) => self.inner.errors.set(field, message),
            None => {
                self.inner.errors.remove(field);
            }
        }
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Run the validator of `field`, if it has one, and record the outcome.
    /// Returns whether the field is valid.
    pub fn validate_field(&self, field: &str) -> bool {
        let Some(validator) = self.inner.validators.get(field) else {
            return true;
        };
        let value = self.inner.values.peek(field);
        let outcome = validator.run(&value, &self.inner.values, field);
        let valid = outcome.is_none();
        self.set_error(field, outcome);
        valid
    }

    /// Run every validator. Touched flags are left alone.
    pub fn validate(&self) -> bool {
        batch(|| {
            self.inner
                .validators
                .keys()
                .fold(true, |valid, field| self.validate_field(field) && valid)
        })
    }

    fn error_map(&self) -> IndexMap<String, String> {
        self.inner
            .errors
            .to_json()
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(field, message)| {
                        message.as_str().map(|m| (field.clone(), m.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    fn set_status(&self, status: FormStatus) {
        self.inner.meta.set(STATUS, status.as_str());
    }

    fn finish_submit(&self) {
        batch(|| {
            self.inner.meta.set(IS_SUBMITTING, false);
            self.set_status(FormStatus::Idle);
        });
    }

    /// Validate and, if valid, hand the values to the submit handler.
    ///
    /// Without a handler a valid submit resolves to the values snapshot.
    pub async fn submit(&self) -> Result<serde_json::Value, SubmitError> {
        if self.inner.meta.peek(IS_SUBMITTING).is_truthy() {
            return Err(SubmitError::InProgress);
        }

        let valid = batch(|| {
            let count = self.inner.meta.peek(SUBMIT_COUNT).as_f64().unwrap_or(0.0);
            self.inner.meta.set(SUBMIT_COUNT, count + 1.0);
            self.inner.meta.set(IS_SUBMITTING, true);
            self.set_status(FormStatus::Validating);

            if self.inner.config.touch_on_submit {
                let fields = self.inner.values.keys();
                for field in fields.iter().chain(self.inner.validators.keys()) {
                    self.inner.touched.set(field, true);
                }
            }
            self.validate()
        });
        // Back to idle on every exit, including a dropped future.
        let _in_flight = SubmitGuard(self);

        if !valid {
            let errors = self.error_map();
            tracing::debug!(invalid = errors.len(), "submit rejected by validation");
            return Err(SubmitError::Invalid(errors));
        }

        self.set_status(FormStatus::Submitting);
        let snapshot = self.to_object();
        let outcome = match &self.inner.on_submit {
            Some(handler) => handler(snapshot).await,
            None => Ok(snapshot),
        };

        outcome.map_err(|err| {
            tracing::warn!(error = %err, "submit handler failed");
            SubmitError::Handler(err)
        })
    }

    // ------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------

    /// Restore every value from the initial snapshot and clear errors and
    /// touched flags. Validators do not run. The submit count is kept.
    pub fn reset(&self) {
        batch(|| {
            let values = &self.inner.values;
            for field in values.keys() {
                if !self.inner.initial.contains_key(&field) {
                    values.remove(&field);
                }
            }
            for (field, value) in &self.inner.initial {
                values.set(field, Value::from(value.clone()));
            }
            self.inner.errors.clear();
            self.inner.touched.clear();
        });
        tracing::debug!("form reset");
    }

    /// Restore one field from the initial snapshot and clear its error and
    /// touched flag.
    pub fn reset_field(&self, field: &str) {
        batch(|| {
            match self.inner.initial.get(field) {
                Some(value) => self.inner.values.set(field, Value::from(value.clone())),
                None => {
                    self.inner.values.remove(field);
                }
            }
            self.inner.errors.remove(field);
            self.inner.touched.remove(field);
        });
    }
}

/// Ends a submit when dropped.
struct SubmitGuard<'a>(&'a Form);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_submit();
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("values", &self.inner.values)
            .field("errors", &self.inner.errors)
            .field("touched", &self.inner.touched)
            .field("status", &self.status())
            .finish()
    }
}
