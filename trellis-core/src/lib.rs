//! Trellis Core
//!
//! This crate provides the runtime for the Trellis reactive state library.
//! It implements:
//!
//! - Reactive targets, computed values, effects and watchers with automatic
//!   dependency tracking
//! - Batched effect scheduling
//! - A builder for reactive instances with actions and owned effects
//! - A form layer with validation and async submission
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and the per-thread runtime
//! - `value`: The dynamic [`Value`] type stored in reactive targets
//! - `builder`: Declarative construction of reactive instances
//! - `form`: Form state, validators and submission
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use serde_json::json;
//! use trellis_core::{builder, effect};
//!
//! let counter = builder()
//!     .state(json!({ "n": 0 }))
//!     .computed("double", |c| c.get("n").as_f64().unwrap_or(0.0) * 2.0)
//!     .action("inc", |c, _| {
//!         let n = c.get("n").as_f64().unwrap_or(0.0);
//!         c.set("n", n + 1.0);
//!     })
//!     .build();
//!
//! let runs = Rc::new(Cell::new(0));
//! let _render = {
//!     let (counter, runs) = (counter.clone(), runs.clone());
//!     effect(move || {
//!         runs.set(runs.get() + 1);
//!         counter.get("double");
//!     })
//! };
//!
//! counter.call("inc", &[]).unwrap();
//! counter.call("inc", &[]).unwrap();
//!
//! assert_eq!(runs.get(), 3);
//! assert_eq!(counter.get("double").as_f64(), Some(4.0));
//! ```

pub mod builder;
pub mod error;
pub mod form;
pub mod reactive;
pub mod value;

pub use builder::{builder, state, Builder, Instance, SelectorSink};
pub use error::{BoxError, Error, Result};
pub use form::{form, Form, FormBuilder, FormConfig, FormStatus, SubmitError, Validator, Validity};
pub use reactive::{
    batch, computed, effect, reactive, untrack, watch, watch_getter, wrap, Cleanup, Computed,
    Effect, Reactive, Watch,
};
pub use value::Value;
