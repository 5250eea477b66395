//! Patch partitioning for [`Instance::update`](super::Instance::update).
//!
//! A patch mixes plain state keys with selector-like keys. Plain keys are
//! written to the instance's state; selector keys are handed, untouched, to
//! whatever [`SelectorSink`] the host installed.

use crate::Value;

/// Receiver for selector-keyed entries of an update patch.
pub trait SelectorSink {
    fn apply(&self, selector: &str, value: &Value);
}

impl<F> SelectorSink for F
where
    F: Fn(&str, &Value),
{
    fn apply(&self, selector: &str, value: &Value) {
        self(selector, value)
    }
}

const LEADING: &[char] = &['#', '.', '[', ':', '*', '>', '~', '+'];
const PUNCTUATION: &[char] = &[
    '#', '.', '[', ']', ':', '>', '~', '+', ',', '*', '(', ')', '=', '\'', '"',
];

/// Whether `key` looks like a CSS selector rather than a state key.
pub fn is_selector_key(key: &str) -> bool {
    key.starts_with(LEADING)
        || key
            .chars()
            .any(|c| c.is_whitespace() || PUNCTUATION.contains(&c))
}
