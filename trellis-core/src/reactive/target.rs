//! Reactive Targets
//!
//! A reactive target is a plain object or array whose reads and writes go
//! through explicit accessor methods instead of property syntax.
//!
//! # How Targets Work
//!
//! 1. A read inside a running computation records a dependency key for the
//!    location that was read: a named property, an array index, or the
//!    synthetic `Iterate` key for anything that depends on the shape of the
//!    target (key set, length, full iteration).
//!
//! 2. A write first compares the new value with the current one. Writes
//!    that do not change the value are dropped without notifying anyone.
//!
//! 3. A changing write stores the value, then notifies the subscribers of
//!    every key it touched inside a single batch frame.
//!
//! # Identity
//!
//! [`Reactive`] is a shared handle. Cloning it, or wrapping a value that
//! already holds it, yields the same target with the same [`TargetId`], so
//! dependencies are never tracked twice for one target.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use super::registry::DepKey;
use super::runtime::Runtime;
use crate::Value;

/// Unique identifier for a reactive target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// Shape of a reactive target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Object,
    Array,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Object => "object",
            TargetKind::Array => "array",
        }
    }
}

enum TargetData {
    Object(IndexMap<String, Value>),
    Array(Vec<Value>),
}

struct TargetCell {
    id: TargetId,
    data: RefCell<TargetData>,
}

/// Handle to a reactive object or array.
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<TargetCell>,
}

impl Reactive {
    fn from_data(data: TargetData) -> Self {
        Self {
            inner: Rc::new(TargetCell {
                id: TargetId::new(),
                data: RefCell::new(data),
            }),
        }
    }

    /// Create an empty reactive object.
    pub fn object() -> Self {
        Self::from_data(TargetData::Object(IndexMap::new()))
    }

    /// Create an empty reactive array.
    pub fn array() -> Self {
        Self::from_data(TargetData::Array(Vec::new()))
    }

    /// Create a reactive object from existing entries.
    pub fn object_from(entries: IndexMap<String, Value>) -> Self {
        Self::from_data(TargetData::Object(entries))
    }

    /// Create a reactive array from existing items.
    pub fn array_from(items: Vec<Value>) -> Self {
        Self::from_data(TargetData::Array(items))
    }

    /// Create a reactive object from a JSON object.
    ///
    /// Anything other than a JSON object produces an empty object.
    pub fn object_from_json(json: serde_json::Value) -> Self {
        match Value::from(json) {
            Value::Object(target) => target,
            other => {
                tracing::warn!(found = other.type_name(), "expected a JSON object; using an empty one");
                Self::object()
            }
        }
    }

    /// Get the target's unique ID.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn kind(&self) -> TargetKind {
        match &*self.inner.data.borrow() {
            TargetData::Object(_) => TargetKind::Object,
            TargetData::Array(_) => TargetKind::Array,
        }
    }

    pub fn is_object(&self) -> bool {
        self.kind() == TargetKind::Object
    }

    pub fn is_array(&self) -> bool {
        self.kind() == TargetKind::Array
    }

    /// Check whether two handles refer to the same target.
    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn track(&self, key: impl FnOnce() -> DepKey) {
        if Runtime::is_tracking() {
            Runtime::track(key());
        }
    }

    fn wrong_kind(&self, operation: &'static str) {
        tracing::warn!(
            target_id = ?self.id(),
            kind = self.kind().as_str(),
            operation,
            "operation does not apply to this target; ignoring"
        );
    }

    fn notify(&self, keys: impl IntoIterator<Item = DepKey>, change: Option<(&Value, &Value)>) {
        Runtime::batch(|| {
            for key in keys {
                let change = match key {
                    DepKey::Prop(..) | DepKey::Index(..) => change,
                    _ => None,
                };
                Runtime::trigger(&key, change);
            }
        });
    }

    // ------------------------------------------------------------------
    // Shape
    // ------------------------------------------------------------------

    /// Number of keys (object) or items (array). Tracks the target's shape.
    pub fn len(&self) -> usize {
        self.track(|| DepKey::Iterate(self.id()));
        match &*self.inner.data.borrow() {
            TargetData::Object(map) => map.len(),
            TargetData::Array(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every key or item.
    pub fn clear(&self) {
        let removed: Vec<(DepKey, Value)> = match &mut *self.inner.data.borrow_mut() {
            TargetData::Object(map) => map
                .drain(..)
                .map(|(key, old)| (DepKey::Prop(self.id(), key), old))
                .collect(),
            TargetData::Array(items) => items
                .drain(..)
                .enumerate()
                .map(|(index, old)| (DepKey::Index(self.id(), index), old))
                .collect(),
        };
        if removed.is_empty() {
            return;
        }
        Runtime::batch(|| {
            for (key, old) in &removed {
                self.notify([key.clone()], Some((&Value::Null, old)));
            }
            self.notify([DepKey::Iterate(self.id())], None);
        });
    }

    // ------------------------------------------------------------------
    // Object access
    // ------------------------------------------------------------------

    /// Read a property. Missing properties read as `Null`.
    pub fn get(&self, key: &str) -> Value {
        self.track(|| DepKey::Prop(self.id(), key.to_string()));
        self.peek(key)
    }

    /// Read a property without recording a dependency.
    pub fn peek(&self, key: &str) -> Value {
        match &*self.inner.data.borrow() {
            TargetData::Object(map) => map.get(key).cloned().unwrap_or_default(),
            TargetData::Array(_) => Value::Null,
        }
    }

    /// Check whether a property exists.
    pub fn has(&self, key: &str) -> bool {
        self.track(|| DepKey::Prop(self.id(), key.to_string()));
        match &*self.inner.data.borrow() {
            TargetData::Object(map) => map.contains_key(key),
            TargetData::Array(_) => false,
        }
    }

    /// Property names in insertion order. Tracks the key set.
    pub fn keys(&self) -> Vec<String> {
        self.track(|| DepKey::Iterate(self.id()));
        match &*self.inner.data.borrow() {
            TargetData::Object(map) => map.keys().cloned().collect(),
            TargetData::Array(_) => Vec::new(),
        }
    }

    /// Properties in insertion order. Tracks the key set and every value.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(&key);
                (key, value)
            })
            .collect()
    }

    /// Write a property, notifying subscribers if the value changed.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();

        let existing = match &*self.inner.data.borrow() {
            TargetData::Object(map) => Some(map.get(key).cloned()),
            TargetData::Array(_) => None,
        };
        let Some(existing) = existing else {
            self.wrong_kind("set");
            return;
        };
        if let Some(current) = &existing {
            if current.same_value(&value) {
                return;
            }
        }

        if let TargetData::Object(map) = &mut *self.inner.data.borrow_mut() {
            map.insert(key.to_string(), value.clone());
        }

        let old = existing.clone().unwrap_or_default();
        let prop = DepKey::Prop(self.id(), key.to_string());
        if existing.is_some() {
            self.notify([prop], Some((&value, &old)));
        } else {
            self.notify([prop, DepKey::Iterate(self.id())], Some((&value, &old)));
        }
    }

    /// Replace a property with a function of its current value.
    ///
    /// The current value is read without tracking.
    pub fn update(&self, key: &str, f: impl FnOnce(Value) -> Value) {
        let next = f(self.peek(key));
        self.set(key, next);
    }

    /// Delete a property, returning its previous value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = match &mut *self.inner.data.borrow_mut() {
            TargetData::Object(map) => map.shift_remove(key),
            TargetData::Array(_) => None,
        };
        let old = removed.clone()?;
        let prop = DepKey::Prop(self.id(), key.to_string());
        self.notify([prop, DepKey::Iterate(self.id())], Some((&Value::Null, &old)));
        removed
    }

    // ------------------------------------------------------------------
    // Array access
    // ------------------------------------------------------------------

    /// Read an array item. Out-of-range reads yield `Null`.
    pub fn at(&self, index: usize) -> Value {
        self.track(|| DepKey::Index(self.id(), index));
        match &*self.inner.data.borrow() {
            TargetData::Array(items) => items.get(index).cloned().unwrap_or_default(),
            TargetData::Object(_) => Value::Null,
        }
    }

    /// All items. Tracks the array's shape, which every mutation notifies.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track(|| DepKey::Iterate(self.id()));
        match &*self.inner.data.borrow() {
            TargetData::Array(items) => items.clone(),
            TargetData::Object(map) => map.values().cloned().collect(),
        }
    }

    pub fn iter(&self) -> std::vec::IntoIter<Value> {
        self.to_vec().into_iter()
    }

    /// Write an array item. Writing past the end pads with `Null`.
    pub fn set_at(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();

        let existing = match &*self.inner.data.borrow() {
            TargetData::Array(items) => items.get(index).cloned(),
            TargetData::Object(_) => None,
        };
        if !self.is_array() {
            self.wrong_kind("set_at");
            return;
        }
        if let Some(current) = &existing {
            if current.same_value(&value) {
                return;
            }
        }

        let old_len = {
            let mut data = self.inner.data.borrow_mut();
            let TargetData::Array(items) = &mut *data else {
                return;
            };
            let old_len = items.len();
            if index >= old_len {
                items.resize(index + 1, Value::Null);
            }
            items[index] = value.clone();
            old_len
        };

        let old = existing.unwrap_or_default();
        let keys = (old_len.min(index)..=index)
            .map(|i| DepKey::Index(self.id(), i))
            .chain(std::iter::once(DepKey::Iterate(self.id())));
        self.notify(keys, Some((&value, &old)));
    }

    /// Append an item, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        let index = match &mut *self.inner.data.borrow_mut() {
            TargetData::Array(items) => {
                items.push(value.clone());
                Some(items.len() - 1)
            }
            TargetData::Object(_) => None,
        };
        let Some(index) = index else {
            self.wrong_kind("push");
            return 0;
        };
        let keys = [DepKey::Index(self.id(), index), DepKey::Iterate(self.id())];
        self.notify(keys, Some((&value, &Value::Null)));
        index + 1
    }

    /// Remove and return the last item.
    pub fn pop(&self) -> Option<Value> {
        let popped = match &mut *self.inner.data.borrow_mut() {
            TargetData::Array(items) => items.pop().map(|value| (items.len(), value)),
            TargetData::Object(_) => None,
        };
        let (index, value) = popped?;
        let keys = [DepKey::Index(self.id(), index), DepKey::Iterate(self.id())];
        self.notify(keys, Some((&Value::Null, &value)));
        Some(value)
    }

    /// Remove `delete_count` items at `start` and insert `items` in their
    /// place, returning the removed items.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let items: Vec<Value> = items.into_iter().collect();
        let outcome = match &mut *self.inner.data.borrow_mut() {
            TargetData::Array(current) => {
                let old_len = current.len();
                let start = start.min(old_len);
                let end = start.saturating_add(delete_count).min(old_len);
                if start == end && items.is_empty() {
                    Some((start, old_len, old_len, Vec::new()))
                } else {
                    let removed: Vec<Value> = current.splice(start..end, items).collect();
                    Some((start, old_len, current.len(), removed))
                }
            }
            TargetData::Object(_) => None,
        };
        let Some((start, old_len, new_len, removed)) = outcome else {
            self.wrong_kind("splice");
            return Vec::new();
        };
        if old_len == new_len && removed.is_empty() {
            return removed;
        }

        let keys = (start..old_len.max(new_len))
            .map(|i| DepKey::Index(self.id(), i))
            .chain(std::iter::once(DepKey::Iterate(self.id())));
        self.notify(keys, None);
        removed
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Plain JSON copy of the target. Records no dependencies.
    ///
    /// A target nested inside itself renders as `null` at the point where
    /// it repeats.
    pub fn to_json(&self) -> serde_json::Value {
        self.snapshot(&mut Vec::new(), false)
    }

    /// Plain JSON copy of the target that depends on every nested location.
    pub fn to_json_tracked(&self) -> serde_json::Value {
        self.snapshot(&mut Vec::new(), true)
    }

    fn snapshot(&self, path: &mut Vec<TargetId>, tracked: bool) -> serde_json::Value {
        if path.contains(&self.id()) {
            tracing::trace!(target_id = ?self.id(), "cyclic target rendered as null");
            return serde_json::Value::Null;
        }
        path.push(self.id());

        let nested = |value: &Value, path: &mut Vec<TargetId>| match value {
            Value::Array(target) | Value::Object(target) => target.snapshot(path, tracked),
            primitive => primitive.to_json(),
        };
        let json = match self.kind() {
            TargetKind::Object => {
                let entries = if tracked { self.entries() } else { self.peek_entries() };
                serde_json::Value::Object(
                    entries
                        .into_iter()
                        .map(|(key, value)| (key, nested(&value, path)))
                        .collect(),
                )
            }
            TargetKind::Array => {
                let items = if tracked { self.to_vec() } else { self.peek_items() };
                serde_json::Value::Array(items.iter().map(|value| nested(value, path)).collect())
            }
        };

        path.pop();
        json
    }

    fn peek_entries(&self) -> Vec<(String, Value)> {
        match &*self.inner.data.borrow() {
            TargetData::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            TargetData::Array(_) => Vec::new(),
        }
    }

    fn peek_items(&self) -> Vec<Value> {
        match &*self.inner.data.borrow() {
            TargetData::Array(items) => items.clone(),
            TargetData::Object(_) => Vec::new(),
        }
    }

    /// Structural equality, without recording dependencies.
    ///
    /// Cycles compare equal when both sides repeat at the same point.
    pub fn deep_eq(&self, other: &Reactive) -> bool {
        self.deep_eq_within(other, &mut Vec::new())
    }

    fn deep_eq_within(&self, other: &Reactive, seen: &mut Vec<(TargetId, TargetId)>) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let pair = (self.id(), other.id());
        if seen.contains(&pair) {
            return true;
        }
        seen.push(pair);

        let same = |a: &Value, b: &Value, seen: &mut Vec<(TargetId, TargetId)>| match (a, b) {
            (Value::Array(x), Value::Array(y)) | (Value::Object(x), Value::Object(y)) => {
                x.deep_eq_within(y, seen)
            }
            _ => a.same_value(b),
        };
        let equal = match (&*self.inner.data.borrow(), &*other.inner.data.borrow()) {
            (TargetData::Object(a), TargetData::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && same(va, vb, seen))
            }
            (TargetData::Array(a), TargetData::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| same(x, y, seen))
            }
            _ => false,
        };

        seen.pop();
        equal
    }
}

/// Wrap a value for reactive access.
///
/// Objects and arrays are already reactive handles and come back as the
/// same target; primitives are returned unchanged.
pub fn wrap(value: Value) -> Value {
    value
}

/// Convert plain JSON into reactive data.
pub fn reactive(json: serde_json::Value) -> Value {
    Value::from(json)
}

impl Serialize for Reactive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl Debug for Reactive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactive")
            .field("id", &self.id())
            .field("value", &self.to_json())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
