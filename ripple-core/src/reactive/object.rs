//! Reactive Records
//!
//! A [`RawData`] is a plain, caller-owned record. A [`Reactive`] is a view over
//! one RawData that routes every property access through the dependency
//! store:
//!
//! 1. `get` records the read against the active effect, then returns the
//!    stored value.
//!
//! 2. `set` stores the value first, then notifies every effect that read the
//!    property. Subscribers that run synchronously therefore already see the
//!    new value.
//!
//! Dependencies are keyed by the record's identity, so any number of views
//! over the same RawData share one set of subscriptions.
//!
//! # Eviction
//!
//! When the last handle to a RawData is dropped, the store forgets every
//! dependency entry registered for it.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use indexmap::IndexMap;

use super::store;
use super::value::{Key, TargetId, Value};

struct RawInner {
    id: TargetId,
    fields: RefCell<IndexMap<Key, Value>>,
}

impl Drop for RawInner {
    fn drop(&mut self) {
        store::evict(self.id);
    }
}

/// A plain record: an insertion-ordered map from [`Key`] to [`Value`].
///
/// Cloning a RawData clones the handle, not the data. Reads and writes made
/// directly on a RawData are invisible to the reactive runtime; go through a
/// [`Reactive`] view to have them tracked and triggered.
#[derive(Clone)]
pub struct RawData {
    inner: Rc<RawInner>,
}

impl RawData {
    /// Create an empty record.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RawInner {
                id: TargetId::new(),
                fields: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Create a record from key/value pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let raw = Self::new();
        {
            let mut fields = raw.inner.fields.borrow_mut();
            for (key, value) in pairs {
                fields.insert(key.into(), value.into());
            }
        }
        raw
    }

    /// The identity token dependencies are keyed by.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Read a property without tracking. Missing keys read as `Null`.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        self.inner
            .fields
            .borrow()
            .get(&key.into())
            .cloned()
            .unwrap_or_default()
    }

    /// Write a property without notifying anyone.
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) {
        self.inner
            .fields
            .borrow_mut()
            .insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.inner.fields.borrow().contains_key(&key.into())
    }

    /// Property keys in insertion order.
    pub fn keys(&self) -> Vec<Key> {
        self.inner.fields.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RawData {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for RawData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Nested objects print as ids (see `Value`'s Debug), so cycles are fine.
        f.debug_struct("RawData")
            .field("id", &self.id())
            .field("fields", &*self.inner.fields.borrow())
            .finish()
    }
}

/// A tracked view over a [`RawData`].
///
/// # Example
///
/// ```rust,ignore
/// let data = Reactive::from_pairs([("a", 1)]);
///
/// Effect::new({
///     let data = data.clone();
///     move || println!("a = {}", data.get("a"))
/// });
///
/// data.set("a", 2); // prints "a = 2"
/// ```
#[derive(Clone)]
pub struct Reactive {
    raw: RawData,
}

/// Wrap `data` in a reactive view. Equivalent to [`Reactive::new`].
pub fn wrap(data: &RawData) -> Reactive {
    Reactive::new(data)
}

impl Reactive {
    /// Create a view over an existing record.
    pub fn new(raw: &RawData) -> Self {
        Self { raw: raw.clone() }
    }

    /// Create a fresh record from key/value pairs and wrap it.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            raw: RawData::from_pairs(pairs),
        }
    }

    /// The wrapped record.
    pub fn raw(&self) -> &RawData {
        &self.raw
    }

    pub fn id(&self) -> TargetId {
        self.raw.id()
    }

    /// Whether two views observe the same record.
    pub fn same_target(&self, other: &Reactive) -> bool {
        self.id() == other.id()
    }

    /// Read a property, subscribing the active effect (if any) to it.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        store::track(self.id(), &key);
        self.raw.get(key)
    }

    /// Read a nested record as a reactive view. Tracked like [`get`](Self::get).
    pub fn child(&self, key: impl Into<Key>) -> Option<Reactive> {
        self.get(key).as_reactive()
    }

    /// Write a property and re-run everything that depends on it.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        let key = key.into();
        self.raw.insert(key.clone(), value);
        store::trigger(self.id(), &key);
    }

    /// Read-modify-write: a tracked read followed by a triggering write.
    pub fn update<F, V>(&self, key: impl Into<Key>, f: F)
    where
        F: FnOnce(&Value) -> V,
        V: Into<Value>,
    {
        let key = key.into();
        let current = self.get(key.clone());
        self.set(key, f(&current));
    }

    /// Property keys in insertion order. Listing keys is not tracked.
    pub fn keys(&self) -> Vec<Key> {
        self.raw.keys()
    }
}

impl From<RawData> for Reactive {
    fn from(raw: RawData) -> Self {
        Self { raw }
    }
}

impl Debug for Reactive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Reactive").field(&self.raw).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set() {
        let data = Reactive::from_pairs([("a", 1)]);
        assert_eq!(data.get("a"), Value::Int(1));

        data.set("a", 42);
        assert_eq!(data.get("a"), Value::Int(42));
        assert!(data.get("missing").is_null());
    }

    #[test]
    fn update_applies_function() {
        let data = Reactive::from_pairs([("x", 10)]);
        data.update("x", |v| v.as_i64().unwrap_or(0) + 5);
        assert_eq!(data.get("x").as_i64(), Some(15));
    }

    #[test]
    fn views_share_the_record() {
        let raw = RawData::from_pairs([("a", 1)]);
        let first = wrap(&raw);
        let second = wrap(&raw);

        first.set("a", 7);
        assert_eq!(second.get("a").as_i64(), Some(7));
        assert_eq!(raw.get("a").as_i64(), Some(7));
        assert!(first.same_target(&second));
    }

    #[test]
    fn keys_keep_insertion_order() {
        let data = Reactive::from_pairs([("b", 1), ("a", 2)]);
        data.set("c", 3);
        let keys: Vec<String> = data.keys().iter().map(ToString::to_string).collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn child_returns_nested_view() {
        let inner = RawData::from_pairs([("n", 1)]);
        let outer = Reactive::from_pairs([("inner", Value::from(&inner))]);

        let child = outer.child("inner").unwrap();
        assert_eq!(child.id(), inner.id());
        assert!(outer.child("missing").is_none());
    }
}
