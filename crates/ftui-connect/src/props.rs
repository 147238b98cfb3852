#![forbid(unsafe_code)]

//! Prop objects and one-level shallow equality.
//!
//! A [`Props`] value is an immutable map from key to [`PropValue`], shared
//! behind an `Rc` so that cloning is cheap and identity can be checked in
//! O(1). Bindings cache their derived props as `Props` and compare each
//! recomputation against the cache with [`shallow_equal`].
//!
//! # Invariants
//!
//! 1. Equality is one level deep: scalars and strings compare by value,
//!    nested lists and objects compare by reference identity.
//! 2. Key order never affects equality.
//! 3. [`Props::empty()`] stands in for "no props" so a cache is never null.
//!
//! Note that `PropValue::Float(f64::NAN)` is never equal to itself, so a
//! selector that yields `NaN` reports a change on every recomputation.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::rc::Rc;

/// A single top-level prop value.
#[derive(Clone)]
pub enum PropValue {
    /// Absent or explicitly null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Immutable string, compared by content.
    Str(Rc<str>),
    /// Shared list, compared by identity.
    List(Rc<[PropValue]>),
    /// Nested prop object, compared by identity.
    Object(Props),
}

impl PropValue {
    /// Shallow comparison used by the change gate.
    ///
    /// Containers are equal only when they are the same allocation.
    #[must_use]
    pub fn shallow_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::List(v) => f.debug_list().entries(v.iter()).finish(),
            Self::Object(v) => fmt::Debug::fmt(v, f),
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<Vec<PropValue>> for PropValue {
    fn from(v: Vec<PropValue>) -> Self {
        Self::List(Rc::from(v))
    }
}

impl From<Props> for PropValue {
    fn from(v: Props) -> Self {
        Self::Object(v)
    }
}

/// An immutable, cheaply clonable prop object.
#[derive(Clone, Default)]
pub struct Props {
    entries: Rc<BTreeMap<Rc<str>, PropValue>>,
}

impl Props {
    /// The empty prop object.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Alias for [`Props::empty`], intended as the start of a builder chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of `self` with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
        Rc::make_mut(&mut self.entries).insert(key.into(), value.into());
        self
    }

    /// Look up a top-level value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of top-level keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the object has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.iter().map(|(k, v)| (&**k, v))
    }

    /// Iterate keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| &**k)
    }

    /// Whether both handles share the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }

    /// Overlay `derived` on top of `own`; derived keys win on collision.
    ///
    /// Returns one of the inputs unchanged when the other is empty.
    #[must_use]
    pub fn merge(own: &Self, derived: &Self) -> Self {
        if derived.is_empty() {
            return own.clone();
        }
        if own.is_empty() {
            return derived.clone();
        }
        let mut entries = (*own.entries).clone();
        for (k, v) in derived.entries.iter() {
            entries.insert(Rc::clone(k), v.clone());
        }
        Self {
            entries: Rc::new(entries),
        }
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (&**k, v)))
            .finish()
    }
}

impl<K: Into<Rc<str>>, V: Into<PropValue>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries: BTreeMap<Rc<str>, PropValue> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Rc::new(entries),
        }
    }
}

impl<'a> IntoIterator for &'a Props {
    type Item = (&'a Rc<str>, &'a PropValue);
    type IntoIter = btree_map::Iter<'a, Rc<str>, PropValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// One-level-deep, order-independent comparison of two prop objects.
#[must_use]
pub fn shallow_equal(a: &Props, b: &Props) -> bool {
    if a.ptr_eq(b) {
        return true;
    }
    if a.len() != b.len() {
        return false;
    }
    a.entries.iter().all(|(k, va)| match b.entries.get(k) {
        Some(vb) => va.shallow_eq(vb),
        None => false,
    })
}
