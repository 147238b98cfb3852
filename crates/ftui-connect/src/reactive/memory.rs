#![forbid(unsafe_code)]

//! In-process reference [`Store`] implementation.
//!
//! `MemoryStore` keeps keyed [`PropValue`]s behind `Rc<RefCell<..>>` and
//! notifies listeners after every effective change. It exists for embedders
//! without a store of their own, and for tests and benchmarks.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes a value.
//! 2. Listeners are notified in registration order.
//! 3. Setting a value shallow-equal to the current one is a no-op (no
//!    version bump, no notification).
//! 4. A released listener is never called again, even if it was released
//!    by another listener earlier in the same notification cycle.
//! 5. Inside [`batch`](MemoryStore::batch), values update immediately but
//!    listeners are notified once, when the outermost batch exits.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::store::{Listener, Store, Subscription};
use crate::props::PropValue;

struct ListenerEntry {
    id: u64,
    active: Cell<bool>,
    callback: Listener,
}

#[derive(Default)]
struct StoreInner {
    values: BTreeMap<Rc<str>, PropValue>,
    version: u64,
    listeners: Vec<Rc<ListenerEntry>>,
    next_listener_id: u64,
    batch_depth: u32,
    batch_dirty: bool,
}

/// A keyed in-memory store with change notification.
///
/// Cloning a `MemoryStore` yields another handle to the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, notifying listeners if the value changed.
    ///
    /// Returns whether the stored value changed.
    pub fn set(&self, key: impl Into<Rc<str>>, value: impl Into<PropValue>) -> bool {
        let key = key.into();
        let value = value.into();
        {
            let mut inner = self.inner.borrow_mut();
            if inner.values.get(&key).is_some_and(|old| old.shallow_eq(&value)) {
                return false;
            }
            inner.values.insert(key, value);
            inner.version += 1;
        }
        self.changed();
        true
    }

    /// Remove `key`, notifying listeners if it was present.
    pub fn remove(&self, key: &str) -> Option<PropValue> {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let removed = inner.values.remove(key);
            if removed.is_some() {
                inner.version += 1;
            }
            removed
        };
        if removed.is_some() {
            self.changed();
        }
        removed
    }

    /// Read a value without going through a [`Select`](super::Select).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<PropValue> {
        self.inner.borrow().values.get(key).cloned()
    }

    /// Notify listeners even though no value changed.
    ///
    /// Stores backed by external data use this to signal "something may
    /// have changed"; bindings then rely on their change gate to suppress
    /// redundant renders.
    pub fn touch(&self) {
        self.changed();
    }

    /// Run `f` with notifications deferred until the outermost batch exits.
    pub fn batch<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        let result = {
            let _depth = BatchDepth::enter(&self.inner);
            f(self)
        };
        let flush = {
            let mut inner = self.inner.borrow_mut();
            if inner.batch_depth == 0 && inner.batch_dirty {
                inner.batch_dirty = false;
                true
            } else {
                false
            }
        };
        if flush {
            self.notify();
        }
        result
    }

    /// Number of effective mutations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    fn changed(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.batch_depth > 0 {
                inner.batch_dirty = true;
                return;
            }
        }
        self.notify();
    }

    fn notify(&self) {
        // Snapshot so listeners may subscribe, unsubscribe, or write back.
        let listeners: Vec<Rc<ListenerEntry>> = self.inner.borrow().listeners.clone();
        for entry in listeners {
            if entry.active.get() {
                (entry.callback)();
            }
        }
    }
}

impl Store for MemoryStore {
    fn subscribe(&self, listener: Listener) -> Subscription {
        let entry = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            let entry = Rc::new(ListenerEntry {
                id,
                active: Cell::new(true),
                callback: listener,
            });
            inner.listeners.push(Rc::clone(&entry));
            entry
        };
        let weak: Weak<RefCell<StoreInner>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            entry.active.set(false);
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().listeners.retain(|e| e.id != entry.id);
            }
        })
    }

    fn select(&self, key: &str) -> Option<PropValue> {
        self.get(key)
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("MemoryStore")
            .field("keys", &inner.values.len())
            .field("version", &inner.version)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

struct BatchDepth<'a> {
    inner: &'a RefCell<StoreInner>,
}

impl<'a> BatchDepth<'a> {
    fn enter(inner: &'a RefCell<StoreInner>) -> Self {
        inner.borrow_mut().batch_depth += 1;
        Self { inner }
    }
}

impl Drop for BatchDepth<'_> {
    fn drop(&mut self) {
        self.inner.borrow_mut().batch_depth -= 1;
    }
}
