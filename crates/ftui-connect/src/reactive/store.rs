#![forbid(unsafe_code)]

//! The store interface consumed by bindings.
//!
//! A store is anything that can notify listeners of changes and answer
//! keyed reads. Bindings never look inside a store: they hold a
//! [`StoreHandle`], subscribe a listener, and pass a [`Select`] accessor to
//! their selector on every recomputation.
//!
//! # Identity
//!
//! Two handles name the same store iff they point at the same allocation
//! ([`same_store`]). Structural comparison is never used: two stores with
//! equal contents are still different stores.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::props::PropValue;

/// Callback invoked by a store after its state changes.
pub type Listener = Rc<dyn Fn()>;

/// Shared handle to a store.
pub type StoreHandle = Rc<dyn Store>;

/// An observable store that bindings can subscribe to.
pub trait Store {
    /// Register `listener` to be called after every state change.
    ///
    /// The returned [`Subscription`] removes the listener when released.
    fn subscribe(&self, listener: Listener) -> Subscription;

    /// Read the value stored under `key`.
    fn select(&self, key: &str) -> Option<PropValue>;
}

impl fmt::Debug for dyn Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Store({:p})", self as *const dyn Store)
    }
}

/// Whether two handles refer to the same store instance.
#[must_use]
pub fn same_store(a: &StoreHandle, b: &StoreHandle) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units.
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// RAII unsubscribe capability returned by [`Store::subscribe`].
///
/// The release closure runs exactly once: on [`unsubscribe`](Self::unsubscribe)
/// or on drop, whichever comes first.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap a release closure.
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release.
    pub fn detached() -> Self {
        Self { release: None }
    }

    /// Release the subscription now.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    /// Whether the release closure has not run yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Read accessor handed to selectors.
///
/// Counts reads so tests and diagnostics can tell how much a selector touched.
pub struct Select<'a> {
    store: &'a dyn Store,
    reads: Cell<usize>,
}

impl<'a> Select<'a> {
    /// Create an accessor over `store`.
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            reads: Cell::new(0),
        }
    }

    /// Read the value under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<PropValue> {
        self.reads.set(self.reads.get() + 1);
        self.store.select(key)
    }

    /// Read the value under `key`, substituting [`PropValue::Null`] when absent.
    #[must_use]
    pub fn get_or_null(&self, key: &str) -> PropValue {
        self.get(key).unwrap_or(PropValue::Null)
    }

    /// Number of reads performed through this accessor.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl fmt::Debug for Select<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("reads", &self.reads.get())
            .finish()
    }
}
