#![forbid(unsafe_code)]

//! Store abstraction consumed by connected bindings.
//!
//! - [`Store`]: the observable store interface (`subscribe` + `select`).
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`Select`]: read accessor handed to selectors.
//! - [`MemoryStore`]: a keyed in-process store implementing [`Store`].
//!
//! # Architecture
//!
//! Stores are shared through [`StoreHandle`] (`Rc<dyn Store>`), so identity is
//! pointer identity. Listeners are plain `Rc<dyn Fn()>` callbacks with no
//! payload: a notification only says "something changed", and each binding
//! decides for itself whether that matters by re-running its selector.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{Listener, Select, Store, StoreHandle, Subscription, same_store};
