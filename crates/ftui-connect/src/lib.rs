#![forbid(unsafe_code)]

//! Store-connected bindings for FrankenTUI components.
//!
//! A component that reads shared application state gets a [`Binding`]: it
//! subscribes to a [`Store`], runs a selector to derive props, and tells the
//! host to re-render only when those derived props actually changed.
//!
//! This crate provides:
//! - [`Binding`] with its lifecycle ([`Phase`]) and change gate
//! - [`BatchScheduler`] for frame-batched, coalesced delivery
//! - [`ConnectContext`] for handing the store and [`DeliveryMode`] down a tree
//! - [`Props`] / [`shallow_equal`] for the derived-prop comparison
//! - [`MemoryStore`] as a reference in-process [`Store`]
//!
//! # Architecture
//!
//! ```text
//!   Store ──notify──► Binding ─── Sync ───► change gate ──► render request
//!                       │                        ▲
//!                       └── Batched ──► BatchScheduler ──tick──┘
//!                                            ▲
//!                                       TickSource
//! ```
//!
//! Everything is single-threaded. Bindings, stores, and the scheduler share
//! state through `Rc`/`RefCell` and never hold a borrow while user code
//! (selectors, listeners, render callbacks) runs, so any callback may
//! re-enter the API.

pub mod binding;
pub mod config;
pub mod context;
pub mod error;
pub mod props;
pub mod reactive;
pub mod scheduler;
pub mod slot;
pub mod tick;

pub use binding::{
    Binding, BindingInputs, DeliveryMode, Phase, Recompute, RenderDecision, RenderReady, Selector,
};
pub use config::{ConnectConfig, SchedulerConfig};
pub use context::{ConnectContext, ModeOverride};
pub use error::{ConnectError, Result};
pub use props::{PropValue, Props, shallow_equal};
pub use reactive::{MemoryStore, Select, Store, StoreHandle, Subscription, same_store};
pub use scheduler::{BatchScheduler, SchedulerStats};
pub use slot::BindingId;
pub use tick::{ManualTickSource, TickSource};
