#![forbid(unsafe_code)]

//! Ambient store and delivery-mode provider.
//!
//! A [`ConnectContext`] hands the store handle, the shared scheduler, and the
//! delivery mode down to every binding created through it. Subtrees can force
//! a different mode with a scoped [`ModeOverride`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::binding::{Binding, BindingInputs, DeliveryMode, Selector};
use crate::config::ConnectConfig;
use crate::props::Props;
use crate::reactive::StoreHandle;
use crate::scheduler::BatchScheduler;
use crate::tick::TickSource;

/// Store, scheduler, and delivery mode shared by a tree of bindings.
#[derive(Clone, Debug)]
pub struct ConnectContext {
    store: StoreHandle,
    scheduler: BatchScheduler,
    base_mode: Rc<Cell<DeliveryMode>>,
    overrides: Rc<RefCell<Vec<DeliveryMode>>>,
}

impl ConnectContext {
    /// Create a context with its own scheduler driven by `ticks`.
    #[must_use]
    pub fn new(store: StoreHandle, ticks: Rc<dyn TickSource>, config: ConnectConfig) -> Self {
        let scheduler = BatchScheduler::with_config(ticks, config.scheduler);
        Self::from_parts(store, scheduler, config.default_mode)
    }

    /// Create a context around an existing scheduler.
    #[must_use]
    pub fn from_parts(store: StoreHandle, scheduler: BatchScheduler, mode: DeliveryMode) -> Self {
        Self {
            store,
            scheduler,
            base_mode: Rc::new(Cell::new(mode)),
            overrides: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Derive a context for a subtree connected to a different store.
    ///
    /// The scheduler, base mode, and override stack stay shared.
    #[must_use]
    pub fn with_store(&self, store: StoreHandle) -> Self {
        Self {
            store,
            ..self.clone()
        }
    }

    /// Active delivery mode, honoring the innermost override.
    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        self.overrides
            .borrow()
            .last()
            .copied()
            .unwrap_or_else(|| self.base_mode.get())
    }

    /// Delivery mode without considering overrides.
    #[must_use]
    pub fn base_mode(&self) -> DeliveryMode {
        self.base_mode.get()
    }

    /// Set the base delivery mode.
    ///
    /// Existing bindings pick it up the next time the host feeds them
    /// [`inputs`](Self::inputs).
    pub fn set_mode(&self, mode: DeliveryMode) {
        self.base_mode.set(mode);
    }

    /// Push a scoped mode override. Dropping the guard restores the prior mode.
    #[must_use = "dropping this guard clears the mode override"]
    pub fn push_mode(&self, mode: DeliveryMode) -> ModeOverride {
        self.overrides.borrow_mut().push(mode);
        ModeOverride {
            stack: Rc::clone(&self.overrides),
            mode,
        }
    }

    /// The ambient store.
    #[must_use]
    pub fn store(&self) -> StoreHandle {
        Rc::clone(&self.store)
    }

    /// The shared scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }

    /// Create a binding against the ambient store and the active mode.
    pub fn bind(&self, selector: Selector, own_props: Props) -> Binding {
        Binding::new(self, selector, own_props)
    }

    /// Inputs for [`Binding::receive`] carrying the ambient store and mode.
    #[must_use]
    pub fn inputs(&self, own_props: Props) -> BindingInputs {
        BindingInputs {
            own_props,
            store: self.store(),
            mode: self.mode(),
        }
    }
}

/// Guard for a scoped delivery-mode override.
#[derive(Debug)]
pub struct ModeOverride {
    stack: Rc<RefCell<Vec<DeliveryMode>>>,
    mode: DeliveryMode,
}

impl ModeOverride {
    /// The mode this guard pushed.
    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }
}

impl Drop for ModeOverride {
    fn drop(&mut self) {
        let popped = self.stack.borrow_mut().pop();
        if let Some(popped) = popped {
            debug_assert_eq!(popped, self.mode);
        }
    }
}
