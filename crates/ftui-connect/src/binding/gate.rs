#![forbid(unsafe_code)]

//! Selector recomputation and the change gate.
//!
//! Every path that can change derived props funnels through two steps:
//! `compute` invokes the selector with no internal borrow held, and `adopt`
//! shallow-compares the result against the cache and replaces the cache only
//! when something changed. Shallow-equal output is the main redundant-render
//! suppressor under store churn.
//!
//! Selector panics are not caught; they reach whoever triggered the
//! recomputation (a store notify, a scheduler tick, or the host's call).

use std::rc::Rc;

use tracing::trace;

use super::{BindingCore, DeliveryMode, Phase};
use crate::error::Result;
use crate::props::{Props, shallow_equal};
use crate::reactive::{Select, StoreHandle};
use crate::slot::BindingId;

/// Outcome of one pass through the change gate.
#[derive(Debug, Clone)]
pub struct Recompute {
    /// Whether the new output differed from the cached derived props.
    pub changed: bool,
    /// The selector output (the empty object if it returned `None`).
    pub next_props: Props,
}

/// Inputs supplied by the host when it re-renders the owning component.
#[derive(Debug, Clone)]
pub struct BindingInputs {
    /// The component's own props.
    pub own_props: Props,
    /// Store the binding should be connected to.
    pub store: StoreHandle,
    /// Delivery mode from ambient context.
    pub mode: DeliveryMode,
}

/// Whether the host must re-render, and why.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderDecision {
    /// Render required.
    pub needs_render: bool,
    /// Own props changed, or the store identity changed.
    pub props_changed: bool,
    /// Recomputed derived props differ from the cache.
    pub derived_changed: bool,
    /// Delivery mode changed.
    pub mode_changed: bool,
    /// A store notification had already marked the binding dirty.
    pub pending_update: bool,
}

/// Payload of the render-ready signal.
#[derive(Debug, Clone)]
pub struct RenderReady {
    /// Binding that needs to re-render.
    pub id: BindingId,
    /// Own props overlaid by the new derived props.
    pub props: Props,
}

impl BindingCore {
    pub(super) fn compute(&self) -> Props {
        let (own_props, store) = {
            let record = self.record.borrow();
            (record.own_props.clone(), Rc::clone(&record.store))
        };
        let select = Select::new(&*store);
        let next = (self.selector)(&select, &own_props, &store).unwrap_or_default();
        trace!(binding = %self.id, reads = select.reads(), keys = next.len(), "selector ran");
        next
    }

    pub(super) fn adopt(&self, next: Props) -> Recompute {
        let mut record = self.record.borrow_mut();
        record.has_queued_run = false;
        record.recomputes += 1;
        if shallow_equal(&record.derived, &next) {
            return Recompute {
                changed: false,
                next_props: next,
            };
        }
        record.derived = next.clone();
        Recompute {
            changed: true,
            next_props: next,
        }
    }

    /// The gate as seen by store notifications and the host.
    pub(super) fn recompute(&self) -> Recompute {
        {
            let mut record = self.record.borrow_mut();
            if !record.phase.can_run() {
                if record.phase == Phase::Constructing {
                    record.has_queued_run = true;
                }
                return Recompute {
                    changed: false,
                    next_props: record.derived.clone(),
                };
            }
        }
        let next = self.compute();
        // The selector may have unmounted this binding.
        if !self.record.borrow().phase.can_run() {
            return Recompute {
                changed: false,
                next_props: next,
            };
        }
        self.adopt(next)
    }

    /// Recompute and, on change, mark dirty and raise the render-ready signal.
    pub(super) fn run_store_gate(&self) -> Recompute {
        let outcome = self.recompute();
        if outcome.changed {
            self.record.borrow_mut().dirty = true;
            self.signal_render();
        }
        outcome
    }

    /// Recompute after the store identity changed.
    ///
    /// Before mount the result is adopted directly, as at construction, so
    /// the first render never shows data from the released store. Once
    /// mounted this is the store gate.
    pub(super) fn store_swapped(&self) -> Recompute {
        if self.record.borrow().phase == Phase::Constructing {
            let next = self.compute();
            return self.adopt(next);
        }
        self.run_store_gate()
    }

    pub(super) fn signal_render(&self) {
        let Some(callback) = self.render_request.borrow().clone() else {
            return;
        };
        let props = {
            let record = self.record.borrow();
            Props::merge(&record.own_props, &record.derived)
        };
        callback(&RenderReady { id: self.id, props });
    }

    pub(super) fn receive(self: &Rc<Self>, inputs: BindingInputs) -> Result<RenderDecision> {
        let BindingInputs {
            own_props,
            store,
            mode,
        } = inputs;
        self.record.borrow().phase.ensure_live("update")?;

        let store_changed = self.swap_store(&store)?;
        let (mode_changed, _) = self.swap_mode(mode)?;
        let own_changed = {
            let mut record = self.record.borrow_mut();
            let changed = !(record.own_props.ptr_eq(&own_props)
                || shallow_equal(&record.own_props, &own_props));
            record.own_props = own_props;
            changed
        };
        let props_changed = own_changed || store_changed;

        let derived_changed = if props_changed || mode_changed {
            // Memoized: the adopted result is what the following render uses.
            let next = self.compute();
            if !self.record.borrow().phase.is_live() {
                false
            } else {
                self.adopt(next).changed
            }
        } else {
            false
        };

        let pending_update = self.record.borrow().dirty;
        let decision = RenderDecision {
            needs_render: props_changed || derived_changed || mode_changed || pending_update,
            props_changed,
            derived_changed,
            mode_changed,
            pending_update,
        };
        trace!(binding = %self.id, ?decision, "render decision");
        Ok(decision)
    }
}
