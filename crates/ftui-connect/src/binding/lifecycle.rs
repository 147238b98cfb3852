#![forbid(unsafe_code)]

//! Subscription lifecycle state machine.
//!
//! ```text
//!   Constructing ──mount──► Mounted ──unmount──► Unmounted
//!        │                                          ▲
//!        └───────────────unmount────────────────────┘
//! ```
//!
//! Delivery mode (`Sync` / `Batched`) is an orthogonal sub-state that may
//! change in either live phase.
//!
//! | Phase | Store notification | `set_store` / `set_mode` | `mount` |
//! |-------|--------------------|--------------------------|---------|
//! | Constructing | sets `has_queued_run` | allowed | → Mounted |
//! | Mounted | runs gate (sync) or enqueues (batched) | allowed | error |
//! | Unmounted | ignored | error | error |

use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::{BindingCore, DeliveryMode};
use crate::error::{ConnectError, Result};
use crate::reactive::{Listener, StoreHandle, same_store};

/// Lifecycle phase of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Built and subscribed, not yet mounted. Notifications are deferred.
    Constructing,
    /// Mounted; notifications drive recomputation.
    Mounted,
    /// Torn down; nothing runs any more.
    Unmounted,
}

impl Phase {
    /// Whether recomputation may run in response to notifications.
    #[inline]
    #[must_use]
    pub const fn can_run(self) -> bool {
        matches!(self, Self::Mounted)
    }

    /// Whether the binding still holds a subscription.
    #[inline]
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Unmounted)
    }

    fn mounted(self) -> Result<Self> {
        match self {
            Self::Constructing => Ok(Self::Mounted),
            phase => Err(ConnectError::InvalidTransition {
                phase,
                action: "mount",
            }),
        }
    }

    pub(super) fn ensure_live(self, action: &'static str) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(ConnectError::InvalidTransition {
                phase: self,
                action,
            })
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Constructing => "constructing",
            Self::Mounted => "mounted",
            Self::Unmounted => "unmounted",
        })
    }
}

pub(super) fn store_listener(core: Weak<BindingCore>) -> Listener {
    Rc::new(move || {
        if let Some(core) = core.upgrade() {
            core.on_store_change();
        }
    })
}

impl BindingCore {
    pub(super) fn subscribe_to(self: &Rc<Self>, store: &StoreHandle) {
        let sub = store.subscribe(store_listener(Rc::downgrade(self)));
        let stale = self.record.borrow_mut().subscription.replace(sub);
        debug_assert!(stale.is_none(), "binding held two live subscriptions");
        drop(stale);
    }

    pub(super) fn on_store_change(self: &Rc<Self>) {
        let mode = {
            let mut record = self.record.borrow_mut();
            let phase = record.phase;
            match phase {
                Phase::Constructing => {
                    record.has_queued_run = true;
                    trace!(binding = %self.id, "notification before mount deferred");
                    return;
                }
                Phase::Unmounted => {
                    trace!(binding = %self.id, "notification after unmount ignored");
                    return;
                }
                Phase::Mounted => record.mode,
            }
        };
        match mode {
            DeliveryMode::Sync => {
                self.run_store_gate();
            }
            DeliveryMode::Batched => {
                let weak = Rc::downgrade(self);
                self.scheduler.enqueue(
                    self.id,
                    Box::new(move || {
                        if let Some(core) = weak.upgrade() {
                            core.run_store_gate();
                        }
                    }),
                );
            }
        }
    }

    pub(super) fn mount(&self) -> Result<()> {
        let queued = {
            let mut record = self.record.borrow_mut();
            record.phase = record.phase.mounted()?;
            record.has_queued_run
        };
        debug!(binding = %self.id, queued, "binding mounted");
        if queued {
            self.run_store_gate();
        }
        Ok(())
    }

    pub(super) fn unmount(&self) -> bool {
        let subscription = {
            let mut record = self.record.borrow_mut();
            if !record.phase.is_live() {
                return false;
            }
            record.phase = Phase::Unmounted;
            record.has_queued_run = false;
            record.dirty = false;
            record.subscription.take()
        };
        drop(subscription);
        let was_pending = self.scheduler.is_pending(self.id);
        self.scheduler.release_id(self.id);
        debug!(binding = %self.id, was_pending, "binding unmounted");
        true
    }

    /// Swap the store subscription. Returns whether the identity changed.
    pub(super) fn swap_store(self: &Rc<Self>, store: &StoreHandle) -> Result<bool> {
        let old_subscription = {
            let mut record = self.record.borrow_mut();
            record.phase.ensure_live("change the store of")?;
            if same_store(&record.store, store) {
                return Ok(false);
            }
            record.store = Rc::clone(store);
            record.subscription.take()
        };
        drop(old_subscription);
        self.subscribe_to(store);
        debug!(binding = %self.id, "store identity changed; resubscribed");
        Ok(true)
    }

    /// Switch delivery mode. Returns `(changed, cancelled_pending)`.
    pub(super) fn swap_mode(&self, mode: DeliveryMode) -> Result<(bool, bool)> {
        {
            let mut record = self.record.borrow_mut();
            record.phase.ensure_live("change the delivery mode of")?;
            if record.mode == mode {
                return Ok((false, false));
            }
            record.mode = mode;
        }
        let cancelled = self.scheduler.cancel(self.id);
        debug!(binding = %self.id, ?mode, cancelled, "delivery mode changed");
        Ok((true, cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_mounted_can_run() {
        assert!(!Phase::Constructing.can_run());
        assert!(Phase::Mounted.can_run());
        assert!(!Phase::Unmounted.can_run());
    }

    #[test]
    fn mount_only_from_constructing() {
        assert_eq!(Phase::Constructing.mounted(), Ok(Phase::Mounted));
        assert!(Phase::Mounted.mounted().is_err());
        assert_eq!(
            Phase::Unmounted.mounted(),
            Err(ConnectError::InvalidTransition {
                phase: Phase::Unmounted,
                action: "mount",
            })
        );
    }

    #[test]
    fn unmounted_is_not_live() {
        assert!(Phase::Constructing.ensure_live("x").is_ok());
        assert!(Phase::Mounted.ensure_live("x").is_ok());
        assert!(Phase::Unmounted.ensure_live("x").is_err());
    }

    #[test]
    fn display_names() {
        assert_eq!(Phase::Constructing.to_string(), "constructing");
        assert_eq!(Phase::Mounted.to_string(), "mounted");
        assert_eq!(Phase::Unmounted.to_string(), "unmounted");
    }
}
