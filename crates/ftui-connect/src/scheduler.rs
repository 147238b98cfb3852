#![forbid(unsafe_code)]

//! Frame-batched notification scheduler.
//!
//! Bindings in [`Batched`](crate::DeliveryMode::Batched) mode do not recompute
//! when their store notifies them. Instead they register a recompute action
//! here, and the scheduler runs those actions one per frame, in arrival order.
//!
//! # Invariants
//!
//! 1. **Coalescing**: a binding id appears in the pending queue at most once.
//!    Re-enqueueing a pending id replaces its action (last write wins) and
//!    keeps its queue position.
//! 2. **Paired bookkeeping**: an id is in the pending queue iff it has a
//!    stored action; both are added and removed together.
//! 3. **One drain per tick**: each tick pops exactly one id (FIFO) and runs
//!    its action, then re-arms. A tick that finds the queue empty marks the
//!    scheduler idle and does not re-arm.
//! 4. **Cancellation**: after [`cancel`](BatchScheduler::cancel) returns, the
//!    cancelled action never runs. Cancelling an id with nothing pending is a
//!    no-op.
//!
//! # Re-entrancy
//!
//! Actions run with no internal borrow held, so they may enqueue, cancel,
//! or flush (including their own id). The next tick is armed before the
//! action runs: a panicking action propagates to the tick source's caller
//! but never leaves the scheduler marked as ticking with nothing armed.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Action panics | Propagates; queue state stays consistent |
//! | Scheduler dropped with ticks armed | Armed ticks find nothing and return |
//! | Pending depth reaches the warn threshold | One `warn!` per crossing |

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tracing::{trace, warn};

use crate::config::SchedulerConfig;
use crate::slot::{BindingId, BindingSlots};
use crate::tick::TickSource;

/// A deferred recompute action.
pub type Action = Box<dyn FnOnce()>;

/// Counters describing scheduler activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Calls to [`BatchScheduler::enqueue`].
    pub enqueued: u64,
    /// Enqueues that replaced an already-pending action.
    pub coalesced: u64,
    /// Actions run by the tick loop.
    pub drained: u64,
    /// Pending entries removed by cancel or reset.
    pub cancelled: u64,
    /// Actions run early through [`BatchScheduler::flush`].
    pub flushed: u64,
    /// Largest pending depth observed.
    pub max_depth: usize,
}

struct QueueState {
    pending: VecDeque<BindingId>,
    latest: AHashMap<BindingId, Action>,
    ticking: bool,
    starving: bool,
    slots: BindingSlots,
    stats: SchedulerStats,
}

struct SchedulerInner {
    ticks: Rc<dyn TickSource>,
    config: SchedulerConfig,
    state: RefCell<QueueState>,
}

/// Handle to a shared batching scheduler.
///
/// Cloning yields another handle to the same queue. A host creates one
/// scheduler at startup and hands it to every binding, typically through a
/// [`ConnectContext`](crate::ConnectContext).
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Rc<SchedulerInner>,
}

impl BatchScheduler {
    /// Create a scheduler driven by `ticks` with default configuration.
    pub fn new(ticks: Rc<dyn TickSource>) -> Self {
        Self::with_config(ticks, SchedulerConfig::default())
    }

    /// Create a scheduler driven by `ticks`.
    pub fn with_config(ticks: Rc<dyn TickSource>, config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                ticks,
                config,
                state: RefCell::new(QueueState {
                    pending: VecDeque::new(),
                    latest: AHashMap::new(),
                    ticking: false,
                    starving: false,
                    slots: BindingSlots::new(),
                    stats: SchedulerStats::default(),
                }),
            }),
        }
    }

    /// Register `action` to run for `id` on a future tick.
    ///
    /// If `id` is already pending only its action is replaced. If the
    /// scheduler is idle, a tick is armed.
    pub fn enqueue(&self, id: BindingId, action: Action) {
        let threshold = self.inner.config.starvation_warn_depth;
        let (replaced, arm) = {
            let mut st = self.inner.state.borrow_mut();
            st.stats.enqueued += 1;
            let replaced = st.latest.insert(id, action);
            if replaced.is_some() {
                st.stats.coalesced += 1;
                trace!(binding = %id, "coalesced pending recompute");
            } else {
                st.pending.push_back(id);
                let depth = st.pending.len();
                st.stats.max_depth = st.stats.max_depth.max(depth);
                trace!(binding = %id, depth, "enqueued recompute");
                if threshold > 0 && depth >= threshold && !st.starving {
                    st.starving = true;
                    warn!(
                        depth,
                        threshold, "batched recompute queue is deep; last entry waits one frame per entry"
                    );
                }
            }
            let arm = !st.ticking;
            st.ticking = true;
            (replaced, arm)
        };
        // Dropped outside the borrow: captured state may re-enter on drop.
        drop(replaced);
        if arm {
            self.arm();
        }
    }

    /// Remove any pending action for `id`. Returns whether one was pending.
    pub fn cancel(&self, id: BindingId) -> bool {
        let removed = self.take_pending(id);
        let found = removed.is_some();
        if found {
            self.inner.state.borrow_mut().stats.cancelled += 1;
            trace!(binding = %id, "cancelled pending recompute");
        }
        drop(removed);
        found
    }

    /// Run the pending action for `id` immediately, removing it from the
    /// queue. Returns whether an action ran.
    pub fn flush(&self, id: BindingId) -> bool {
        let Some(action) = self.take_pending(id) else {
            return false;
        };
        self.inner.state.borrow_mut().stats.flushed += 1;
        trace!(binding = %id, "flushed pending recompute");
        action();
        true
    }

    /// Drop every pending action. Returns how many were dropped.
    ///
    /// An armed tick still fires and finds the queue empty.
    pub fn reset(&self) -> usize {
        let dropped: Vec<Action> = {
            let mut st = self.inner.state.borrow_mut();
            st.pending.clear();
            st.starving = false;
            let dropped: Vec<Action> = st.latest.drain().map(|(_, action)| action).collect();
            st.stats.cancelled += dropped.len() as u64;
            dropped
        };
        let count = dropped.len();
        drop(dropped);
        count
    }

    /// Allocate an id for a new binding.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` bindings are live at once.
    pub fn allocate_id(&self) -> BindingId {
        self.inner.state.borrow_mut().slots.allocate()
    }

    /// Release a binding's id, cancelling anything it has pending.
    pub fn release_id(&self, id: BindingId) -> bool {
        self.cancel(id);
        self.inner.state.borrow_mut().slots.release(id)
    }

    /// Whether `id` has a pending action.
    #[must_use]
    pub fn is_pending(&self, id: BindingId) -> bool {
        self.inner.state.borrow().latest.contains_key(&id)
    }

    /// Number of ids awaiting a drain.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    /// Pending ids in drain order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<BindingId> {
        self.inner.state.borrow().pending.iter().copied().collect()
    }

    /// Whether a tick is currently armed.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.inner.state.borrow().ticking
    }

    /// Number of live binding ids.
    #[must_use]
    pub fn live_bindings(&self) -> usize {
        self.inner.state.borrow().slots.live_count()
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.inner.state.borrow().stats
    }

    /// Whether two handles share one queue.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn take_pending(&self, id: BindingId) -> Option<Action> {
        let mut st = self.inner.state.borrow_mut();
        let action = st.latest.remove(&id)?;
        if let Some(pos) = st.pending.iter().position(|p| *p == id) {
            st.pending.remove(pos);
        }
        Self::update_starving(&mut st, self.inner.config.starvation_warn_depth);
        Some(action)
    }

    fn update_starving(st: &mut QueueState, threshold: usize) {
        if st.starving && st.pending.len() < threshold {
            st.starving = false;
        }
    }

    fn arm(&self) {
        let weak: Weak<SchedulerInner> = Rc::downgrade(&self.inner);
        self.inner.ticks.request_tick(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.on_tick();
            }
        }));
    }

    fn on_tick(&self) {
        let next = {
            let mut st = self.inner.state.borrow_mut();
            match st.pending.pop_front() {
                None => {
                    st.ticking = false;
                    None
                }
                Some(id) => {
                    let action = st.latest.remove(&id);
                    debug_assert!(action.is_some(), "pending id {id:?} has no action");
                    st.stats.drained += 1;
                    Self::update_starving(&mut st, self.inner.config.starvation_warn_depth);
                    Some((id, action))
                }
            }
        };
        let Some((id, action)) = next else {
            trace!("batched recompute queue idle");
            return;
        };
        self.arm();
        trace!(binding = %id, "draining recompute");
        if let Some(action) = action {
            action();
        }
    }
}

impl fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.inner.state.borrow();
        f.debug_struct("BatchScheduler")
            .field("pending", &st.pending.len())
            .field("ticking", &st.ticking)
            .field("live_bindings", &st.slots.live_count())
            .finish()
    }
}
