#![forbid(unsafe_code)]

//! Store-connected bindings.
//!
//! A [`Binding`] connects one component instance to a store. It owns the
//! store subscription, caches the derived props produced by its selector,
//! and tells the host when the component has to re-render.
//!
//! # Usage
//!
//! ```ignore
//! let binding = ctx.bind(
//!     Rc::new(|select, own, _store| {
//!         Some(Props::new().with("count", select.get_or_null("count")))
//!     }),
//!     Props::new().with("label", "Clicks"),
//! );
//! binding.on_render_request(|ready| request_repaint(ready.id));
//! binding.mount()?;
//!
//! // Each frame the host renders with:
//! let props = binding.render_props();
//! binding.mark_rendered();
//! ```
//!
//! # Invariants
//!
//! 1. A binding holds at most one live store subscription at any instant.
//! 2. Derived props are never absent; [`Props::empty()`] stands in before the
//!    first computation and whenever the selector returns `None`.
//! 3. A binding is pending in the scheduler at most once.
//! 4. `has_queued_run` is only set while the binding cannot run, and is
//!    cleared by the first recomputation that actually runs.
//! 5. After [`unmount`](Binding::unmount) the selector never runs again for
//!    this binding, whatever notifications or ticks arrive later.
//!
//! # Failure Modes
//!
//! - Selector panic: propagates to whoever triggered the recomputation.
//! - Structural calls after unmount: [`ConnectError::InvalidTransition`].
//! - Notifications or scheduled actions after unmount: ignored.
//!
//! [`ConnectError::InvalidTransition`]: crate::ConnectError::InvalidTransition

mod gate;
mod lifecycle;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub use gate::{BindingInputs, Recompute, RenderDecision, RenderReady};
pub use lifecycle::Phase;

use crate::context::ConnectContext;
use crate::error::Result;
use crate::props::Props;
use crate::reactive::{Select, StoreHandle, Subscription};
use crate::scheduler::BatchScheduler;
use crate::slot::BindingId;

/// How store notifications reach a mounted binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "policy-config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(rename_all = "snake_case"))]
pub enum DeliveryMode {
    /// Recompute inside the notification.
    #[default]
    Sync,
    /// Defer to the batching scheduler, coalescing bursts.
    Batched,
}

/// Selection function: `(select, own_props, store) -> derived props`.
///
/// Returning `None` yields the empty prop object.
pub type Selector = Rc<dyn Fn(&Select<'_>, &Props, &StoreHandle) -> Option<Props>>;

type RenderCallback = Rc<dyn Fn(&RenderReady)>;

struct BindingRecord {
    phase: Phase,
    own_props: Props,
    derived: Props,
    has_queued_run: bool,
    mode: DeliveryMode,
    store: StoreHandle,
    subscription: Option<Subscription>,
    dirty: bool,
    recomputes: u64,
}

struct BindingCore {
    id: BindingId,
    scheduler: BatchScheduler,
    selector: Selector,
    record: RefCell<BindingRecord>,
    render_request: RefCell<Option<RenderCallback>>,
}

/// A component's connection to a store.
///
/// Dropping a binding unmounts it.
pub struct Binding {
    core: Rc<BindingCore>,
}

impl Binding {
    /// Construct a binding from the ambient store, scheduler, and mode of `ctx`.
    ///
    /// See [`Binding::with_parts`].
    pub fn new(ctx: &ConnectContext, selector: Selector, own_props: Props) -> Self {
        Self::with_parts(ctx.scheduler(), ctx.store(), ctx.mode(), selector, own_props)
    }

    /// Construct a binding from explicit parts.
    ///
    /// The store subscription is established first, so no notification is
    /// lost between construction and mount; then the selector runs once,
    /// synchronously, so the first render has correct props.
    ///
    /// # Panics
    ///
    /// Propagates a panic from the initial selector call, and panics if the
    /// scheduler runs out of slot indices (see [`BatchScheduler::allocate_id`]).
    pub fn with_parts(
        scheduler: &BatchScheduler,
        store: StoreHandle,
        mode: DeliveryMode,
        selector: Selector,
        own_props: Props,
    ) -> Self {
        let id = scheduler.allocate_id();
        let core = Rc::new(BindingCore {
            id,
            scheduler: scheduler.clone(),
            selector,
            record: RefCell::new(BindingRecord {
                phase: Phase::Constructing,
                own_props,
                derived: Props::empty(),
                has_queued_run: false,
                mode,
                store: Rc::clone(&store),
                subscription: None,
                dirty: false,
                recomputes: 0,
            }),
            render_request: RefCell::new(None),
        });
        core.subscribe_to(&store);
        // Built before the first selector call so a panic still tears down.
        let binding = Self { core };
        let initial = binding.core.compute();
        binding.core.adopt(initial);
        tracing::debug!(binding = %id, ?mode, "binding constructed");
        binding
    }

    /// Transition `Constructing → Mounted`.
    ///
    /// If a notification arrived during construction, the change gate runs
    /// once, immediately.
    ///
    /// # Errors
    ///
    /// [`ConnectError::InvalidTransition`](crate::ConnectError::InvalidTransition)
    /// if the binding was already mounted or unmounted.
    pub fn mount(&self) -> Result<()> {
        self.core.mount()
    }

    /// Tear down: unsubscribe, cancel any pending batched recompute, and
    /// release the id. Returns `false` if already unmounted.
    pub fn unmount(&self) -> bool {
        self.core.unmount()
    }

    /// Replace the store. An identical handle is a no-op; otherwise the old
    /// subscription is released before the new one is made and derived
    /// props are recomputed against the new store right away.
    ///
    /// Before mount the recomputation is adopted silently, exactly like
    /// [`receive`](Self::receive) with a new store; after mount it marks the
    /// binding dirty and raises the render request on change.
    ///
    /// Returns whether the store identity changed.
    ///
    /// # Errors
    ///
    /// [`ConnectError::InvalidTransition`](crate::ConnectError::InvalidTransition)
    /// after unmount.
    pub fn set_store(&self, store: StoreHandle) -> Result<bool> {
        let changed = self.core.swap_store(&store)?;
        if changed {
            self.core.store_swapped();
        }
        Ok(changed)
    }

    /// Switch delivery mode, cancelling any pending scheduler entry.
    ///
    /// A pending batched recompute cancelled by a switch to `Sync` is run
    /// synchronously instead, so the switch neither drops nor duplicates it.
    ///
    /// # Errors
    ///
    /// [`ConnectError::InvalidTransition`](crate::ConnectError::InvalidTransition)
    /// after unmount.
    pub fn set_mode(&self, mode: DeliveryMode) -> Result<bool> {
        let (changed, cancelled) = self.core.swap_mode(mode)?;
        if cancelled && mode == DeliveryMode::Sync {
            self.core.run_store_gate();
        }
        Ok(changed)
    }

    /// Feed the host's next inputs and decide whether to re-render.
    ///
    /// Own-props changes (shallow), store identity changes, and mode changes
    /// recompute derived props right away; the result is cached and reused
    /// by [`render_props`](Self::render_props).
    ///
    /// # Errors
    ///
    /// [`ConnectError::InvalidTransition`](crate::ConnectError::InvalidTransition)
    /// after unmount.
    pub fn receive(&self, inputs: BindingInputs) -> Result<RenderDecision> {
        self.core.receive(inputs)
    }

    /// Run the change gate now.
    ///
    /// Before mount this only records a queued run; after unmount it does
    /// nothing.
    pub fn recompute(&self) -> Recompute {
        self.core.run_store_gate()
    }

    /// Register the render-ready callback, replacing any previous one.
    ///
    /// It fires whenever a store-driven recomputation changes derived props.
    pub fn on_render_request(&self, callback: impl Fn(&RenderReady) + 'static) {
        *self.core.render_request.borrow_mut() = Some(Rc::new(callback));
    }

    /// Own props overlaid by derived props.
    #[must_use]
    pub fn render_props(&self) -> Props {
        let record = self.core.record.borrow();
        Props::merge(&record.own_props, &record.derived)
    }

    /// Whether a store-driven change is waiting to be rendered.
    #[must_use]
    pub fn needs_render(&self) -> bool {
        self.core.record.borrow().dirty
    }

    /// Clear the dirty flag after the host rendered. Returns its prior value.
    pub fn mark_rendered(&self) -> bool {
        std::mem::take(&mut self.core.record.borrow_mut().dirty)
    }

    /// Identity used by the scheduler.
    #[must_use]
    pub fn id(&self) -> BindingId {
        self.core.id
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.core.record.borrow().phase
    }

    /// Whether notifications may trigger recomputation.
    #[must_use]
    pub fn can_run(&self) -> bool {
        self.phase().can_run()
    }

    /// Whether a notification arrived before mount and awaits it.
    #[must_use]
    pub fn has_queued_run(&self) -> bool {
        self.core.record.borrow().has_queued_run
    }

    /// Current delivery mode.
    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        self.core.record.borrow().mode
    }

    /// Store the binding is connected to.
    #[must_use]
    pub fn store(&self) -> StoreHandle {
        Rc::clone(&self.core.record.borrow().store)
    }

    /// Own props last supplied by the host.
    #[must_use]
    pub fn own_props(&self) -> Props {
        self.core.record.borrow().own_props.clone()
    }

    /// Cached derived props.
    #[must_use]
    pub fn derived_props(&self) -> Props {
        self.core.record.borrow().derived.clone()
    }

    /// Whether a store subscription is held.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.core
            .record
            .borrow()
            .subscription
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Number of selector results adopted into the change gate, including
    /// the one made at construction.
    #[must_use]
    pub fn recompute_count(&self) -> u64 {
        self.core.record.borrow().recomputes
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.core.unmount();
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.core.record.borrow();
        f.debug_struct("Binding")
            .field("id", &self.core.id)
            .field("phase", &record.phase)
            .field("mode", &record.mode)
            .field("derived", &record.derived)
            .field("dirty", &record.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::PropValue;
    use crate::reactive::MemoryStore;
    use crate::tick::ManualTickSource;
    use std::cell::Cell;

    struct Fixture {
        ticks: Rc<ManualTickSource>,
        scheduler: BatchScheduler,
        store: MemoryStore,
        handle: StoreHandle,
        calls: Rc<Cell<u32>>,
    }

    impl Fixture {
        fn new() -> Self {
            let ticks = Rc::new(ManualTickSource::new());
            let scheduler = BatchScheduler::new(ticks.clone());
            let store = MemoryStore::new();
            store.set("a", 1);
            let handle: StoreHandle = Rc::new(store.clone());
            Self {
                ticks,
                scheduler,
                store,
                handle,
                calls: Rc::new(Cell::new(0)),
            }
        }

        /// Selector mapping store key `a` to prop `a`, counting calls.
        fn selector(&self) -> Selector {
            let calls = Rc::clone(&self.calls);
            Rc::new(move |select: &Select<'_>, _own: &Props, _store: &StoreHandle| {
                calls.set(calls.get() + 1);
                Some(Props::new().with("a", select.get_or_null("a")))
            })
        }

        fn bind(&self, mode: DeliveryMode) -> Binding {
            Binding::with_parts(
                &self.scheduler,
                Rc::clone(&self.handle),
                mode,
                self.selector(),
                Props::new().with("own", true),
            )
        }
    }

    fn a_of(binding: &Binding) -> Option<i64> {
        binding.derived_props().get("a").and_then(PropValue::as_int)
    }

    #[test]
    fn construction_subscribes_and_computes() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Sync);
        assert_eq!(b.phase(), Phase::Constructing);
        assert!(b.is_subscribed());
        assert_eq!(a_of(&b), Some(1));
        assert_eq!(fx.calls.get(), 1);
        assert!(!b.needs_render(), "initial compute is not a re-render");
    }

    #[test]
    fn notifications_before_mount_are_deferred_once() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Sync);
        fx.store.set("a", 2);
        fx.store.set("a", 3);
        assert!(b.has_queued_run());
        assert_eq!(fx.calls.get(), 1);

        b.mount().unwrap();
        assert_eq!(fx.calls.get(), 2, "exactly one recompute at mount");
        assert!(!b.has_queued_run());
        assert_eq!(a_of(&b), Some(3));
        assert!(b.needs_render());
    }

    #[test]
    fn mount_without_queued_run_does_not_recompute() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Sync);
        b.mount().unwrap();
        assert_eq!(fx.calls.get(), 1);
    }

    #[test]
    fn sync_mode_recomputes_in_notification() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Sync);
        b.mount().unwrap();
        fx.store.set("a", 5);
        assert_eq!(a_of(&b), Some(5));
        assert!(b.needs_render());
        assert!(b.mark_rendered());
        assert!(!b.needs_render());
    }

    #[test]
    fn unchanged_output_does_not_signal() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Sync);
        let signals = Rc::new(Cell::new(0));
        let s = Rc::clone(&signals);
        b.on_render_request(move |_| s.set(s.get() + 1));
        b.mount().unwrap();

        fx.store.set("unrelated", 9);
        assert_eq!(fx.calls.get(), 2, "selector still runs");
        assert_eq!(signals.get(), 0);
        assert!(!b.needs_render());
    }

    #[test]
    fn render_signal_carries_merged_props() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Sync);
        let seen: Rc<RefCell<Option<RenderReady>>> = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        b.on_render_request(move |ready| *s.borrow_mut() = Some(ready.clone()));
        b.mount().unwrap();
        fx.store.set("a", 4);

        let ready = seen.borrow().clone().unwrap();
        assert_eq!(ready.id, b.id());
        assert_eq!(ready.props.get("a").and_then(PropValue::as_int), Some(4));
        assert_eq!(ready.props.get("own").and_then(PropValue::as_bool), Some(true));
    }

    #[test]
    fn batched_mode_coalesces_until_tick() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Batched);
        b.mount().unwrap();
        for v in 2..7 {
            fx.store.set("a", v);
        }
        assert_eq!(fx.scheduler.pending_ids(), vec![b.id()]);
        assert_eq!(fx.calls.get(), 1);

        fx.ticks.advance();
        assert_eq!(fx.calls.get(), 2);
        assert_eq!(a_of(&b), Some(6));
    }

    #[test]
    fn unmount_cancels_pending_and_unsubscribes() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Batched);
        b.mount().unwrap();
        fx.store.set("a", 2);
        assert!(fx.scheduler.is_pending(b.id()));

        assert!(b.unmount());
        assert!(!fx.scheduler.is_pending(b.id()));
        assert!(!b.is_subscribed());
        assert_eq!(fx.store.listener_count(), 0);
        fx.ticks.advance_until_idle(4);
        assert_eq!(fx.calls.get(), 1);
        assert!(!b.unmount(), "second unmount is a no-op");
    }

    #[test]
    fn recompute_after_unmount_is_noop() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Sync);
        b.mount().unwrap();
        b.unmount();
        let outcome = b.recompute();
        assert!(!outcome.changed);
        assert_eq!(fx.calls.get(), 1);
        assert!(!b.has_queued_run());
    }

    #[test]
    fn structural_calls_after_unmount_error() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Sync);
        b.unmount();
        assert!(b.mount().is_err());
        assert!(b.set_mode(DeliveryMode::Batched).is_err());
        assert!(b.set_store(Rc::new(MemoryStore::new())).is_err());
    }

    #[test]
    fn double_mount_errors() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Sync);
        b.mount().unwrap();
        assert!(b.mount().is_err());
    }

    #[test]
    fn set_store_resubscribes_by_identity() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Sync);
        b.mount().unwrap();

        assert!(!b.set_store(Rc::clone(&fx.handle)).unwrap());
        assert_eq!(fx.store.listener_count(), 1);

        let other = MemoryStore::new();
        other.set("a", 42);
        assert!(b.set_store(Rc::new(other.clone())).unwrap());
        assert_eq!(fx.store.listener_count(), 0, "old store released");
        assert_eq!(other.listener_count(), 1);
        assert_eq!(a_of(&b), Some(42));

        fx.store.set("a", 7);
        assert_eq!(a_of(&b), Some(42), "old store no longer drives the binding");
        other.set("a", 43);
        assert_eq!(a_of(&b), Some(43));
    }

    #[test]
    fn store_swap_before_mount_uses_new_store_on_both_paths() {
        let fx = Fixture::new();
        let other = MemoryStore::new();
        other.set("a", 42);
        let other: StoreHandle = Rc::new(other);

        let via_set = fx.bind(DeliveryMode::Sync);
        fx.store.set("a", 2);
        assert!(via_set.has_queued_run());
        assert!(via_set.set_store(Rc::clone(&other)).unwrap());

        let via_receive = fx.bind(DeliveryMode::Sync);
        let decision = via_receive
            .receive(BindingInputs {
                own_props: via_receive.own_props(),
                store: Rc::clone(&other),
                mode: DeliveryMode::Sync,
            })
            .unwrap();
        assert!(decision.props_changed);
        assert!(decision.derived_changed);

        for b in [&via_set, &via_receive] {
            assert_eq!(b.phase(), Phase::Constructing);
            assert_eq!(
                b.render_props().get("a").and_then(PropValue::as_int),
                Some(42)
            );
            assert!(!b.has_queued_run());
            assert!(!b.needs_render(), "first render is not a re-render");
        }
        assert_eq!(fx.store.listener_count(), 0);

        let calls = fx.calls.get();
        via_set.mount().unwrap();
        via_receive.mount().unwrap();
        assert_eq!(fx.calls.get(), calls, "nothing left queued for mount");
    }

    #[test]
    fn switching_to_sync_runs_cancelled_entry_once() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Batched);
        b.mount().unwrap();
        fx.store.set("a", 8);
        assert!(fx.scheduler.is_pending(b.id()));

        assert!(b.set_mode(DeliveryMode::Sync).unwrap());
        assert!(!fx.scheduler.is_pending(b.id()));
        assert_eq!(a_of(&b), Some(8));
        assert_eq!(fx.calls.get(), 2);

        fx.ticks.advance_until_idle(4);
        assert_eq!(fx.calls.get(), 2, "no double fire");
    }

    #[test]
    fn drop_unmounts() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Batched);
        b.mount().unwrap();
        fx.store.set("a", 2);
        drop(b);
        assert_eq!(fx.scheduler.pending_len(), 0);
        assert_eq!(fx.scheduler.live_bindings(), 0);
        assert_eq!(fx.store.listener_count(), 0);
    }

    #[test]
    fn none_from_selector_is_empty_props() {
        let fx = Fixture::new();
        let b = Binding::with_parts(
            &fx.scheduler,
            Rc::clone(&fx.handle),
            DeliveryMode::Sync,
            Rc::new(|_: &Select<'_>, _: &Props, _: &StoreHandle| None),
            Props::empty(),
        );
        assert!(b.derived_props().is_empty());
        assert!(b.render_props().is_empty());
    }

    #[test]
    fn debug_format_mentions_phase() {
        let fx = Fixture::new();
        let b = fx.bind(DeliveryMode::Sync);
        let debug = format!("{b:?}");
        assert!(debug.contains("Constructing"));
    }
}
