#![forbid(unsafe_code)]

//! Frame tick sources.
//!
//! The batching scheduler never sleeps or spawns: it asks a [`TickSource`]
//! to run a callback once, before the next frame, and the host decides what
//! "next frame" means. A terminal runtime maps it onto its render loop; tests
//! drive [`ManualTickSource`] by hand.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

/// One-shot callback run on the next frame.
pub type TickCallback = Box<dyn FnOnce()>;

/// A host primitive that runs a callback once before the next frame.
pub trait TickSource {
    /// Schedule `callback` to run once on the next frame.
    fn request_tick(&self, callback: TickCallback);
}

/// Host-driven tick source.
///
/// Callbacks accumulate until [`advance`](Self::advance) is called. Each
/// advance runs exactly the callbacks that were registered before it began;
/// callbacks requested while it runs wait for the following advance.
#[derive(Default)]
pub struct ManualTickSource {
    queue: RefCell<VecDeque<TickCallback>>,
    frames: Cell<u64>,
}

impl ManualTickSource {
    /// Create a tick source with nothing scheduled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one frame. Returns the number of callbacks that ran.
    pub fn advance(&self) -> usize {
        self.frames.set(self.frames.get() + 1);
        let due = std::mem::take(&mut *self.queue.borrow_mut());
        let ran = due.len();
        for callback in due {
            callback();
        }
        ran
    }

    /// Run up to `frames` frames, stopping early once nothing is scheduled.
    ///
    /// Returns the number of frames that ran at least one callback.
    pub fn advance_until_idle(&self, frames: usize) -> usize {
        let mut busy = 0;
        for _ in 0..frames {
            if self.pending() == 0 {
                break;
            }
            self.advance();
            busy += 1;
        }
        busy
    }

    /// Number of callbacks waiting for the next frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Number of frames advanced so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.get()
    }
}

impl TickSource for ManualTickSource {
    fn request_tick(&self, callback: TickCallback) {
        self.queue.borrow_mut().push_back(callback);
    }
}

impl fmt::Debug for ManualTickSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTickSource")
            .field("pending", &self.pending())
            .field("frames", &self.frames.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn advance_runs_registered_callbacks() {
        let ticks = ManualTickSource::new();
        let hits = Rc::new(Cell::new(0));
        for _ in 0..3 {
            let h = Rc::clone(&hits);
            ticks.request_tick(Box::new(move || h.set(h.get() + 1)));
        }
        assert_eq!(ticks.pending(), 3);
        assert_eq!(ticks.advance(), 3);
        assert_eq!(hits.get(), 3);
        assert_eq!(ticks.frames(), 1);
    }

    #[test]
    fn callbacks_requested_during_advance_wait_a_frame() {
        let ticks = Rc::new(ManualTickSource::new());
        let hits = Rc::new(Cell::new(0));
        let t = Rc::clone(&ticks);
        let h = Rc::clone(&hits);
        ticks.request_tick(Box::new(move || {
            h.set(h.get() + 1);
            let h2 = Rc::clone(&h);
            t.request_tick(Box::new(move || h2.set(h2.get() + 10)));
        }));

        ticks.advance();
        assert_eq!(hits.get(), 1);
        assert_eq!(ticks.pending(), 1);
        ticks.advance();
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn advance_until_idle_stops_early() {
        let ticks = ManualTickSource::new();
        ticks.request_tick(Box::new(|| {}));
        assert_eq!(ticks.advance_until_idle(10), 1);
        assert_eq!(ticks.frames(), 1);
    }

    #[test]
    fn empty_advance_counts_frame() {
        let ticks = ManualTickSource::new();
        assert_eq!(ticks.advance(), 0);
        assert_eq!(ticks.frames(), 1);
    }
}
