//! Monotonic 64-bit microsecond clock built from a wrapping hardware
//! counter.
//!
//! The rig's only time source is a free-running 32-bit microsecond
//! counter that wraps roughly every 71 minutes. [`WideClock`] extends it
//! with a software-accumulated epoch: each time a read observes the raw
//! counter below the previous read, one wraparound is credited. The
//! result is a monotonic `u64` with enough range for any scan.
//!
//! The epoch accounting requires `now_us` to be called at least once per
//! raw counter period; the main loop and the timer interrupt both read
//! the clock far more often than that.
//!
//! Deadline comparisons elsewhere in the crate use [`time_le`], which
//! pivots on a signed difference so that values straddling a wraparound
//! of the 64-bit domain still order correctly.

use core::cell::Cell;

use crate::traits::{Clock, CycleCounter};

/// Monotonic microsecond clock: hardware counter plus software epoch.
///
/// Interior mutability keeps [`Clock::now_us`] a `&self` read, matching
/// how every consumer holds the clock.
pub struct WideClock<C: CycleCounter> {
    counter: C,
    last_raw: Cell<u32>,
    epoch: Cell<u32>,
}

impl<C: CycleCounter> WideClock<C> {
    /// Wraps a raw counter. The first read defines the zero reference.
    pub fn new(counter: C) -> Self {
        let last = counter.count();
        Self {
            counter,
            last_raw: Cell::new(last),
            epoch: Cell::new(0),
        }
    }

    /// Access to the underlying counter (mock inspection and control).
    pub fn counter(&self) -> &C {
        &self.counter
    }

    /// Number of wraparounds observed so far.
    pub fn epoch(&self) -> u32 {
        self.epoch.get()
    }
}

impl<C: CycleCounter> Clock for WideClock<C> {
    fn now_us(&self) -> u64 {
        let raw = self.counter.count();
        if raw < self.last_raw.get() {
            self.epoch.set(self.epoch.get() + 1);
        }
        self.last_raw.set(raw);
        ((self.epoch.get() as u64) << 32) | raw as u64
    }
}

/// Wrap-safe "a is at or before b" comparison for microsecond instants.
///
/// Pivots on the signed difference, so instants within half the `u64`
/// range of each other always order correctly even across a wraparound.
#[inline]
pub fn time_le(a: u64, b: u64) -> bool {
    b.wrapping_sub(a) as i64 >= 0
}
