//! Fixed-capacity pool of one-shot deadline timers.
//!
//! [`TimerWheel`] is the only structure mutated directly from the timer
//! compare interrupt. It is a generation-checked slot arena: scheduling
//! occupies a free slot and returns a [`TimerHandle`] carrying the slot's
//! generation, and any removal (fire or cancel) bumps the generation, so
//! a stale handle can never cancel a slot that has been reused. That
//! gives the bounded-memory guarantee of a plain node pool plus safe
//! detection of double-cancel and cancel-after-fire.
//!
//! All pool access happens inside the shared [`IrqGate`] critical
//! section, held per operation for the minimum span. Fired events are
//! collected with the gate released between pops.
//!
//! # Example
//!
//! ```rust
//! use scanrig::timer::TimerWheel;
//! use scanrig::irq::IrqGate;
//! use scanrig::hal::MockIrq;
//!
//! let mut gate = IrqGate::new(MockIrq::new());
//! let mut wheel: TimerWheel<u8, 4> = TimerWheel::new();
//!
//! let h = wheel.schedule(&mut gate, 0, 100, 7).unwrap();
//! let mut fired = heapless::Vec::<u8, 4>::new();
//!
//! // Nothing due yet.
//! assert_eq!(wheel.update(&mut gate, 50, &mut fired), Some(100));
//! assert!(fired.is_empty());
//!
//! // Deadline reached.
//! assert_eq!(wheel.update(&mut gate, 100, &mut fired), None);
//! assert_eq!(fired.as_slice(), &[7]);
//!
//! // The handle is now stale.
//! assert!(!wheel.cancel(&mut gate, h));
//! ```

use heapless::Vec;

use crate::clock::time_le;
use crate::error::{Error, Result};
use crate::irq::IrqGate;
use crate::traits::InterruptMask;

/// Handle to a scheduled timer entry.
///
/// Becomes stale once the entry fires or is cancelled; using a stale
/// handle is harmless and reports `false`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerHandle {
    index: u8,
    generation: u16,
}

#[derive(Clone, Copy, Debug)]
struct Entry<E> {
    deadline: u64,
    seq: u32,
    event: E,
}

struct Slot<E> {
    generation: u16,
    entry: Option<Entry<E>>,
}

/// Fixed pool of `N` one-shot deadline timers delivering events of type
/// `E`.
///
/// `E` is a small `Copy` event tag (see [`Event`](crate::event::Event));
/// the wheel never stores callbacks or raw context pointers.
pub struct TimerWheel<E: Copy, const N: usize> {
    slots: [Slot<E>; N],
    next_seq: u32,
}

impl<E: Copy, const N: usize> Default for TimerWheel<E, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Copy, const N: usize> TimerWheel<E, N> {
    /// Creates an empty wheel.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot {
                generation: 0,
                entry: None,
            }),
            next_seq: 0,
        }
    }

    /// Pool capacity.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of live (scheduled, not yet fired) entries.
    pub fn live<M: InterruptMask>(&self, gate: &mut IrqGate<M>) -> usize {
        let _guard = gate.lock();
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    /// Schedules a one-shot deadline `delay_us` microseconds after
    /// `now_us`.
    ///
    /// Fails with [`Error::ResourceExhausted`] when all `N` slots are
    /// live; the pool never overwrites a live entry.
    pub fn schedule<M: InterruptMask>(
        &mut self,
        gate: &mut IrqGate<M>,
        now_us: u64,
        delay_us: u64,
        event: E,
    ) -> Result<TimerHandle> {
        let _guard = gate.lock();
        let deadline = now_us.wrapping_add(delay_us);
        let seq = self.next_seq;

        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.is_none() {
                slot.entry = Some(Entry {
                    deadline,
                    seq,
                    event,
                });
                self.next_seq = self.next_seq.wrapping_add(1);
                return Ok(TimerHandle {
                    index: i as u8,
                    generation: slot.generation,
                });
            }
        }
        Err(Error::ResourceExhausted)
    }

    /// Cancels a scheduled entry.
    ///
    /// Returns `true` only if the entry was still pending; a handle whose
    /// entry already fired, was already cancelled, or whose slot has been
    /// reused returns `false`. Idempotent, never double-frees.
    pub fn cancel<M: InterruptMask>(&mut self, gate: &mut IrqGate<M>, handle: TimerHandle) -> bool {
        let _guard = gate.lock();
        match self.slots.get_mut(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation && slot.entry.is_some() => {
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                true
            }
            _ => false,
        }
    }

    /// Services the wheel from the timer compare interrupt.
    ///
    /// Pops every entry whose deadline is at or before `now_us`, in
    /// non-decreasing deadline order (ties broken by insertion order),
    /// appending the fired events to `fired`. Returns the minimum
    /// remaining deadline for reprogramming the hardware compare
    /// register, or `None` when the pool is empty.
    ///
    /// Safe to call spuriously (nothing due) and late (several entries
    /// overdue): all due entries are drained before returning.
    pub fn update<M: InterruptMask>(
        &mut self,
        gate: &mut IrqGate<M>,
        now_us: u64,
        fired: &mut Vec<E, N>,
    ) -> Option<u64> {
        loop {
            let event = {
                let _guard = gate.lock();
                self.pop_due(now_us)
            };
            match event {
                Some(e) => {
                    // At most N entries can fire per update.
                    let pushed = fired.push(e);
                    debug_assert!(pushed.is_ok());
                }
                None => break,
            }
        }

        let _guard = gate.lock();
        let mut next: Option<u64> = None;
        for slot in &self.slots {
            if let Some(entry) = &slot.entry {
                next = Some(match next {
                    Some(n) if time_le(n, entry.deadline) => n,
                    _ => entry.deadline,
                });
            }
        }
        next
    }

    /// Removes and returns the due entry with the smallest
    /// (deadline, seq), if any. Caller holds the gate.
    fn pop_due(&mut self, now_us: u64) -> Option<E> {
        let mut best: Option<(usize, u64, u32)> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(entry) = &slot.entry else { continue };
            if !time_le(entry.deadline, now_us) {
                continue;
            }
            let earlier = match best {
                None => true,
                Some((_, deadline, seq)) => {
                    time_le(entry.deadline, deadline)
                        && (entry.deadline != deadline
                            || (seq.wrapping_sub(entry.seq) as i32) > 0)
                }
            };
            if earlier {
                best = Some((i, entry.deadline, entry.seq));
            }
        }

        let (i, _, _) = best?;
        let slot = &mut self.slots[i];
        let entry = slot.entry.take();
        slot.generation = slot.generation.wrapping_add(1);
        entry.map(|e| e.event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockIrq;

    fn gate() -> IrqGate<MockIrq> {
        IrqGate::new(MockIrq::new())
    }

    #[test]
    fn fires_at_deadline_not_before() {
        let mut gate = gate();
        let mut wheel: TimerWheel<u32, 4> = TimerWheel::new();
        wheel.schedule(&mut gate, 0, 100, 1).unwrap();

        let mut fired = Vec::new();
        assert_eq!(wheel.update(&mut gate, 99, &mut fired), Some(100));
        assert!(fired.is_empty());

        assert_eq!(wheel.update(&mut gate, 100, &mut fired), None);
        assert_eq!(fired.as_slice(), &[1]);
    }

    #[test]
    fn late_update_drains_all_due() {
        let mut gate = gate();
        let mut wheel: TimerWheel<u32, 4> = TimerWheel::new();
        wheel.schedule(&mut gate, 0, 10, 1).unwrap();
        wheel.schedule(&mut gate, 0, 30, 3).unwrap();
        wheel.schedule(&mut gate, 0, 20, 2).unwrap();

        // One very late update: everything fires, ordered by deadline.
        let mut fired = Vec::new();
        assert_eq!(wheel.update(&mut gate, 1000, &mut fired), None);
        assert_eq!(fired.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn equal_deadlines_fire_in_insertion_order() {
        let mut gate = gate();
        let mut wheel: TimerWheel<u32, 4> = TimerWheel::new();
        wheel.schedule(&mut gate, 0, 50, 10).unwrap();
        wheel.schedule(&mut gate, 0, 50, 20).unwrap();
        wheel.schedule(&mut gate, 0, 50, 30).unwrap();

        let mut fired = Vec::new();
        wheel.update(&mut gate, 50, &mut fired);
        assert_eq!(fired.as_slice(), &[10, 20, 30]);
    }

    #[test]
    fn update_returns_min_remaining_deadline() {
        let mut gate = gate();
        let mut wheel: TimerWheel<u32, 4> = TimerWheel::new();
        wheel.schedule(&mut gate, 0, 500, 1).unwrap();
        wheel.schedule(&mut gate, 0, 200, 2).unwrap();
        wheel.schedule(&mut gate, 0, 800, 3).unwrap();

        let mut fired = Vec::new();
        assert_eq!(wheel.update(&mut gate, 0, &mut fired), Some(200));

        fired.clear();
        assert_eq!(wheel.update(&mut gate, 200, &mut fired), Some(500));
        assert_eq!(fired.as_slice(), &[2]);
    }

    #[test]
    fn spurious_update_is_harmless() {
        let mut gate = gate();
        let mut wheel: TimerWheel<u32, 2> = TimerWheel::new();
        let mut fired = Vec::new();
        assert_eq!(wheel.update(&mut gate, 12345, &mut fired), None);
        assert!(fired.is_empty());
    }

    #[test]
    fn pool_exhaustion_reports_error() {
        let mut gate = gate();
        let mut wheel: TimerWheel<u32, 2> = TimerWheel::new();
        wheel.schedule(&mut gate, 0, 10, 1).unwrap();
        wheel.schedule(&mut gate, 0, 20, 2).unwrap();
        assert_eq!(
            wheel.schedule(&mut gate, 0, 30, 3),
            Err(Error::ResourceExhausted)
        );

        // Firing frees a slot.
        let mut fired = Vec::new();
        wheel.update(&mut gate, 10, &mut fired);
        assert!(wheel.schedule(&mut gate, 0, 30, 3).is_ok());
    }

    #[test]
    fn cancel_before_fire() {
        let mut gate = gate();
        let mut wheel: TimerWheel<u32, 2> = TimerWheel::new();
        let h = wheel.schedule(&mut gate, 0, 100, 1).unwrap();

        assert!(wheel.cancel(&mut gate, h));
        // Second cancel is a no-op.
        assert!(!wheel.cancel(&mut gate, h));

        let mut fired = Vec::new();
        assert_eq!(wheel.update(&mut gate, 1000, &mut fired), None);
        assert!(fired.is_empty());

        // The freed slot is reusable.
        assert!(wheel.schedule(&mut gate, 0, 100, 2).is_ok());
    }

    #[test]
    fn stale_handle_cannot_cancel_reused_slot() {
        let mut gate = gate();
        let mut wheel: TimerWheel<u32, 1> = TimerWheel::new();
        let h1 = wheel.schedule(&mut gate, 0, 10, 1).unwrap();
        assert!(wheel.cancel(&mut gate, h1));

        // Slot 0 is reused for a new entry.
        let h2 = wheel.schedule(&mut gate, 0, 50, 2).unwrap();
        assert!(!wheel.cancel(&mut gate, h1));
        assert_eq!(wheel.live(&mut gate), 1);
        assert!(wheel.cancel(&mut gate, h2));
    }

    #[test]
    fn cancel_after_fire_is_noop() {
        let mut gate = gate();
        let mut wheel: TimerWheel<u32, 2> = TimerWheel::new();
        let h = wheel.schedule(&mut gate, 0, 10, 1).unwrap();

        let mut fired = Vec::new();
        wheel.update(&mut gate, 10, &mut fired);
        assert_eq!(fired.as_slice(), &[1]);
        assert!(!wheel.cancel(&mut gate, h));
    }

    #[test]
    fn gate_released_after_every_operation() {
        let mut gate = gate();
        let mut wheel: TimerWheel<u32, 2> = TimerWheel::new();
        wheel.schedule(&mut gate, 0, 10, 1).unwrap();
        let mut fired = Vec::new();
        wheel.update(&mut gate, 10, &mut fired);
        assert_eq!(gate.depth(), 0);
        assert!(!gate.inner().masked.get());
    }
}
