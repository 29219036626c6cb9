//! Deferred event queue: the only handoff path from interrupt context
//! into the main loop.
//!
//! Interrupt handlers never touch controller, axis, or session state.
//! They push a tagged [`Event`] onto the [`EventQueue`]; the main loop
//! drains the queue once per iteration and dispatches each event with
//! interrupts enabled. Events carry their payload inline — no callback
//! pointers, no opaque context.
//!
//! # Drain semantics
//!
//! A drain executes exactly the items present when it began, in FIFO
//! order. Items enqueued *during* the drain (by event handlers) are
//! deferred to the next drain, which bounds per-iteration work and
//! prevents a feedback loop from stalling the main loop.
//!
//! # Example
//!
//! ```rust
//! use scanrig::event::{Event, EventQueue};
//! use scanrig::axis::AxisId;
//! use scanrig::irq::IrqGate;
//! use scanrig::hal::MockIrq;
//!
//! let mut gate = IrqGate::new(MockIrq::new());
//! let mut queue: EventQueue<8> = EventQueue::new();
//!
//! queue.enqueue(&mut gate, Event::AxisDone(AxisId::X)).unwrap();
//! queue.enqueue(&mut gate, Event::SensorDone).unwrap();
//!
//! let mut seen = heapless::Vec::<Event, 8>::new();
//! queue.drain(&mut gate, |ev| {
//!     seen.push(ev).unwrap();
//! });
//! assert_eq!(seen.as_slice(), &[Event::AxisDone(AxisId::X), Event::SensorDone]);
//! ```

use heapless::Deque;

use crate::axis::AxisId;
use crate::error::{Error, Result};
use crate::irq::IrqGate;
use crate::timer::TimerWheel;
use crate::traits::InterruptMask;

/// Number of slots in the device timer pool.
///
/// Worst case live entries: one deadline per axis, the sensor watchdog,
/// and a pending re-init, with headroom for boundary overlap.
pub const TIMER_SLOTS: usize = 8;

/// Capacity of the deferred event ring.
pub const EVENT_CAPACITY: usize = 16;

/// The device timer wheel, delivering [`Event`]s.
pub type ScanTimerWheel = TimerWheel<Event, TIMER_SLOTS>;

/// Work item deferred from interrupt context to the main loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// A motor movement deadline elapsed on the given axis.
    AxisDone(AxisId),
    /// The sensor completion interrupt fired.
    SensorDone,
    /// The measurement watchdog deadline elapsed.
    SensorWatchdog,
    /// A scheduled sensor re-initialization attempt is due.
    SensorReinit,
}

/// Bundle of the shared scheduling resources, passed by reference into
/// every main-loop handler.
///
/// Keeping these in one value (instead of ambient statics) is what lets
/// the whole core be exercised on the desktop: the owning
/// [`ScanDevice`](crate::ScanDevice) constructs one per dispatch.
pub struct SchedCtx<'a, M: InterruptMask> {
    /// The process-wide interrupt gate.
    pub gate: &'a mut IrqGate<M>,
    /// The device timer pool.
    pub wheel: &'a mut ScanTimerWheel,
    /// Monotonic time at dispatch, in microseconds.
    pub now_us: u64,
}

/// Bounded FIFO of deferred events.
///
/// `enqueue` is safe from any interrupt context and from the main loop;
/// every access takes the same [`IrqGate`] the timer pool uses.
pub struct EventQueue<const N: usize> {
    ring: Deque<Event, N>,
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventQueue<N> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self { ring: Deque::new() }
    }

    /// Appends an event.
    ///
    /// Fails with [`Error::QueueFull`] when the ring has no room. Callers
    /// on the interrupt side must treat that as a reportable fault, not
    /// ignore it.
    pub fn enqueue<M: InterruptMask>(&mut self, gate: &mut IrqGate<M>, event: Event) -> Result<()> {
        let _guard = gate.lock();
        self.ring.push_back(event).map_err(|_| Error::QueueFull)
    }

    /// Number of queued events.
    pub fn len<M: InterruptMask>(&self, gate: &mut IrqGate<M>) -> usize {
        let _guard = gate.lock();
        self.ring.len()
    }

    /// Pops the oldest event, if any.
    ///
    /// Building block for the drain protocol: snapshot [`len`](Self::len)
    /// first, then pop at most that many items, so events enqueued by the
    /// handlers wait for the next drain.
    pub fn pop<M: InterruptMask>(&mut self, gate: &mut IrqGate<M>) -> Option<Event> {
        let _guard = gate.lock();
        self.ring.pop_front()
    }

    /// Drains the events present at the moment the drain begins, FIFO,
    /// invoking `f` for each with the gate released.
    pub fn drain<M: InterruptMask>(&mut self, gate: &mut IrqGate<M>, mut f: impl FnMut(Event)) {
        let snapshot = self.len(gate);
        for _ in 0..snapshot {
            match self.pop(gate) {
                Some(ev) => f(ev),
                None => break,
            }
        }
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
    fn fifo_order_preserved() {
        let mut gate = gate();
        let mut queue: EventQueue<4> = EventQueue::new();
        queue.enqueue(&mut gate, Event::AxisDone(AxisId::X)).unwrap();
        queue.enqueue(&mut gate, Event::AxisDone(AxisId::Y)).unwrap();
        queue.enqueue(&mut gate, Event::SensorDone).unwrap();

        assert_eq!(queue.pop(&mut gate), Some(Event::AxisDone(AxisId::X)));
        assert_eq!(queue.pop(&mut gate), Some(Event::AxisDone(AxisId::Y)));
        assert_eq!(queue.pop(&mut gate), Some(Event::SensorDone));
        assert_eq!(queue.pop(&mut gate), None);
    }

    #[test]
    fn enqueue_full_reports_error() {
        let mut gate = gate();
        let mut queue: EventQueue<2> = EventQueue::new();
        queue.enqueue(&mut gate, Event::SensorDone).unwrap();
        queue.enqueue(&mut gate, Event::SensorDone).unwrap();
        assert_eq!(
            queue.enqueue(&mut gate, Event::SensorDone),
            Err(Error::QueueFull)
        );
        // Nothing was dropped or corrupted.
        assert_eq!(queue.len(&mut gate), 2);
    }

    #[test]
    fn drain_defers_items_enqueued_during_drain() {
        let mut gate = gate();
        let mut queue: EventQueue<8> = EventQueue::new();
        queue.enqueue(&mut gate, Event::SensorDone).unwrap();
        queue.enqueue(&mut gate, Event::SensorWatchdog).unwrap();

        // Simulate handlers enqueueing more work: snapshot two, pop two,
        // then push, as the device loop does.
        let snapshot = queue.len(&mut gate);
        let mut handled = 0;
        for _ in 0..snapshot {
            let _ = queue.pop(&mut gate).unwrap();
            handled += 1;
            queue.enqueue(&mut gate, Event::SensorReinit).unwrap();
        }
        assert_eq!(handled, 2);
        // The two re-enqueued events wait for the next drain.
        assert_eq!(queue.len(&mut gate), 2);
    }

    #[test]
    fn drain_runs_callbacks_with_gate_released() {
        let mut gate = gate();
        let mut queue: EventQueue<4> = EventQueue::new();
        queue.enqueue(&mut gate, Event::SensorDone).unwrap();

        let mut depths = heapless::Vec::<u32, 4>::new();
        // The closure cannot observe the gate directly (it is mutably
        // borrowed by drain), so record afterwards instead.
        queue.drain(&mut gate, |_| {
            depths.push(0).unwrap();
        });
        assert_eq!(depths.len(), 1);
        assert_eq!(gate.depth(), 0);
        assert!(!gate.inner().masked.get());
    }
}
