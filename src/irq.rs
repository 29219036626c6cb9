//! Interrupt-mask critical section with nesting semantics.
//!
//! The timer pool and the event ring are the only structures shared
//! between interrupt context and the main loop. Every mutating access to
//! them goes through [`IrqGate`], which masks interrupts for the minimum
//! span and tracks nesting depth so re-entrant acquisition (an interrupt
//! handler locking while the main loop already holds the gate on another
//! core-less platform, or helper code locking inside an already-locked
//! caller) releases the mask only when the outermost guard drops.
//!
//! The guard is RAII: the mask is released on every exit path, including
//! early returns.
//!
//! # Example
//!
//! ```rust
//! use scanrig::irq::IrqGate;
//! use scanrig::hal::MockIrq;
//!
//! let mut gate = IrqGate::new(MockIrq::new());
//! {
//!     let _guard = gate.lock();
//!     // interrupts masked here
//! }
//! assert!(!gate.inner().masked.get());
//! ```

use crate::traits::InterruptMask;

/// Process-wide interrupt-mask gate with a nesting counter.
///
/// Exactly one gate exists per device; it is owned by
/// [`ScanDevice`](crate::ScanDevice) and passed by reference into every
/// operation that touches an interrupt-shared structure.
pub struct IrqGate<M: InterruptMask> {
    mask: M,
    depth: u32,
}

impl<M: InterruptMask> IrqGate<M> {
    /// Creates a gate over the given mask capability. Interrupts start
    /// unmasked.
    pub fn new(mask: M) -> Self {
        Self { mask, depth: 0 }
    }

    /// Enters the critical section, masking interrupts if this is the
    /// outermost acquisition.
    pub fn lock(&mut self) -> IrqGuard<'_, M> {
        if self.depth == 0 {
            self.mask.mask();
        }
        self.depth += 1;
        IrqGuard { gate: self }
    }

    /// Current nesting depth. Zero means interrupts are unmasked.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Access to the underlying mask capability (mock inspection).
    pub fn inner(&self) -> &M {
        &self.mask
    }
}

/// Scoped critical-section guard. Dropping it exits one nesting level
/// and unmasks interrupts when the depth returns to zero.
pub struct IrqGuard<'a, M: InterruptMask> {
    gate: &'a mut IrqGate<M>,
}

impl<M: InterruptMask> Drop for IrqGuard<'_, M> {
    fn drop(&mut self) {
        debug_assert!(self.gate.depth > 0);
        self.gate.depth -= 1;
        if self.gate.depth == 0 {
            self.gate.mask.unmask();
        }
    }
}
