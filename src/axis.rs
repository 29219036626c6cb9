//! Per-axis motor sequencing.
//!
//! A [`MotorAxis`] turns a relative step count into a timed pulse train:
//! it points the direction pin, gates the pulse generator on, and
//! schedules a single [`TimerWheel`](crate::timer::TimerWheel) deadline
//! at `steps × interval`. When the deadline event is delivered back
//! through the main loop, the axis books the position change, measures
//! how late the deadline actually ran, and folds a bounded correction
//! into the *next* movement so interrupt jitter never accumulates into
//! position drift.
//!
//! Only the main loop mutates axis state; the interrupt side merely
//! defers the deadline event. One movement may be outstanding per axis
//! at a time.
//!
//! # Drift correction
//!
//! While a move is in flight the pulse generator keeps stepping until
//! the deadline handler gates it off, so a deadline that runs `d` µs
//! late produces `d / interval` extra physical steps in the direction of
//! travel. The axis truncates that quotient (corrections smaller than a
//! full step interval are ignored), clamps it to
//! [`MAX_DRIFT_STEPS`], and subtracts it from the next requested delta.
//! Logical `position` always changes by exactly the requested amount.

use crate::error::{Error, Result};
use crate::event::{Event, SchedCtx};
use crate::timer::TimerHandle;
use crate::traits::{InterruptMask, StepDirection, StepperDrive};

/// Identifies one of the two rig axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AxisId {
    /// Horizontal (column) axis.
    X,
    /// Vertical (row) axis.
    Y,
}

/// Movement state of one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AxisStatus {
    /// No movement outstanding.
    #[default]
    Idle,
    /// A movement deadline is scheduled.
    Busy,
}

/// Largest drift correction folded into a single subsequent move.
pub const MAX_DRIFT_STEPS: i32 = 2;

/// Default pulse rate until the host configures one.
pub const DEFAULT_DRIVE_HZ: u32 = 1_000;

/// One motor axis: position tracking, move sequencing, drift
/// compensation.
pub struct MotorAxis<D: StepperDrive> {
    drive: D,
    id: AxisId,
    position: i32,
    pending: i32,
    interval_us: u32,
    drive_hz: u32,
    status: AxisStatus,
    active_timer: Option<TimerHandle>,
    move_started_us: u64,
    requested_us: u64,
    carry_steps: i32,
    position_valid: bool,
}

impl<D: StepperDrive> MotorAxis<D> {
    /// Creates an idle axis at the origin with the default pulse rate.
    pub fn new(id: AxisId, drive: D) -> Self {
        Self {
            drive,
            id,
            position: 0,
            pending: 0,
            interval_us: 1_000_000 / DEFAULT_DRIVE_HZ,
            drive_hz: DEFAULT_DRIVE_HZ,
            status: AxisStatus::Idle,
            active_timer: None,
            move_started_us: 0,
            requested_us: 0,
            carry_steps: 0,
            position_valid: true,
        }
    }

    /// Axis identity.
    pub fn id(&self) -> AxisId {
        self.id
    }

    /// Logical position in steps from the origin.
    pub fn position(&self) -> i32 {
        self.position
    }

    /// Whether `position` can be trusted. Cleared by
    /// [`emergency_stop`](Self::emergency_stop), restored by
    /// [`mark_homed`](Self::mark_homed).
    pub fn position_valid(&self) -> bool {
        self.position_valid
    }

    /// Current movement state.
    pub fn status(&self) -> AxisStatus {
        self.status
    }

    /// True when no movement is outstanding.
    pub fn is_idle(&self) -> bool {
        self.status == AxisStatus::Idle
    }

    /// Configured pulse rate in steps per second.
    pub fn drive_hz(&self) -> u32 {
        self.drive_hz
    }

    /// Per-step interval in microseconds.
    pub fn interval_us(&self) -> u32 {
        self.interval_us
    }

    /// Access to the underlying drive (mock inspection).
    pub fn drive(&self) -> &D {
        &self.drive
    }

    /// Declares the current position a trusted reference point.
    ///
    /// Called by the capture controller once a homing move completes.
    pub fn mark_homed(&mut self) {
        self.position_valid = true;
    }

    /// Sets the pulse rate and recomputes the per-step interval.
    ///
    /// Rejected with [`Error::Busy`] while a move is outstanding and
    /// with [`Error::Unsupported`] when the pulse generator cannot
    /// produce the rate.
    pub fn set_clock_speed(&mut self, hz: u32) -> Result<()> {
        if self.status == AxisStatus::Busy {
            return Err(Error::Busy);
        }
        if hz == 0 || hz > 1_000_000 {
            return Err(Error::Unsupported);
        }
        if let Err(e) = self.drive.set_rate_hz(hz) {
            log::warn!("axis {:?}: drive rejected rate {} Hz: {:?}", self.id, hz, e);
            return Err(Error::Unsupported);
        }
        self.drive_hz = hz;
        self.interval_us = 1_000_000 / hz;
        Ok(())
    }

    /// Starts a relative move of `delta` steps.
    ///
    /// Rejected with [`Error::Busy`] unless the axis is idle. A zero
    /// delta still schedules an immediate deadline so the completion
    /// event flows through the normal path.
    pub fn move_by<M: InterruptMask>(&mut self, delta: i32, ctx: &mut SchedCtx<M>) -> Result<()> {
        if self.status == AxisStatus::Busy {
            return Err(Error::Busy);
        }

        if delta == 0 {
            // No physical motion; complete through the timer path so the
            // caller sees a single kind of completion.
            let handle = ctx
                .wheel
                .schedule(ctx.gate, ctx.now_us, 0, Event::AxisDone(self.id))?;
            self.pending = 0;
            self.requested_us = 0;
            self.move_started_us = ctx.now_us;
            self.active_timer = Some(handle);
            self.status = AxisStatus::Busy;
            return Ok(());
        }

        // Fold the drift carried over from the previous move, never
        // flipping the direction of the requested motion.
        let mut adjusted = delta - self.carry_steps;
        self.carry_steps = 0;
        if adjusted == 0 || adjusted.signum() != delta.signum() {
            adjusted = delta.signum();
        }

        let dir = StepDirection::from_delta(delta);
        if let Err(e) = self.drive.set_direction(dir) {
            log::warn!("axis {:?}: set_direction failed: {:?}", self.id, e);
            return Err(Error::Unsupported);
        }
        if let Err(e) = self.drive.set_enabled(true) {
            log::warn!("axis {:?}: drive enable failed: {:?}", self.id, e);
            return Err(Error::Unsupported);
        }

        let duration_us = adjusted.unsigned_abs() as u64 * self.interval_us as u64;
        let handle = match ctx
            .wheel
            .schedule(ctx.gate, ctx.now_us, duration_us, Event::AxisDone(self.id))
        {
            Ok(h) => h,
            Err(e) => {
                // Do not leave the pulse train running with no deadline.
                if let Err(de) = self.drive.set_enabled(false) {
                    log::error!("axis {:?}: drive disable failed: {:?}", self.id, de);
                }
                return Err(e);
            }
        };

        self.pending = delta;
        self.requested_us = duration_us;
        self.move_started_us = ctx.now_us;
        self.active_timer = Some(handle);
        self.status = AxisStatus::Busy;
        Ok(())
    }

    /// Moves to an absolute position in steps from the origin.
    pub fn move_to<M: InterruptMask>(&mut self, pos: i32, ctx: &mut SchedCtx<M>) -> Result<()> {
        self.move_by(pos - self.position, ctx)
    }

    /// Completes the outstanding move.
    ///
    /// Invoked by the main loop when the axis deadline event is drained.
    /// Books the position change, computes the drift correction for the
    /// next move, and returns the axis to idle.
    pub fn on_deadline(&mut self, now_us: u64) {
        if self.status != AxisStatus::Busy {
            log::warn!("axis {:?}: stale deadline event ignored", self.id);
            return;
        }

        if let Err(e) = self.drive.set_enabled(false) {
            log::error!("axis {:?}: drive disable failed: {:?}", self.id, e);
        }

        self.position += self.pending;

        if self.pending != 0 {
            let drift_us = now_us
                .wrapping_sub(self.move_started_us)
                .saturating_sub(self.requested_us);
            let drift_steps = (drift_us / self.interval_us as u64).min(MAX_DRIFT_STEPS as u64);
            self.carry_steps = drift_steps as i32 * self.pending.signum();
            if self.carry_steps != 0 {
                log::debug!(
                    "axis {:?}: {} step drift correction carried",
                    self.id,
                    self.carry_steps
                );
            }
        }

        self.pending = 0;
        self.active_timer = None;
        self.status = AxisStatus::Idle;
    }

    /// Immediately disables the drive output and abandons the pending
    /// move.
    ///
    /// The pending step count is discarded without reconciling
    /// `position`, so the logical position becomes approximate:
    /// [`position_valid`](Self::position_valid) reports `false` until
    /// the axis is re-homed.
    pub fn emergency_stop<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) {
        if let Err(e) = self.drive.set_enabled(false) {
            log::error!("axis {:?}: drive disable failed: {:?}", self.id, e);
        }
        if let Some(handle) = self.active_timer.take() {
            ctx.wheel.cancel(ctx.gate, handle);
        }
        if self.status == AxisStatus::Busy {
            log::warn!(
                "axis {:?}: emergency stop with {} steps pending; position now approximate",
                self.id,
                self.pending
            );
            self.position_valid = false;
        }
        self.pending = 0;
        self.carry_steps = 0;
        self.status = AxisStatus::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ScanTimerWheel;
    use crate::hal::{MockIrq, MockStepper};
    use crate::irq::IrqGate;

    struct Rig {
        gate: IrqGate<MockIrq>,
        wheel: ScanTimerWheel,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                gate: IrqGate::new(MockIrq::new()),
                wheel: ScanTimerWheel::new(),
            }
        }

        fn ctx(&mut self, now_us: u64) -> SchedCtx<'_, MockIrq> {
            SchedCtx {
                gate: &mut self.gate,
                wheel: &mut self.wheel,
                now_us,
            }
        }

        /// Fires the timer interrupt and returns the delivered events.
        fn tick(&mut self, now_us: u64) -> heapless::Vec<Event, 8> {
            let mut fired = heapless::Vec::new();
            self.wheel.update(&mut self.gate, now_us, &mut fired);
            fired
        }
    }

    #[test]
    fn move_by_updates_position_exactly() {
        let mut rig = Rig::new();
        let mut axis = MotorAxis::new(AxisId::X, MockStepper::new());

        axis.move_by(5, &mut rig.ctx(0)).unwrap();
        assert_eq!(axis.status(), AxisStatus::Busy);
        assert!(axis.drive().enabled);
        assert_eq!(axis.drive().direction, StepDirection::Positive);

        // Deadline at 5 steps x 1000 us.
        let fired = rig.tick(5_000);
        assert_eq!(fired.as_slice(), &[Event::AxisDone(AxisId::X)]);
        axis.on_deadline(5_000);

        assert_eq!(axis.position(), 5);
        assert!(axis.is_idle());
        assert!(!axis.drive().enabled);
    }

    #[test]
    fn move_rejected_while_busy() {
        let mut rig = Rig::new();
        let mut axis = MotorAxis::new(AxisId::Y, MockStepper::new());
        axis.move_by(3, &mut rig.ctx(0)).unwrap();
        assert_eq!(axis.move_by(1, &mut rig.ctx(0)), Err(Error::Busy));
    }

    #[test]
    fn move_to_is_relative_to_position() {
        let mut rig = Rig::new();
        let mut axis = MotorAxis::new(AxisId::X, MockStepper::new());

        axis.move_to(-4, &mut rig.ctx(0)).unwrap();
        assert_eq!(axis.drive().direction, StepDirection::Negative);
        rig.tick(4_000);
        axis.on_deadline(4_000);
        assert_eq!(axis.position(), -4);

        axis.move_to(0, &mut rig.ctx(4_000)).unwrap();
        assert_eq!(axis.drive().direction, StepDirection::Positive);
        rig.tick(8_000);
        axis.on_deadline(8_000);
        assert_eq!(axis.position(), 0);
    }

    #[test]
    fn zero_delta_completes_through_timer() {
        let mut rig = Rig::new();
        let mut axis = MotorAxis::new(AxisId::X, MockStepper::new());

        axis.move_by(0, &mut rig.ctx(100)).unwrap();
        assert_eq!(axis.status(), AxisStatus::Busy);
        // Pulse output never armed for a zero move.
        assert!(!axis.drive().enabled);

        let fired = rig.tick(100);
        assert_eq!(fired.as_slice(), &[Event::AxisDone(AxisId::X)]);
        axis.on_deadline(100);
        assert_eq!(axis.position(), 0);
        assert!(axis.is_idle());
    }

    #[test]
    fn set_clock_speed_recomputes_interval() {
        let mut axis = MotorAxis::new(AxisId::X, MockStepper::new());
        axis.set_clock_speed(2_000).unwrap();
        assert_eq!(axis.interval_us(), 500);
        assert_eq!(axis.drive_hz(), 2_000);
    }

    #[test]
    fn set_clock_speed_rejects_unsupported() {
        let mut axis = MotorAxis::new(AxisId::X, MockStepper::new());
        assert_eq!(axis.set_clock_speed(0), Err(Error::Unsupported));

        let mut picky = MockStepper::new();
        picky.reject_rate = true;
        let mut axis = MotorAxis::new(AxisId::X, picky);
        assert_eq!(axis.set_clock_speed(500), Err(Error::Unsupported));
        // Old interval untouched.
        assert_eq!(axis.interval_us(), 1_000);
    }

    #[test]
    fn late_deadline_carries_bounded_drift_into_next_move() {
        let mut rig = Rig::new();
        let mut axis = MotorAxis::new(AxisId::X, MockStepper::new());

        // Request 10 steps (10_000 us); the deadline runs 1500 us late,
        // i.e. one extra physical step (truncated from 1.5).
        axis.move_by(10, &mut rig.ctx(0)).unwrap();
        rig.tick(11_500);
        axis.on_deadline(11_500);
        assert_eq!(axis.position(), 10);

        // The next move requests one fewer timer step.
        axis.move_by(10, &mut rig.ctx(11_500)).unwrap();
        assert_eq!(axis.requested_us, 9_000);
        rig.tick(20_500);
        axis.on_deadline(20_500);
        // Logical position still advances by the full delta.
        assert_eq!(axis.position(), 20);
    }

    #[test]
    fn drift_correction_is_clamped() {
        let mut rig = Rig::new();
        let mut axis = MotorAxis::new(AxisId::X, MockStepper::new());

        // Grossly late deadline: 50 steps worth of drift, clamped to 2.
        axis.move_by(10, &mut rig.ctx(0)).unwrap();
        rig.tick(60_000);
        axis.on_deadline(60_000);
        assert_eq!(axis.carry_steps, MAX_DRIFT_STEPS);

        axis.move_by(10, &mut rig.ctx(60_000)).unwrap();
        assert_eq!(axis.requested_us, 8_000);
    }

    #[test]
    fn drift_never_flips_direction() {
        let mut rig = Rig::new();
        let mut axis = MotorAxis::new(AxisId::X, MockStepper::new());

        axis.move_by(5, &mut rig.ctx(0)).unwrap();
        rig.tick(8_000); // 3000 us late -> clamped carry of +2
        axis.on_deadline(8_000);
        assert_eq!(axis.carry_steps, 2);

        // A one-step move in the same direction would be cancelled out by
        // the carry; it must still move at least one step.
        axis.move_by(1, &mut rig.ctx(8_000)).unwrap();
        assert_eq!(axis.requested_us, 1_000);
    }

    #[test]
    fn sub_step_drift_is_ignored() {
        let mut rig = Rig::new();
        let mut axis = MotorAxis::new(AxisId::X, MockStepper::new());

        axis.move_by(4, &mut rig.ctx(0)).unwrap();
        rig.tick(4_900); // 900 us late, under one 1000 us step
        axis.on_deadline(4_900);
        assert_eq!(axis.carry_steps, 0);
    }

    #[test]
    fn emergency_stop_discards_pending_and_invalidates_position() {
        let mut rig = Rig::new();
        let mut axis = MotorAxis::new(AxisId::X, MockStepper::new());

        axis.move_by(10, &mut rig.ctx(0)).unwrap();
        axis.emergency_stop(&mut rig.ctx(3_000));

        assert!(axis.is_idle());
        assert!(!axis.drive().enabled);
        assert_eq!(axis.position(), 0);
        assert!(!axis.position_valid());

        // The cancelled deadline never fires.
        let fired = rig.tick(20_000);
        assert!(fired.is_empty());

        // Re-homing restores trust in the position.
        axis.move_to(0, &mut rig.ctx(3_000)).unwrap();
        rig.tick(3_000);
        axis.on_deadline(3_000);
        axis.mark_homed();
        assert!(axis.position_valid());
    }

    #[test]
    fn stale_deadline_event_is_ignored() {
        let mut axis: MotorAxis<MockStepper> = MotorAxis::new(AxisId::Y, MockStepper::new());
        axis.on_deadline(1_000);
        assert_eq!(axis.position(), 0);
        assert!(axis.is_idle());
    }
}
