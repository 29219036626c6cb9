//! Retrying wrapper around the vendor ToF sensor driver.
//!
//! [`SensorSession`] owns the vendor driver handle and layers three
//! policies on top of it:
//!
//! - **Bounded retry**: a trigger is attempted up to [`RETRY_BUDGET`]
//!   times. A `PowerLimit` status is resubmitted without consuming a
//!   retry (the cause is transient laser duty-cycle contention, not a
//!   fault); a `Busy` status aborts the stuck measurement and retries.
//!   Exhausting the budget invalidates the session.
//! - **Watchdog**: whenever a measurement is outstanding a deadline of
//!   `frame_delay × WATCHDOG_MULT` is armed; if it elapses without a
//!   completion the measurement is resubmitted rather than reported as
//!   an error (a lost interrupt is recovered, not surfaced).
//! - **Re-initialization**: after a fatal fault the session drops to
//!   uninitialized and must be re-initialized before the next trigger.
//!
//! The vendor completion interrupt never touches session state: it only
//! defers [`Event::SensorDone`](crate::event::Event::SensorDone), and the
//! main loop calls [`SensorSession::on_complete`] when it drains the
//! event.

use crate::error::{Error, Result};
use crate::event::{Event, SchedCtx};
use crate::timer::TimerHandle;
use crate::traits::{InterruptMask, PrecisionMode, RawSample, ScanSensor, TriggerStatus};

/// Trigger attempts allowed per measurement before the session is
/// invalidated.
pub const RETRY_BUDGET: u32 = 3;

/// Upper bound on free `PowerLimit` resubmissions per measurement.
///
/// Power-limit rejections do not consume retries, but a wedged limiter
/// must not spin the loop forever; past this cap the status is treated
/// as an ordinary failed attempt.
pub const POWER_LIMIT_CAP: u32 = 32;

/// Watchdog deadline as a multiple of the sensor frame delay.
pub const WATCHDOG_MULT: u64 = 8;

/// Default sensor bus address.
pub const DEFAULT_SLAVE_ID: u8 = 0;

/// Default sensor frame delay in microseconds.
pub const DEFAULT_FRAME_DELAY_US: u32 = 10_000;

/// Result of handling a completion event.
#[derive(Clone, Copy, Debug)]
pub enum Completion {
    /// No measurement was outstanding; the event was stale (for example
    /// a completion racing a watchdog resubmission). Ignore it.
    Stale,
    /// The raw frame evaluated successfully.
    Sample(RawSample),
    /// The frame completed but evaluation failed; the cell is lost.
    EvalFailed,
}

/// Vendor sensor driver wrapped with retry, watchdog, and
/// re-initialization policy.
pub struct SensorSession<S: ScanSensor> {
    sensor: S,
    slave_id: u8,
    initialized: bool,
    frame_delay_us: u32,
    precision: PrecisionMode,
    outstanding: bool,
    watchdog: Option<TimerHandle>,
    triggered_at_us: u64,
}

impl<S: ScanSensor> SensorSession<S> {
    /// Wraps a vendor driver handle. The session starts uninitialized.
    pub fn new(sensor: S) -> Self {
        Self {
            sensor,
            slave_id: DEFAULT_SLAVE_ID,
            initialized: false,
            frame_delay_us: DEFAULT_FRAME_DELAY_US,
            precision: PrecisionMode::Standard,
            outstanding: false,
            watchdog: None,
            triggered_at_us: 0,
        }
    }

    /// Overrides the sensor bus address.
    pub fn with_slave_id(mut self, slave_id: u8) -> Self {
        self.slave_id = slave_id;
        self
    }

    /// Whether the session is initialized and able to trigger.
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// Whether a measurement is in flight.
    pub fn outstanding(&self) -> bool {
        self.outstanding
    }

    /// Configured frame delay in microseconds.
    pub fn frame_delay_us(&self) -> u32 {
        self.frame_delay_us
    }

    /// Configured precision mode.
    pub fn precision(&self) -> PrecisionMode {
        self.precision
    }

    /// Monotonic timestamp of the most recent accepted trigger.
    pub fn triggered_at_us(&self) -> u64 {
        self.triggered_at_us
    }

    /// Access to the underlying driver (mock inspection).
    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    /// Mutable access to the underlying driver (mock setup).
    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// Stores new timing parameters.
    ///
    /// The session drops to uninitialized; the next
    /// [`initialize`](Self::initialize) applies them to the hardware.
    pub fn set_timing(&mut self, frame_delay_us: u32, precision: PrecisionMode) {
        self.frame_delay_us = frame_delay_us;
        self.precision = precision;
        self.initialized = false;
    }

    /// (Re)configures the vendor sensor with the current timing.
    ///
    /// On failure the session stays uninitialized and the caller is
    /// expected to retry later.
    pub fn initialize(&mut self) -> Result<()> {
        self.initialized = false;
        if let Err(e) = self.sensor.initialize(self.slave_id) {
            log::error!("sensor init failed: {:?}", e);
            return Err(Error::NotInitialized);
        }
        if let Err(e) = self.sensor.configure(self.frame_delay_us, self.precision) {
            log::error!("sensor configure failed: {:?}", e);
            return Err(Error::NotInitialized);
        }
        self.initialized = true;
        log::debug!(
            "sensor session initialized (frame {} us, {:?})",
            self.frame_delay_us,
            self.precision
        );
        Ok(())
    }

    /// Starts one measurement, retrying within the budget.
    ///
    /// On success the watchdog deadline is armed and the completion will
    /// arrive as [`Event::SensorDone`]. Exhausting the budget invalidates
    /// the session and returns [`Error::Exhausted`].
    pub fn trigger_measurement<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        if self.outstanding {
            return Err(Error::Busy);
        }

        let mut attempts = 0u32;
        let mut resubmits = 0u32;
        while attempts < RETRY_BUDGET {
            match self.sensor.trigger() {
                TriggerStatus::Accepted => {
                    self.outstanding = true;
                    self.triggered_at_us = ctx.now_us;
                    self.arm_watchdog(ctx);
                    return Ok(());
                }
                TriggerStatus::PowerLimit if resubmits < POWER_LIMIT_CAP => {
                    // Transient duty-cycle contention: free resubmission.
                    resubmits += 1;
                }
                TriggerStatus::Busy => {
                    log::warn!("sensor busy on trigger; aborting and retrying");
                    self.sensor.abort();
                    attempts += 1;
                }
                status => {
                    log::warn!("sensor trigger rejected ({:?}); retrying", status);
                    attempts += 1;
                }
            }
        }

        log::error!("sensor trigger retry budget exhausted; session invalidated");
        self.initialized = false;
        Err(Error::Exhausted)
    }

    /// Handles the deferred completion event.
    ///
    /// Cancels the watchdog and evaluates the raw frame. Stale events
    /// (no measurement outstanding) are reported as such and must be
    /// ignored by the caller.
    pub fn on_complete<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) -> Completion {
        if !self.outstanding {
            log::warn!("sensor completion with no measurement outstanding");
            return Completion::Stale;
        }
        self.outstanding = false;
        if let Some(handle) = self.watchdog.take() {
            ctx.wheel.cancel(ctx.gate, handle);
        }

        match self.sensor.evaluate() {
            Ok(sample) => Completion::Sample(sample),
            Err(e) => {
                log::warn!("sample evaluation failed: {:?}", e);
                Completion::EvalFailed
            }
        }
    }

    /// Handles the watchdog deadline.
    ///
    /// If the completion interrupt was missed, the stuck measurement is
    /// aborted and resubmitted. Returns `Ok(true)` when a resubmission
    /// was issued, `Ok(false)` for a stale watchdog, and
    /// [`Error::Exhausted`] when the resubmission spent the retry
    /// budget.
    pub fn on_watchdog<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) -> Result<bool> {
        if !self.outstanding {
            // Completion and watchdog raced; the completion won.
            return Ok(false);
        }

        log::warn!(
            "measurement completion missed after {} us; resubmitting",
            ctx.now_us.wrapping_sub(self.triggered_at_us)
        );
        self.outstanding = false;
        self.watchdog = None;
        self.sensor.abort();
        self.trigger_measurement(ctx)?;
        Ok(true)
    }

    fn arm_watchdog<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) {
        let delay = self.frame_delay_us as u64 * WATCHDOG_MULT;
        match ctx
            .wheel
            .schedule(ctx.gate, ctx.now_us, delay, Event::SensorWatchdog)
        {
            Ok(handle) => self.watchdog = Some(handle),
            Err(e) => {
                // Degraded but not fatal: the measurement proceeds
                // without lost-interrupt detection.
                log::warn!("watchdog slot unavailable: {:?}", e);
                self.watchdog = None;
            }
        }
    }
}
