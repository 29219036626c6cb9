//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for all hardware traits, enabling
//! development and testing on desktop without a physical rig. Each mock
//! exposes its recorded interactions as public fields so tests assert on
//! them directly, and offers `queue_*` helpers to script upcoming
//! hardware responses.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockStepper`] | [`StepperDrive`] | Tracks direction/enable/rate calls |
//! | [`MockSensor`] | [`ScanSensor`] | Queued trigger statuses, scripted samples |
//! | [`MockHost`] | [`HostLink`] | Captures transmitted frames |
//! | [`MockCounter`] | [`CycleCounter`] | Manually advanced time source |
//! | [`MockIrq`] | [`InterruptMask`] | Records mask/unmask pairs |
//!
//! # Example
//!
//! ```rust
//! use scanrig::hal::MockSensor;
//! use scanrig::sensor::SensorSession;
//! use scanrig::traits::{PrecisionMode, ScanSensor};
//!
//! let mut session = SensorSession::new(MockSensor::new());
//! session.set_timing(20_000, PrecisionMode::High);
//! session.initialize().unwrap();
//!
//! // Verify via the recorded configuration
//! assert_eq!(session.sensor().configured_frame_us, Some(20_000));
//! ```
//!
//! [`StepperDrive`]: crate::traits::StepperDrive
//! [`ScanSensor`]: crate::traits::ScanSensor
//! [`HostLink`]: crate::traits::HostLink
//! [`CycleCounter`]: crate::traits::CycleCounter
//! [`InterruptMask`]: crate::traits::InterruptMask

use core::cell::Cell;

use heapless::{Deque, Vec};

use crate::protocol::TX_BUF_LEN;
use crate::traits::{
    CycleCounter, HostLink, InterruptMask, PrecisionMode, RawSample, SampleStatus, ScanSensor,
    StepDirection, StepperDrive, TriggerStatus,
};

/// Error type shared by all mocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MockError;

// ============================================================================
// Hardware Mocks
// ============================================================================

/// Mock interrupt mask.
///
/// `Cell` fields keep the recorded state readable through the shared
/// reference [`IrqGate::inner`](crate::irq::IrqGate::inner) returns.
#[derive(Debug, Default)]
pub struct MockIrq {
    /// Whether interrupts are currently masked.
    pub masked: Cell<bool>,
    /// Total number of mask calls.
    pub mask_calls: Cell<u32>,
    /// Total number of unmask calls.
    pub unmask_calls: Cell<u32>,
}

impl MockIrq {
    /// Creates a mock with interrupts unmasked.
    pub fn new() -> Self {
        Self::default()
    }
}

impl InterruptMask for MockIrq {
    fn mask(&mut self) {
        self.masked.set(true);
        self.mask_calls.set(self.mask_calls.get() + 1);
    }

    fn unmask(&mut self) {
        self.masked.set(false);
        self.unmask_calls.set(self.unmask_calls.get() + 1);
    }
}

/// Mock 32-bit microsecond counter, advanced manually by tests.
#[derive(Debug, Default)]
pub struct MockCounter {
    value: Cell<u32>,
}

impl MockCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the raw counter value (wrapping scenarios).
    pub fn set(&self, value: u32) {
        self.value.set(value);
    }

    /// Advances the counter, wrapping at `u32::MAX`.
    pub fn advance(&self, delta: u32) {
        self.value.set(self.value.get().wrapping_add(delta));
    }
}

impl CycleCounter for MockCounter {
    fn count(&self) -> u32 {
        self.value.get()
    }
}

/// Mock stepper drive for testing.
#[derive(Debug)]
pub struct MockStepper {
    /// Whether the pulse output is gated on.
    pub enabled: bool,
    /// Last commanded direction.
    pub direction: StepDirection,
    /// Last accepted pulse rate.
    pub rate_hz: u32,
    /// When set, `set_rate_hz` fails.
    pub reject_rate: bool,
    /// Total enable/disable transitions.
    pub enable_calls: u32,
}

impl Default for MockStepper {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStepper {
    /// Creates a disabled drive at the default rate.
    pub fn new() -> Self {
        Self {
            enabled: false,
            direction: StepDirection::Positive,
            rate_hz: 1_000,
            reject_rate: false,
            enable_calls: 0,
        }
    }
}

impl StepperDrive for MockStepper {
    type Error = MockError;

    fn set_direction(&mut self, dir: StepDirection) -> Result<(), Self::Error> {
        self.direction = dir;
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
        self.enabled = enabled;
        self.enable_calls += 1;
        Ok(())
    }

    fn set_rate_hz(&mut self, hz: u32) -> Result<(), Self::Error> {
        if self.reject_rate {
            return Err(MockError);
        }
        self.rate_hz = hz;
        Ok(())
    }
}

/// Mock time-of-flight sensor.
///
/// Queue trigger responses with [`queue_status`](Self::queue_status); an
/// empty queue answers `Accepted`. `evaluate` returns whatever `sample`
/// holds at the time.
#[derive(Debug)]
pub struct MockSensor {
    /// When set, `initialize` fails.
    pub fail_init: bool,
    /// When set, `evaluate` fails.
    pub fail_evaluate: bool,
    /// Bus address passed to the last `initialize`.
    pub last_slave_id: Option<u8>,
    /// Frame time passed to the last `configure`.
    pub configured_frame_us: Option<u32>,
    /// Precision mode passed to the last `configure`.
    pub configured_mode: Option<PrecisionMode>,
    /// Sample returned by `evaluate`.
    pub sample: RawSample,
    /// Total trigger calls.
    pub trigger_calls: usize,
    /// Total abort calls.
    pub abort_calls: usize,
    statuses: Deque<TriggerStatus, 16>,
}

impl Default for MockSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSensor {
    /// Creates a sensor that accepts every trigger and returns a fixed
    /// valid sample (1.0 m, mid amplitude).
    pub fn new() -> Self {
        Self {
            fail_init: false,
            fail_evaluate: false,
            last_slave_id: None,
            configured_frame_us: None,
            configured_mode: None,
            sample: RawSample {
                range: 1 << 22,
                amplitude: 100 << 4,
                status: SampleStatus::Valid,
            },
            trigger_calls: 0,
            abort_calls: 0,
            statuses: Deque::new(),
        }
    }

    /// Queues the response for an upcoming trigger call.
    pub fn queue_status(&mut self, status: TriggerStatus) {
        self.statuses
            .push_back(status)
            .expect("mock status queue full");
    }
}

impl ScanSensor for MockSensor {
    type Error = MockError;

    fn initialize(&mut self, slave_id: u8) -> Result<(), Self::Error> {
        if self.fail_init {
            return Err(MockError);
        }
        self.last_slave_id = Some(slave_id);
        Ok(())
    }

    fn configure(&mut self, frame_time_us: u32, mode: PrecisionMode) -> Result<(), Self::Error> {
        self.configured_frame_us = Some(frame_time_us);
        self.configured_mode = Some(mode);
        Ok(())
    }

    fn trigger(&mut self) -> TriggerStatus {
        self.trigger_calls += 1;
        self.statuses.pop_front().unwrap_or(TriggerStatus::Accepted)
    }

    fn abort(&mut self) {
        self.abort_calls += 1;
    }

    fn evaluate(&mut self) -> Result<RawSample, Self::Error> {
        if self.fail_evaluate {
            return Err(MockError);
        }
        Ok(self.sample)
    }
}

// ============================================================================
// Transport Mock
// ============================================================================

/// Mock host link that captures transmitted frames.
#[derive(Debug, Default)]
pub struct MockHost {
    /// Every frame transmitted, in order.
    pub frames: Vec<Vec<u8, TX_BUF_LEN>, 32>,
    /// When set, `transmit` fails.
    pub fail: bool,
}

impl MockHost {
    /// Creates an empty capture buffer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostLink for MockHost {
    type Error = MockError;

    fn transmit(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        if self.fail {
            return Err(MockError);
        }
        let stored = Vec::from_slice(frame).map_err(|_| MockError)?;
        self.frames.push(stored).map_err(|_| MockError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_queue_drains_then_accepts() {
        let mut sensor = MockSensor::new();
        sensor.queue_status(TriggerStatus::Busy);
        assert_eq!(sensor.trigger(), TriggerStatus::Busy);
        assert_eq!(sensor.trigger(), TriggerStatus::Accepted);
        assert_eq!(sensor.trigger_calls, 2);
    }

    #[test]
    fn counter_wraps() {
        let counter = MockCounter::new();
        counter.set(u32::MAX);
        counter.advance(3);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn stepper_records_commands() {
        let mut stepper = MockStepper::new();
        stepper.set_direction(StepDirection::Negative).unwrap();
        stepper.set_enabled(true).unwrap();
        assert_eq!(stepper.direction, StepDirection::Negative);
        assert!(stepper.enabled);
        assert_eq!(stepper.enable_calls, 1);
    }

    #[test]
    fn host_records_frames() {
        let mut host = MockHost::new();
        host.transmit(&[1, 2, 3]).unwrap();
        host.transmit(&[4]).unwrap();
        assert_eq!(host.frames.len(), 2);
        assert_eq!(host.frames[0].as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn host_failure_is_reported() {
        let mut host = MockHost::new();
        host.fail = true;
        assert_eq!(host.transmit(&[0]), Err(MockError));
        assert!(host.frames.is_empty());
    }
}
