//! Hardware abstraction traits for stepper drives, the ToF sensor, the
//! host transport, and time sources.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`StepperDrive`] | Direction, drive enable, and pulse rate for one axis |
//! | [`ScanSensor`] | Vendor time-of-flight sensor driver |
//! | [`HostLink`] | Outbound framed byte-stream to the host |
//! | [`CycleCounter`] | Free-running 32-bit hardware microsecond counter |
//! | [`Clock`] | 64-bit monotonic microsecond time |
//! | [`InterruptMask`] | Global interrupt enable/disable |
//!
//! # Implementation
//!
//! For testing and desktop development, use the mock implementations
//! from [`crate::hal::mock`]. Real firmware supplies thin wrappers over
//! the platform peripherals; none of the core modules touch registers
//! directly.

/// Direction of travel along one axis.
///
/// Maps to the DIR pin polarity of the step/dir driver. Positive steps
/// increase the axis position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StepDirection {
    /// Toward increasing position.
    #[default]
    Positive,
    /// Toward decreasing position.
    Negative,
}

impl StepDirection {
    /// Direction for a signed step delta. Zero maps to `Positive`.
    pub const fn from_delta(delta: i32) -> Self {
        if delta < 0 {
            StepDirection::Negative
        } else {
            StepDirection::Positive
        }
    }
}

/// Pulse-train generation capability for one motor axis.
///
/// The core never bit-bangs step pulses itself: it selects a direction,
/// sets the pulse rate, and gates the output on and off. How pulses are
/// produced (hardware PWM, RMT, timer toggling a GPIO) is up to the
/// implementation.
///
/// # Implementation Notes
///
/// - `set_rate_hz` may reject rates the pulse generator cannot produce;
///   the core surfaces that as [`Error::Unsupported`](crate::Error::Unsupported).
/// - `set_enabled(false)` must take effect immediately; it is the
///   emergency-stop path.
pub trait StepperDrive {
    /// Error type for drive operations.
    type Error: core::fmt::Debug;

    /// Set the direction pin for subsequent pulses.
    fn set_direction(&mut self, dir: StepDirection) -> Result<(), Self::Error>;

    /// Gate the pulse output on or off.
    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Set the pulse rate in steps per second.
    ///
    /// Returns an error if the underlying generator cannot produce the
    /// requested rate.
    fn set_rate_hz(&mut self, hz: u32) -> Result<(), Self::Error>;
}

/// Sensor precision mode, traded against frame time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PrecisionMode {
    /// Default frame time, default averaging.
    #[default]
    Standard,
    /// Longer integration for lower range noise.
    High,
}

/// Status returned by [`ScanSensor::trigger`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerStatus {
    /// Measurement accepted; a completion interrupt will follow.
    Accepted,
    /// A previous measurement is still in flight.
    Busy,
    /// The laser duty-cycle limiter rejected the trigger. Transient
    /// contention, not a fault: resubmit without consuming a retry.
    PowerLimit,
    /// The previous measurement was aborted before completion.
    Aborted,
    /// The driver rejected the trigger for any other reason.
    Failed,
}

/// Validity classification of one raw sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleStatus {
    /// Range and amplitude are usable.
    Valid,
    /// Return signal too weak for a reliable range.
    LowSignal,
    /// Receiver saturated; range unreliable.
    Saturated,
}

/// One evaluated measurement as produced by the vendor driver.
#[derive(Clone, Copy, Debug)]
pub struct RawSample {
    /// Range in raw Q9.22 meters.
    pub range: i32,
    /// Amplitude in raw UQ12.4.
    pub amplitude: u16,
    /// Validity of this sample.
    pub status: SampleStatus,
}

/// Vendor time-of-flight sensor driver.
///
/// The vendor SDK's signal processing is a black box behind this trait.
/// The completion interrupt is *not* modeled here: the platform wires the
/// vendor's done-callback to [`ScanDevice::on_sensor_irq`], which only
/// defers an event to the main loop.
///
/// [`ScanDevice::on_sensor_irq`]: crate::ScanDevice::on_sensor_irq
pub trait ScanSensor {
    /// Error type for initialization, configuration, and evaluation.
    type Error: core::fmt::Debug;

    /// Bring up the sensor on the given bus address.
    fn initialize(&mut self, slave_id: u8) -> Result<(), Self::Error>;

    /// Apply frame time and precision mode.
    fn configure(&mut self, frame_time_us: u32, mode: PrecisionMode) -> Result<(), Self::Error>;

    /// Start one measurement. Never blocks.
    fn trigger(&mut self) -> TriggerStatus;

    /// Abort an in-flight measurement, if any.
    fn abort(&mut self);

    /// Evaluate the raw frame of the most recent completed measurement.
    fn evaluate(&mut self) -> Result<RawSample, Self::Error>;
}

/// Outbound transport to the host.
///
/// The framing bytes on the wire, flow control, and retry policy live in
/// the transport; the core hands it fully-encoded frames. Implementations
/// must bound their internal retries rather than spin.
pub trait HostLink {
    /// Error type for transmission.
    type Error: core::fmt::Debug;

    /// Transmit one encoded frame (header plus payload).
    fn transmit(&mut self, frame: &[u8]) -> Result<(), Self::Error>;
}

/// Free-running 32-bit hardware microsecond counter.
///
/// Wraps at `u32::MAX`; [`WideClock`](crate::clock::WideClock) extends it
/// to 64 bits with a software epoch.
pub trait CycleCounter {
    /// Current raw counter value in microseconds.
    fn count(&self) -> u32;
}

/// Monotonic 64-bit microsecond time source.
///
/// # Example
///
/// ```rust
/// use scanrig::traits::Clock;
/// use scanrig::clock::WideClock;
/// use scanrig::hal::MockCounter;
///
/// let clock = WideClock::new(MockCounter::new());
/// assert_eq!(clock.now_us(), 0);
/// clock.counter().advance(250);
/// assert_eq!(clock.now_us(), 250);
/// ```
pub trait Clock {
    /// Current time in microseconds since an arbitrary epoch.
    ///
    /// Must be monotonically non-decreasing.
    fn now_us(&self) -> u64;
}

/// Global interrupt enable/disable capability.
///
/// Used exclusively through [`IrqGate`](crate::irq::IrqGate), which adds
/// the nesting counter and scoped release. `mask` and `unmask` are called
/// strictly paired and balanced.
pub trait InterruptMask {
    /// Disable interrupt delivery.
    fn mask(&mut self);

    /// Re-enable interrupt delivery.
    fn unmask(&mut self);
}
