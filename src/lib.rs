//! # scanrig
//!
//! Firmware core for a two-axis stepper scanning rig with a
//! time-of-flight distance sensor: it rasterizes a rectangular grid,
//! one measurement per cell, and streams the result to a host line by
//! line over a framed byte protocol.
//!
//! ## Features
//!
//! - **Hardware abstraction**: traits for stepper drives, the ToF
//!   sensor, the host link, and time sources
//! - **Cooperative timing**: a generation-checked timer pool and a
//!   deferred event queue keep interrupt handlers minimal
//! - **Drift-compensated motion**: late movement deadlines fold a
//!   bounded step correction into the next move
//! - **Resilient sensing**: bounded trigger retries, a completion
//!   watchdog, and background re-initialization after faults
//! - **Serpentine raster**: rows alternate direction; lines always
//!   arrive at the host left to right
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without
//! hardware:
//!
//! - `traits` - hardware abstractions
//! - `irq` / `clock` / `timer` / `event` - scheduling substrate
//! - `axis` / `sensor` - per-peripheral sequencing policy
//! - `capture` - the raster scan state machine
//! - `protocol` / `config` - host surface
//! - `device` - the assembled [`ScanDevice`] a binary owns
//! - `hal` - mock implementations for testing
//!
//! ## Example
//!
//! ```rust
//! use scanrig::{
//!     CaptureController, ScanConfig, ScanDevice,
//!     hal::{MockCounter, MockHost, MockIrq, MockSensor, MockStepper},
//! };
//!
//! let config = ScanConfig::default()
//!     .with_resolution(2, 2)
//!     .with_steps_per_pixel(1, 1);
//! let controller = CaptureController::new(
//!     MockStepper::new(),
//!     MockStepper::new(),
//!     MockSensor::new(),
//!     MockHost::new(),
//!     config,
//! );
//! let mut device = ScanDevice::new(controller, MockCounter::new(), MockIrq::new());
//!
//! // Host asks for a scan; interrupts and the main loop do the rest.
//! device.on_string_command("start").unwrap();
//! device.on_timer_irq();
//! device.poll();
//! assert!(device.controller().session().outstanding());
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

/// Per-axis motor sequencing with drift compensation.
pub mod axis;
/// Raster capture state machine.
pub mod capture;
/// Monotonic 64-bit clock over a wrapping hardware counter.
pub mod clock;
/// Scan configuration and runtime parameter keys.
pub mod config;
/// Device assembly: interrupt entry points and the main-loop poll.
pub mod device;
/// Error taxonomy shared across the crate.
pub mod error;
/// Deferred event queue and scheduling context.
pub mod event;
/// Fixed-point sample formats.
pub mod fixed;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Interrupt-mask critical section with nesting semantics.
pub mod irq;
/// Host wire protocol: framing, commands, and reports.
pub mod protocol;
/// Retrying wrapper around the vendor ToF sensor driver.
pub mod sensor;
/// Generation-checked timer pool.
pub mod timer;
/// Core traits for hardware abstraction.
pub mod traits;

// Re-exports for convenience
pub use axis::{AxisId, AxisStatus, MotorAxis};
pub use capture::{CaptureController, ScanDirection, ScanState};
pub use clock::{time_le, WideClock};
pub use config::{ConfigKey, ScanConfig};
pub use device::ScanDevice;
pub use error::{Error, ProtocolError, Result};
pub use event::{Event, EventQueue, ScanTimerWheel, SchedCtx};
pub use fixed::{AmplitudeUq12_4, PixelSample, RangeQ9_22};
pub use irq::{IrqGate, IrqGuard};
pub use protocol::{Command, LineBlock, StatusFlags, StatusReport};
pub use sensor::{Completion, SensorSession};
pub use timer::{TimerHandle, TimerWheel};
pub use traits::{
    // Hardware
    Clock,
    CycleCounter,
    HostLink,
    InterruptMask,
    PrecisionMode,
    RawSample,
    SampleStatus,
    ScanSensor,
    StepDirection,
    StepperDrive,
    TriggerStatus,
};
