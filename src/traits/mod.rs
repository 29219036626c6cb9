//! Trait definitions for the hardware abstraction layer.
//!
//! This module defines the abstractions that let the scanner core run on
//! real hardware and on the desktop mock HAL alike:
//!
//! - [`StepperDrive`]: per-axis pulse-train generation capability
//! - [`ScanSensor`]: the vendor ToF distance-sensor driver
//! - [`HostLink`]: outbound byte-stream transport to the host
//! - [`Clock`] / [`CycleCounter`]: monotonic microsecond time sources
//! - [`InterruptMask`]: the global interrupt enable/disable capability
//!
//! All traits follow the same shape: an associated `Error` type supplied
//! by the implementation, and small synchronous methods — nothing in the
//! core blocks or sleeps.

pub mod hardware;

pub use hardware::*;
