//! Scan configuration.
//!
//! [`ScanConfig`] gathers everything the host can tune between scans:
//! grid resolution, steps per pixel, the begin offset, measurement
//! timing, precision mode, and the reporting-only angle-per-step
//! calibration. Configuration is applied only while the controller is
//! idle and is not persisted across power cycles.
//!
//! # Example
//!
//! ```rust
//! use scanrig::config::ScanConfig;
//! use scanrig::traits::PrecisionMode;
//!
//! let config = ScanConfig::default()
//!     .with_resolution(16, 16)
//!     .with_steps_per_pixel(4, 4)
//!     .with_measure_delay_us(20_000)
//!     .with_precision(PrecisionMode::High);
//! assert!(config.validate().is_ok());
//! ```

use crate::capture::MAX_LINE_WIDTH;
use crate::error::{Error, Result};
use crate::traits::PrecisionMode;

/// Complete scan configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanConfig {
    /// Image width in pixels (columns).
    pub width: u32,
    /// Image height in pixels (rows).
    pub height: u32,
    /// Motor steps per pixel, X axis.
    pub steps_per_pixel_x: u16,
    /// Motor steps per pixel, Y axis.
    pub steps_per_pixel_y: u16,
    /// Scan origin offset from the motor origin, X axis, in steps.
    pub begin_offset_x: u32,
    /// Scan origin offset from the motor origin, Y axis, in steps.
    pub begin_offset_y: u32,
    /// Sensor frame delay per measurement, in microseconds.
    pub measure_delay_us: u32,
    /// Sensor precision mode.
    pub precision: PrecisionMode,
    /// Mechanical calibration, degrees per step, X axis. Reported to the
    /// host; not used by the core math.
    pub angle_per_step_x: f32,
    /// Mechanical calibration, degrees per step, Y axis.
    pub angle_per_step_y: f32,
    /// Motor pulse rate in steps per second, both axes.
    pub motor_clock_hz: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            steps_per_pixel_x: 16,
            steps_per_pixel_y: 16,
            begin_offset_x: 0,
            begin_offset_y: 0,
            measure_delay_us: 10_000,
            precision: PrecisionMode::Standard,
            // 1.8 degree full steps at 16 microsteps.
            angle_per_step_x: 0.1125,
            angle_per_step_y: 0.1125,
            motor_clock_hz: 1_000,
        }
    }
}

impl ScanConfig {
    /// Set the image resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the steps per pixel for both axes.
    pub fn with_steps_per_pixel(mut self, x: u16, y: u16) -> Self {
        self.steps_per_pixel_x = x;
        self.steps_per_pixel_y = y;
        self
    }

    /// Set the scan origin offset in steps.
    pub fn with_begin_offset(mut self, x: u32, y: u32) -> Self {
        self.begin_offset_x = x;
        self.begin_offset_y = y;
        self
    }

    /// Set the sensor frame delay in microseconds.
    pub fn with_measure_delay_us(mut self, us: u32) -> Self {
        self.measure_delay_us = us;
        self
    }

    /// Set the sensor precision mode.
    pub fn with_precision(mut self, mode: PrecisionMode) -> Self {
        self.precision = mode;
        self
    }

    /// Set the angle-per-step calibration in degrees.
    pub fn with_angle_per_step(mut self, x: f32, y: f32) -> Self {
        self.angle_per_step_x = x;
        self.angle_per_step_y = y;
        self
    }

    /// Set the motor pulse rate in steps per second.
    pub fn with_motor_clock_hz(mut self, hz: u32) -> Self {
        self.motor_clock_hz = hz;
        self
    }

    /// Checks the configuration against the core's fixed limits.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Unsupported);
        }
        if self.width as usize > MAX_LINE_WIDTH {
            return Err(Error::Unsupported);
        }
        if self.steps_per_pixel_x == 0 || self.steps_per_pixel_y == 0 {
            return Err(Error::Unsupported);
        }
        if self.measure_delay_us == 0 || self.motor_clock_hz == 0 {
            return Err(Error::Unsupported);
        }
        Ok(())
    }
}

/// Runtime-configurable parameter, addressed by name over the string
/// protocol and by id over the binary protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ConfigKey {
    /// `resolution <w> <h>`
    Resolution,
    /// `steps-per-pixel <x> <y>`
    StepsPerPixel,
    /// `begin-offset <x> <y>`
    BeginOffset,
    /// `measure-delay <us>`
    MeasureDelay,
    /// `precision <0|1>`
    Precision,
    /// `motor-clock <hz>`
    MotorClock,
}

impl ConfigKey {
    /// Parses the string-protocol key name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "resolution" => Some(Self::Resolution),
            "steps-per-pixel" => Some(Self::StepsPerPixel),
            "begin-offset" => Some(Self::BeginOffset),
            "measure-delay" => Some(Self::MeasureDelay),
            "precision" => Some(Self::Precision),
            "motor-clock" => Some(Self::MotorClock),
            _ => None,
        }
    }

    /// Binary-protocol key id.
    pub const fn id(self) -> u16 {
        match self {
            Self::Resolution => 1,
            Self::StepsPerPixel => 2,
            Self::BeginOffset => 3,
            Self::MeasureDelay => 4,
            Self::Precision => 5,
            Self::MotorClock => 6,
        }
    }

    /// Parses the binary-protocol key id.
    pub const fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::Resolution),
            2 => Some(Self::StepsPerPixel),
            3 => Some(Self::BeginOffset),
            4 => Some(Self::MeasureDelay),
            5 => Some(Self::Precision),
            6 => Some(Self::MotorClock),
            _ => None,
        }
    }

    /// Number of values the key expects.
    pub const fn arity(self) -> usize {
        match self {
            Self::Resolution | Self::StepsPerPixel | Self::BeginOffset => 2,
            Self::MeasureDelay | Self::Precision | Self::MotorClock => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ScanConfig::default().validate().is_ok());
    }

    #[test]
    fn builders_chain() {
        let c = ScanConfig::default()
            .with_resolution(8, 4)
            .with_steps_per_pixel(2, 3)
            .with_begin_offset(10, 20)
            .with_measure_delay_us(5_000)
            .with_precision(PrecisionMode::High)
            .with_motor_clock_hz(4_000);
        assert_eq!(c.width, 8);
        assert_eq!(c.height, 4);
        assert_eq!(c.steps_per_pixel_y, 3);
        assert_eq!(c.begin_offset_x, 10);
        assert_eq!(c.measure_delay_us, 5_000);
        assert_eq!(c.precision, PrecisionMode::High);
        assert_eq!(c.motor_clock_hz, 4_000);
    }

    #[test]
    fn zero_resolution_rejected() {
        let c = ScanConfig::default().with_resolution(0, 4);
        assert_eq!(c.validate(), Err(Error::Unsupported));
    }

    #[test]
    fn width_beyond_line_buffer_rejected() {
        let c = ScanConfig::default().with_resolution(MAX_LINE_WIDTH as u32 + 1, 4);
        assert_eq!(c.validate(), Err(Error::Unsupported));
        let c = ScanConfig::default().with_resolution(MAX_LINE_WIDTH as u32, 4);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_steps_per_pixel_rejected() {
        let c = ScanConfig::default().with_steps_per_pixel(0, 1);
        assert_eq!(c.validate(), Err(Error::Unsupported));
    }

    #[test]
    fn config_key_round_trips_by_id() {
        for key in [
            ConfigKey::Resolution,
            ConfigKey::StepsPerPixel,
            ConfigKey::BeginOffset,
            ConfigKey::MeasureDelay,
            ConfigKey::Precision,
            ConfigKey::MotorClock,
        ] {
            assert_eq!(ConfigKey::from_id(key.id()), Some(key));
        }
        assert_eq!(ConfigKey::from_id(0xFFFF), None);
    }

    #[test]
    fn config_key_from_name() {
        assert_eq!(
            ConfigKey::from_name("steps-per-pixel"),
            Some(ConfigKey::StepsPerPixel)
        );
        assert_eq!(ConfigKey::from_name("bogus"), None);
    }
}
