//! Fixed-point sample formats used on the wire and in the line buffer.
//!
//! The sensor reports range in signed Q9.22 meters (9 integer bits,
//! 22 fractional bits in an `i32`) and amplitude in unsigned UQ12.4
//! (12 integer bits, 4 fractional bits in a `u16`). Both types are thin
//! wrappers over the raw wire representation so samples can be buffered
//! and transmitted without conversion.
//!
//! # Example
//!
//! ```rust
//! use scanrig::fixed::{AmplitudeUq12_4, RangeQ9_22};
//!
//! let r = RangeQ9_22::from_meters(1.5);
//! assert!((r.to_meters() - 1.5).abs() < 1e-5);
//!
//! let a = AmplitudeUq12_4::from_f32(100.25);
//! assert!((a.to_f32() - 100.25).abs() < 0.1);
//! ```

/// Signed fixed-point range in meters, Q9.22.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeQ9_22(pub i32);

impl RangeQ9_22 {
    /// Number of fractional bits.
    pub const FRAC_BITS: u32 = 22;

    /// Zero range.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw wire value.
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Converts from meters, saturating at the format limits.
    pub fn from_meters(m: f32) -> Self {
        let scaled = m * (1u32 << Self::FRAC_BITS) as f32;
        let clamped = scaled.clamp(i32::MIN as f32, i32::MAX as f32);
        Self(clamped as i32)
    }

    /// Converts to meters.
    pub fn to_meters(self) -> f32 {
        self.0 as f32 / (1u32 << Self::FRAC_BITS) as f32
    }
}

/// Unsigned fixed-point signal amplitude, UQ12.4.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AmplitudeUq12_4(pub u16);

impl AmplitudeUq12_4 {
    /// Number of fractional bits.
    pub const FRAC_BITS: u32 = 4;

    /// Zero amplitude.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw wire value.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Converts from a float, saturating at the format limits.
    pub fn from_f32(v: f32) -> Self {
        let scaled = v * (1u32 << Self::FRAC_BITS) as f32;
        let clamped = scaled.clamp(0.0, u16::MAX as f32);
        Self(clamped as u16)
    }

    /// Converts to a float.
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / (1u32 << Self::FRAC_BITS) as f32
    }
}

/// One rasterized grid cell: range plus signal amplitude.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelSample {
    /// Measured distance, Q9.22 meters.
    pub range: RangeQ9_22,
    /// Return signal amplitude, UQ12.4.
    pub amplitude: AmplitudeUq12_4,
}

impl PixelSample {
    /// Placeholder written when a raw sample fails evaluation.
    ///
    /// Zero range with zero amplitude is not a value the sensor produces
    /// for a real return, so hosts can detect dropped cells.
    pub const INVALID: Self = Self {
        range: RangeQ9_22::ZERO,
        amplitude: AmplitudeUq12_4::ZERO,
    };

    /// Builds a sample from raw wire values.
    pub const fn from_raw(range: i32, amplitude: u16) -> Self {
        Self {
            range: RangeQ9_22::from_raw(range),
            amplitude: AmplitudeUq12_4::from_raw(amplitude),
        }
    }
}
