//! Hardware abstraction layer implementations.
//!
//! This module contains concrete implementations of the traits defined
//! in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `mock`: test implementations for desktop development
//!
//! Real firmware supplies its own implementations over the platform
//! peripherals and constructs a [`ScanDevice`](crate::ScanDevice) from
//! them; the core never touches registers directly.

pub mod mock;

pub use mock::*;
