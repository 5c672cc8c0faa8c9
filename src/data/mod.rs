//! Data structures for thermometer data.
//!
//! This module contains the decoded measurement value type and the
//! temperature unit the caller configures on the device.

pub mod measurement;
pub mod unit;

pub use measurement::Measurement;
pub use unit::TemperatureUnit;
