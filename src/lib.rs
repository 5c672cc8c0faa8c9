// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # easyhome-ble
//!
//! A cross-platform Rust library for talking to Easy@Home EBT-300 basal
//! thermometers over Bluetooth Low Energy.
//!
//! The thermometer pushes a 15-byte notification for every reading, either
//! a live measurement or one replayed from its memory. The host can set the
//! device clock and choose whether readings are taken in Celsius or
//! Fahrenheit.
//!
//! ## Features
//!
//! - **Frame codec**: build time sync and unit sync commands, decode measurement notifications
//! - **Sessions**: connect with bounded retry, deliver measurements in order, disconnect cleanly
//! - **Link loss**: a dropped link is reported on the next command, with optional reconnect
//! - **Testable transport**: swap btleplug for the in-memory [`mock::MockTransport`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use easyhome_ble::{BtleplugTransport, Result, SessionConfig, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = BtleplugTransport::new().await?;
//!     let session = SessionManager::with_callback(
//!         "AA:BB:CC:DD:EE:FF",
//!         transport,
//!         SessionConfig::default(),
//!         |m| println!("{:.2} at {}", m.temperature(), m.timestamp()),
//!     );
//!
//!     session.connect().await?;
//!     session.set_unit(true).await?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Units
//!
//! Measurements carry no unit. The value is in whatever unit was last set
//! with [`SessionManager::set_unit`], so keep track of it and use
//! [`Measurement::temperature_in`] to convert.
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps. Peripherals are identified by a
//! platform UUID rather than a MAC address.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod data;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod session;
pub mod utils;

// Re-exports for convenience
pub use error::{CommandError, ConnectError, DecodeError, DisconnectError, EncodeError};
pub use error::{Error, Result};
pub use session::{MeasurementCallback, SessionConfig, SessionEvent, SessionManager};
pub use utils::{celsius_to_fahrenheit, fahrenheit_to_celsius};

// Re-export commonly used types from submodules
pub use ble::connection::{BtleplugTransport, ConnectionState};
pub use ble::retry::RetryPolicy;
pub use ble::transport::{Connection, NotificationStream, Transport};
pub use data::{Measurement, TemperatureUnit};
pub use protocol::{decode_notification, encode_time_sync, encode_unit_sync};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<SessionManager<mock::MockTransport>>();
        let _ = std::any::TypeId::of::<SessionConfig>();
        let _ = std::any::TypeId::of::<Measurement>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<ConnectError>();
        let _ = std::any::TypeId::of::<BtleplugTransport>();
    }

    #[test]
    fn test_temperature_conversion() {
        assert!((celsius_to_fahrenheit(100.0) - 212.0).abs() < 0.001);
        assert!((fahrenheit_to_celsius(212.0) - 100.0).abs() < 0.001);
    }
}
