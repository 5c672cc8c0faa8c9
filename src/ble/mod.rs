//! BLE communication module.
//!
//! This module provides the Bluetooth Low Energy plumbing beneath the
//! session: the transport traits, their btleplug implementation, and the
//! retry policy applied to link establishment.

pub mod characteristics;
pub mod connection;
pub mod retry;
pub mod transport;
pub mod uuids;

pub use characteristics::CharacteristicHandler;
pub use connection::{BtleplugConnection, BtleplugTransport, ConnectionState};
pub use retry::{with_retry, RetryPolicy};
pub use transport::{Connection, NotificationStream, Transport};
pub use uuids::*;
