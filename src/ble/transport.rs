//! Transport abstractions.
//!
//! The session talks to the Bluetooth stack only through these traits, so
//! the same session logic drives a real btleplug peripheral or the
//! in-memory [`MockTransport`](crate::mock::MockTransport).

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::error::Result;

/// Raw notification payloads from one characteristic, in arrival order.
///
/// The stream ends when the link to the device goes away.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Opens links to devices by address.
///
/// Implementations make a single attempt per call; retrying is driven by
/// the caller's [`RetryPolicy`](crate::ble::retry::RetryPolicy).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a link to the device with the given address.
    async fn open_connection(&self, address: &str) -> Result<Box<dyn Connection>>;
}

/// An open link to one device.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Enable notifications on a characteristic and return its payloads.
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream>;

    /// Disable notifications on a characteristic.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Write a frame to a characteristic (with response).
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Close the link.
    async fn close(&self) -> Result<()>;
}
