//! BLE connection management.
//!
//! Connection state shared with the session, and the btleplug-backed
//! [`Transport`] used against real hardware.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{self, StreamExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ble::characteristics::CharacteristicHandler;
use crate::ble::transport::{Connection, NotificationStream, Transport};
use crate::ble::uuids::{COMMAND_CHARACTERISTIC_UUID, NOTIFY_CHARACTERISTIC_UUID};
use crate::error::{Error, Result};

/// Connection state for a thermometer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Not connected to the device.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected and subscribed.
    Connected,
    /// Currently disconnecting.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Transport over the host's Bluetooth adapter.
///
/// Devices are looked up among the peripherals the adapter already knows;
/// discovering them is left to the application.
pub struct BtleplugTransport {
    adapter: Adapter,
}

impl BtleplugTransport {
    /// Use the first Bluetooth adapter on the system.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapter = manager
            .adapters()
            .await
            .map_err(Error::Bluetooth)?
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self { adapter })
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// The adapter in use.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;

        // macOS hides MAC addresses, so also accept the platform identifier
        let wanted = address.to_lowercase();
        peripherals
            .into_iter()
            .find(|p| {
                p.address().to_string().to_lowercase() == wanted
                    || format!("{:?}", p.id()).to_lowercase().contains(&wanted)
            })
            .ok_or_else(|| Error::DeviceNotFound {
                address: address.to_string(),
            })
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn open_connection(&self, address: &str) -> Result<Box<dyn Connection>> {
        let peripheral = self.find_peripheral(address).await?;

        let connected = match peripheral.is_connected().await {
            Ok(connected) => connected,
            Err(e) => {
                debug!("Could not query link state of {}: {}", address, e);
                false
            }
        };
        if !connected {
            peripheral.connect().await.map_err(Error::Bluetooth)?;
        }
        peripheral
            .discover_services()
            .await
            .map_err(Error::Bluetooth)?;

        let handler = CharacteristicHandler::new(peripheral.clone());
        handler.discover_characteristics();

        for uuid in [COMMAND_CHARACTERISTIC_UUID, NOTIFY_CHARACTERISTIC_UUID] {
            if !handler.has_characteristic(&uuid) {
                if let Err(e) = peripheral.disconnect().await {
                    debug!("Disconnecting unsupported device {} failed: {}", address, e);
                }
                return Err(Error::CharacteristicNotFound {
                    uuid: uuid.to_string(),
                });
            }
        }

        info!("Opened link to {}", address);

        Ok(Box::new(BtleplugConnection {
            adapter: self.adapter.clone(),
            peripheral,
            handler,
        }))
    }
}

/// An open btleplug link to one thermometer.
pub struct BtleplugConnection {
    adapter: Adapter,
    peripheral: Peripheral,
    handler: CharacteristicHandler,
}

enum LinkItem {
    Payload(Vec<u8>),
    Gone,
}

#[async_trait]
impl Connection for BtleplugConnection {
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        self.handler.subscribe(&characteristic).await?;

        let payloads = self
            .handler
            .notification_stream(characteristic)
            .await?
            .map(LinkItem::Payload);

        let id = self.peripheral.id();
        let events = self.adapter.events().await.map_err(Error::Bluetooth)?;
        let gone = events.filter_map(move |event| {
            let id = id.clone();
            async move {
                match event {
                    CentralEvent::DeviceDisconnected(peripheral_id) if peripheral_id == id => {
                        debug!("Adapter reported {:?} disconnected", peripheral_id);
                        Some(LinkItem::Gone)
                    }
                    _ => None,
                }
            }
        });

        let stream = stream::select(payloads, gone)
            .take_while(|item| futures::future::ready(matches!(item, LinkItem::Payload(_))))
            .filter_map(|item| async move {
                match item {
                    LinkItem::Payload(data) => Some(data),
                    LinkItem::Gone => None,
                }
            });

        Ok(Box::pin(stream))
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        self.handler.unsubscribe(&characteristic).await
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.handler.write(&characteristic, data).await
    }

    async fn close(&self) -> Result<()> {
        self.peripheral.disconnect().await.map_err(Error::Bluetooth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());

        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Disconnecting.is_transitioning());
        assert!(!ConnectionState::Connected.is_transitioning());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Connected), "Connected");
        assert_eq!(format!("{}", ConnectionState::Disconnected), "Disconnected");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
