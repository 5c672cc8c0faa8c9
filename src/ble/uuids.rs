//! BLE Service and Characteristic UUIDs.
//!
//! The EBT-300 exposes a single vendor service with one write and one
//! notify characteristic, all on the Bluetooth base UUID.

use uuid::Uuid;

/// Thermometer service UUID.
pub const THERMOMETER_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_ffe0_0000_1000_8000_00805f9b34fb);
/// Command characteristic UUID (write to device).
pub const COMMAND_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_ffe1_0000_1000_8000_00805f9b34fb);
/// Measurement characteristic UUID (notifications from device).
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_ffe2_0000_1000_8000_00805f9b34fb);

/// Check if a service UUID is the thermometer service.
pub fn is_thermometer_service(uuid: &Uuid) -> bool {
    *uuid == THERMOMETER_SERVICE_UUID
}
