//! Error types for the easyhome-ble crate.
//!
//! [`Error`] covers the Bluetooth transport layer. The frame codec and the
//! session each report through their own narrow error type so that callers
//! can match on exactly the failures an operation can produce.

use thiserror::Error;

use crate::ble::connection::ConnectionState;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// No peripheral with the given address is known to the adapter.
    #[error("Device not found: {address}")]
    DeviceNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// Operation requires a connection but the device is not connected.
    #[error("Device not connected")]
    NotConnected,

    /// The transport failed to establish a link.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// The operation is not allowed in the current connection state.
    #[error("Operation not allowed while {state}")]
    InvalidState {
        /// The state the session was in.
        state: ConnectionState,
    },

    /// A command frame could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// A notification frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A session could not be connected.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// A command could not be delivered.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Teardown did not complete cleanly.
    #[error(transparent)]
    Disconnect(#[from] DisconnectError),
}

impl Error {
    /// Whether retrying the failed transport operation could succeed.
    ///
    /// A missing characteristic means the peripheral is not the expected
    /// model, so repeating the attempt is pointless.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Bluetooth(_) | Self::DeviceNotFound { .. } | Self::ConnectionFailed { .. }
        )
    }
}

/// Failure to build an outbound command frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A field does not fit its single-byte slot on the wire.
    #[error("{field} = {value} does not fit the command frame")]
    FieldOutOfRange {
        /// The name of the field.
        field: &'static str,
        /// The rejected value.
        value: i64,
    },
}

/// Failure to interpret an inbound notification frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame is not exactly the notification length.
    #[error("Invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// The required length.
        expected: usize,
        /// The received length.
        actual: usize,
    },

    /// The message type byte is neither a live nor a historical reading.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    /// A timestamp field lies outside its calendar range.
    #[error("Invalid {field}: {value}")]
    InvalidField {
        /// The name of the field.
        field: &'static str,
        /// The raw byte value.
        value: u16,
    },
}

/// Failure to bring a session up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Every attempt allowed by the retry policy failed.
    #[error("Device unreachable after {attempts} attempt(s): {reason}")]
    Unreachable {
        /// Number of attempts made.
        attempts: u32,
        /// The last transport failure.
        reason: String,
    },

    /// The caller's time bound elapsed before the session came up.
    #[error("Connect cancelled")]
    Cancelled,
}

/// Failure to deliver a command to the device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The session is not connected.
    #[error("Device not connected")]
    NotConnected,

    /// The link dropped since the last command; reported once.
    #[error("Connection lost")]
    ConnectionLost,

    /// The transport rejected the write.
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// Description of the transport failure.
        reason: String,
    },

    /// The command could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Teardown reported an error. The session is Disconnected regardless.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisconnectError {
    /// Unsubscribing or closing the link failed.
    #[error("Teardown failed: {reason}")]
    TeardownFailed {
        /// Description of the first teardown failure.
        reason: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
