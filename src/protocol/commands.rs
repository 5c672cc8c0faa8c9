//! Outbound command frames.
//!
//! Every command is a fixed 9-byte frame written to the command
//! characteristic:
//! - Header(1) = 0x5A + CommandType(1) + PayloadLen(1) = 6 + Payload(6)
//!
//! Time sync payload: year-1970, month, day, hour, minute, second.
//! Unit sync payload: unit code (1 = Celsius, 2 = Fahrenheit) followed by
//! the fixed padding `FF FF FF FF FA`.

use chrono::{Datelike, Timelike};

use crate::data::TemperatureUnit;
use crate::error::EncodeError;

/// First byte of every command frame.
pub const COMMAND_HEADER: u8 = 0x5A;

/// Payload length byte carried by every command frame.
pub const COMMAND_PAYLOAD_LEN: u8 = 6;

/// Total size of a command frame.
pub const COMMAND_FRAME_SIZE: usize = 9;

/// Year the device counts from.
pub const DEVICE_EPOCH_YEAR: i32 = 1970;

/// Trailing bytes of the unit-sync frame.
const UNIT_SYNC_PADDING: [u8; 5] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFA];

/// Command types understood by the thermometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    /// Set the device clock (0x03).
    TimeSync = 0x03,
    /// Select the reporting unit (0x06).
    UnitSync = 0x06,
}

impl CommandType {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0x03 => Some(Self::TimeSync),
            0x06 => Some(Self::UnitSync),
            _ => None,
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }
}

/// Time synchronization command.
///
/// Holds the wall-clock fields exactly as they go on the wire. The device
/// has no notion of timezone, so callers pass local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSyncCommand {
    /// Years since 1970.
    pub year_offset: u8,
    /// Month (1-12).
    pub month: u8,
    /// Day of month (1-31).
    pub day: u8,
    /// Hour (0-23).
    pub hour: u8,
    /// Minute (0-59).
    pub minute: u8,
    /// Second (0-59).
    pub second: u8,
}

impl TimeSyncCommand {
    /// Build from any chrono date-time value.
    ///
    /// Fails if the year is outside 1970..=2225, which is all a single
    /// offset byte can express.
    pub fn from_datetime<T>(timestamp: &T) -> Result<Self, EncodeError>
    where
        T: Datelike + Timelike,
    {
        let year = timestamp.year();
        let year_offset = u8::try_from(year - DEVICE_EPOCH_YEAR).map_err(|_| {
            EncodeError::FieldOutOfRange {
                field: "year",
                value: i64::from(year),
            }
        })?;

        // chrono keeps every calendar field below 60, so these casts are lossless
        Ok(Self {
            year_offset,
            month: timestamp.month() as u8,
            day: timestamp.day() as u8,
            hour: timestamp.hour() as u8,
            minute: timestamp.minute() as u8,
            second: timestamp.second() as u8,
        })
    }

    /// Full calendar year.
    pub fn year(&self) -> i32 {
        DEVICE_EPOCH_YEAR + i32::from(self.year_offset)
    }

    /// The six payload bytes in wire order.
    pub fn fields(&self) -> [u8; 6] {
        [
            self.year_offset,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        ]
    }

    /// Serialize to a command frame.
    pub fn to_bytes(&self) -> [u8; COMMAND_FRAME_SIZE] {
        frame(CommandType::TimeSync, self.fields())
    }
}

/// Unit selection command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitSyncCommand {
    /// True selects Celsius, false selects Fahrenheit.
    pub celsius: bool,
}

impl UnitSyncCommand {
    /// Create a unit selection command.
    pub fn new(celsius: bool) -> Self {
        Self { celsius }
    }

    /// The unit this command selects.
    pub fn unit(&self) -> TemperatureUnit {
        TemperatureUnit::from_celsius(self.celsius)
    }

    /// Serialize to a command frame.
    pub fn to_bytes(&self) -> [u8; COMMAND_FRAME_SIZE] {
        let mut payload = [0u8; 6];
        payload[0] = self.unit().device_code();
        payload[1..].copy_from_slice(&UNIT_SYNC_PADDING);
        frame(CommandType::UnitSync, payload)
    }
}

impl From<TemperatureUnit> for UnitSyncCommand {
    fn from(unit: TemperatureUnit) -> Self {
        Self::new(unit.is_celsius())
    }
}

/// Any command the thermometer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Set the device clock.
    TimeSync(TimeSyncCommand),
    /// Select the reporting unit.
    UnitSync(UnitSyncCommand),
}

impl Command {
    /// The command type byte.
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::TimeSync(_) => CommandType::TimeSync,
            Self::UnitSync(_) => CommandType::UnitSync,
        }
    }

    /// Serialize to a command frame.
    pub fn to_bytes(&self) -> [u8; COMMAND_FRAME_SIZE] {
        match self {
            Self::TimeSync(cmd) => cmd.to_bytes(),
            Self::UnitSync(cmd) => cmd.to_bytes(),
        }
    }
}

fn frame(command_type: CommandType, payload: [u8; 6]) -> [u8; COMMAND_FRAME_SIZE] {
    let mut bytes = [0u8; COMMAND_FRAME_SIZE];
    bytes[0] = COMMAND_HEADER;
    bytes[1] = command_type.to_raw();
    bytes[2] = COMMAND_PAYLOAD_LEN;
    bytes[3..].copy_from_slice(&payload);
    bytes
}

/// Encode a time synchronization frame.
pub fn encode_time_sync<T>(timestamp: &T) -> Result<[u8; COMMAND_FRAME_SIZE], EncodeError>
where
    T: Datelike + Timelike,
{
    TimeSyncCommand::from_datetime(timestamp).map(|cmd| cmd.to_bytes())
}

/// Encode a unit selection frame.
pub fn encode_unit_sync(celsius: bool) -> [u8; COMMAND_FRAME_SIZE] {
    UnitSyncCommand::new(celsius).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;

    fn datetime(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, s))
            .unwrap()
    }

    #[test]
    fn test_encode_time_sync() {
        let frame = encode_time_sync(&datetime(2024, 6, 1, 9, 15, 30)).unwrap();
        assert_eq!(frame, [90, 3, 6, 54, 6, 1, 9, 15, 30]);
    }

    #[test]
    fn test_encode_time_sync_2026() {
        let frame = encode_time_sync(&datetime(2026, 2, 8, 14, 30, 25)).unwrap();
        assert_eq!(frame, [90, 3, 6, 56, 2, 8, 14, 30, 25]);
    }

    #[test]
    fn test_encode_time_sync_epoch_bounds() {
        let first = encode_time_sync(&datetime(1970, 1, 1, 0, 0, 0)).unwrap();
        assert_eq!(first[3], 0);

        let last = encode_time_sync(&datetime(2225, 12, 31, 23, 59, 59)).unwrap();
        assert_eq!(last[3], 255);
    }

    #[test]
    fn test_encode_time_sync_out_of_range() {
        assert_eq!(
            encode_time_sync(&datetime(2226, 1, 1, 0, 0, 0)),
            Err(EncodeError::FieldOutOfRange {
                field: "year",
                value: 2226
            })
        );
        assert_eq!(
            encode_time_sync(&datetime(1969, 12, 31, 23, 59, 59)),
            Err(EncodeError::FieldOutOfRange {
                field: "year",
                value: 1969
            })
        );
    }

    #[test]
    fn test_encode_unit_sync() {
        assert_eq!(encode_unit_sync(true), [90, 6, 6, 1, 255, 255, 255, 255, 250]);
        assert_eq!(encode_unit_sync(false), [90, 6, 6, 2, 255, 255, 255, 255, 250]);
    }

    #[test]
    fn test_unit_sync_from_unit() {
        let cmd = UnitSyncCommand::from(TemperatureUnit::Fahrenheit);
        assert!(!cmd.celsius);
        assert_eq!(cmd.unit(), TemperatureUnit::Fahrenheit);
    }

    #[test]
    fn test_command_enum() {
        let cmd = Command::UnitSync(UnitSyncCommand::new(true));
        assert_eq!(cmd.command_type(), CommandType::UnitSync);
        assert_eq!(cmd.to_bytes(), encode_unit_sync(true));

        let time = TimeSyncCommand::from_datetime(&datetime(2024, 6, 1, 9, 15, 30)).unwrap();
        assert_eq!(time.year(), 2024);
        assert_eq!(Command::TimeSync(time).command_type().to_raw(), 0x03);
    }

    #[test]
    fn test_command_type_from_raw() {
        assert_eq!(CommandType::from_raw(0x03), Some(CommandType::TimeSync));
        assert_eq!(CommandType::from_raw(0x06), Some(CommandType::UnitSync));
        assert_eq!(CommandType::from_raw(0x01), None);
    }
}
