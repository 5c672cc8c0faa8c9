//! Notification frame parsing.
//!
//! Parses the 15-byte frames pushed on the measurement characteristic.

use chrono::NaiveDate;
use tracing::trace;

use crate::data::Measurement;
use crate::error::DecodeError;
use crate::protocol::commands::DEVICE_EPOCH_YEAR;
use crate::utils::hex_frame;

/// Exact size of a notification frame.
pub const NOTIFICATION_FRAME_SIZE: usize = 15;

/// Offset of the six timestamp bytes.
const TIMESTAMP_OFFSET: usize = 8;

/// Kind of reading carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Reading taken just now (1).
    Live = 1,
    /// Reading replayed from device memory (17).
    Historical = 17,
}

impl MessageType {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Result<Self, DecodeError> {
        match value {
            1 => Ok(Self::Live),
            17 => Ok(Self::Historical),
            other => Err(DecodeError::UnknownMessageType(other)),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }
}

/// Decode a notification frame into a [`Measurement`].
///
/// Frame layout:
/// - Byte 1: Message type (1 = live, 17 = historical)
/// - Bytes 4-5: Temperature x100 (uint16_t little-endian)
/// - Byte 8: Year - 1970
/// - Bytes 9-13: Month, day, hour, minute, second
/// - Bytes 0, 2-3, 6-7, 14: Not interpreted
///
/// Timestamp fields outside their calendar range (including dates that do
/// not exist, such as February 30) are rejected with
/// [`DecodeError::InvalidField`]. Values are never clamped.
pub fn decode_notification(data: &[u8]) -> Result<Measurement, DecodeError> {
    if data.len() != NOTIFICATION_FRAME_SIZE {
        return Err(DecodeError::InvalidLength {
            expected: NOTIFICATION_FRAME_SIZE,
            actual: data.len(),
        });
    }

    trace!("Decoding notification: {}", hex_frame(data));

    let message_type = MessageType::from_raw(data[1])?;
    let temperature_centi_units = u16::from_le_bytes([data[4], data[5]]);

    let ts = &data[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 6];
    let year = DEVICE_EPOCH_YEAR + i32::from(ts[0]);
    let month = check_range("month", ts[1], 1, 12)?;
    let day = check_range("day", ts[2], 1, 31)?;
    let hour = check_range("hour", ts[3], 0, 23)?;
    let minute = check_range("minute", ts[4], 0, 59)?;
    let second = check_range("second", ts[5], 0, 59)?;

    // Time fields are range checked above; only a nonexistent date fails here
    let timestamp = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or(DecodeError::InvalidField {
            field: "day",
            value: u16::from(ts[2]),
        })?;

    Ok(Measurement::new(
        temperature_centi_units,
        timestamp,
        message_type == MessageType::Live,
    ))
}

fn check_range(field: &'static str, value: u8, min: u8, max: u8) -> Result<u32, DecodeError> {
    if (min..=max).contains(&value) {
        Ok(u32::from(value))
    } else {
        Err(DecodeError::InvalidField {
            field,
            value: u16::from(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDateTime, Timelike};
    use pretty_assertions::assert_eq;

    fn frame(message_type: u8, temp: u16, timestamp: [u8; 6]) -> Vec<u8> {
        let mut data = vec![0u8; NOTIFICATION_FRAME_SIZE];
        data[1] = message_type;
        data[4..6].copy_from_slice(&temp.to_le_bytes());
        data[8..14].copy_from_slice(&timestamp);
        data
    }

    fn datetime(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, s))
            .unwrap()
    }

    #[test]
    fn test_decode_live_reading() {
        let data = [
            0,
            1,
            0,
            0,
            (3680 % 256) as u8,
            (3680 / 256) as u8,
            0,
            0,
            56,
            2,
            8,
            14,
            30,
            45,
            0,
        ];
        let m = decode_notification(&data).unwrap();

        assert_eq!(m.temperature_centi_units(), 3680);
        assert!((m.temperature() - 36.80).abs() < 1e-9);
        assert_eq!(m.timestamp(), datetime(2026, 2, 8, 14, 30, 45));
        assert!(m.is_live());
    }

    #[test]
    fn test_decode_historical_reading() {
        let m = decode_notification(&frame(17, 3652, [54, 6, 1, 6, 5, 0])).unwrap();
        assert!(m.is_historical());
        assert_eq!(m.timestamp(), datetime(2024, 6, 1, 6, 5, 0));
    }

    #[test]
    fn test_decode_ignores_unused_bytes() {
        let mut data = frame(1, 3600, [56, 2, 8, 14, 30, 45]);
        data[0] = 0xAA;
        data[2] = 0x55;
        data[7] = 0x12;
        data[14] = 0xFF;
        let m = decode_notification(&data).unwrap();
        assert_eq!(m.temperature_centi_units(), 3600);
        assert_eq!(m.timestamp(), datetime(2026, 2, 8, 14, 30, 45));
    }

    #[test]
    fn test_decode_invalid_length() {
        for len in [0usize, 3, 14, 16, 20] {
            let data = vec![1u8; len];
            assert_eq!(
                decode_notification(&data),
                Err(DecodeError::InvalidLength {
                    expected: 15,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn test_decode_unknown_message_type() {
        for message_type in [0u8, 2, 16, 18, 255] {
            let data = frame(message_type, 3600, [56, 2, 8, 14, 30, 45]);
            assert_eq!(
                decode_notification(&data),
                Err(DecodeError::UnknownMessageType(message_type))
            );
        }
    }

    #[test]
    fn test_decode_rejects_calendar_invalid_fields() {
        let cases: [([u8; 6], &str, u16); 6] = [
            ([56, 13, 8, 14, 30, 45], "month", 13),
            ([56, 0, 8, 14, 30, 45], "month", 0),
            ([56, 2, 0, 14, 30, 45], "day", 0),
            ([56, 2, 8, 24, 30, 45], "hour", 24),
            ([56, 2, 8, 14, 60, 45], "minute", 60),
            ([56, 2, 8, 14, 30, 60], "second", 60),
        ];

        for (timestamp, field, value) in cases {
            assert_eq!(
                decode_notification(&frame(1, 3600, timestamp)),
                Err(DecodeError::InvalidField { field, value })
            );
        }
    }

    #[test]
    fn test_decode_rejects_nonexistent_date() {
        assert_eq!(
            decode_notification(&frame(1, 3600, [56, 2, 30, 8, 0, 0])),
            Err(DecodeError::InvalidField {
                field: "day",
                value: 30
            })
        );
    }

    #[test]
    fn test_decode_calendar_boundaries() {
        let cases = [
            ([0, 1, 1, 0, 0, 0], datetime(1970, 1, 1, 0, 0, 0)),
            ([255, 12, 31, 23, 59, 59], datetime(2225, 12, 31, 23, 59, 59)),
            ([54, 2, 29, 12, 0, 0], datetime(2024, 2, 29, 12, 0, 0)),
        ];
        for (stamp, expected) in cases {
            let m = decode_notification(&frame(1, 3600, stamp)).unwrap();
            assert_eq!(m.timestamp(), expected);
        }

        assert_eq!(
            decode_notification(&frame(1, 3600, [56, 2, 29, 23, 59, 59])),
            Err(DecodeError::InvalidField {
                field: "day",
                value: 29
            })
        );
    }

    #[test]
    fn test_message_type_roundtrip() {
        assert_eq!(MessageType::from_raw(1), Ok(MessageType::Live));
        assert_eq!(MessageType::Historical.to_raw(), 17);
    }

    mod proptests {
        use super::*;
        use crate::protocol::commands::encode_time_sync;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..32)) {
                let _ = decode_notification(&data);
            }

            #[test]
            fn decode_wrong_length_is_invalid_length(
                data in proptest::collection::vec(any::<u8>(), 0..32)
                    .prop_filter("not a notification length", |d| d.len() != 15)
            ) {
                let is_invalid_length = matches!(
                    decode_notification(&data),
                    Err(DecodeError::InvalidLength { .. })
                );
                prop_assert!(is_invalid_length);
            }

            #[test]
            fn decode_preserves_temperature(value in any::<u16>()) {
                let m = decode_notification(&frame(1, value, [56, 2, 8, 14, 30, 45])).unwrap();
                prop_assert_eq!(m.temperature_centi_units(), value);
            }

            #[test]
            fn time_sync_fields_decode_to_same_timestamp(
                year in 1970i32..=2225,
                month in 1u32..=12,
                day in 1u32..=28,
                hour in 0u32..24,
                minute in 0u32..60,
                second in 0u32..60,
            ) {
                let t = datetime(year, month, day, hour, minute, second);
                let command = encode_time_sync(&t).unwrap();
                let mut timestamp = [0u8; 6];
                timestamp.copy_from_slice(&command[3..9]);

                let decoded = decode_notification(&frame(17, 0, timestamp)).unwrap().timestamp();
                prop_assert_eq!(decoded, t);
                prop_assert_eq!(decoded.year(), year);
                prop_assert_eq!(decoded.second(), second);
            }
        }
    }
}
