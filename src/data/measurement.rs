//! Decoded temperature measurement.

use chrono::NaiveDateTime;

use super::unit::TemperatureUnit;

/// A single temperature reading decoded from a notification frame.
///
/// The value is kept exactly as the device sent it, in hundredths of the
/// unit last configured on the device. The timestamp is the device's own
/// wall clock and carries no timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurement {
    temperature_centi_units: u16,
    timestamp: NaiveDateTime,
    is_live: bool,
}

impl Measurement {
    /// Create a measurement from its decoded fields.
    pub fn new(temperature_centi_units: u16, timestamp: NaiveDateTime, is_live: bool) -> Self {
        Self {
            temperature_centi_units,
            timestamp,
            is_live,
        }
    }

    /// Raw temperature in hundredths of the configured unit.
    pub fn temperature_centi_units(&self) -> u16 {
        self.temperature_centi_units
    }

    /// Temperature in the configured unit.
    pub fn temperature(&self) -> f64 {
        f64::from(self.temperature_centi_units) / 100.0
    }

    /// Temperature converted to `wanted`, given the unit the device was
    /// configured with when it took the reading.
    pub fn temperature_in(&self, configured: TemperatureUnit, wanted: TemperatureUnit) -> f64 {
        configured.convert(self.temperature(), wanted)
    }

    /// Time the device recorded the reading.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// True for a real-time reading, false for one replayed from memory.
    pub fn is_live(&self) -> bool {
        self.is_live
    }

    /// True for a reading replayed from device memory.
    pub fn is_historical(&self) -> bool {
        !self.is_live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 8)
            .and_then(|d| d.and_hms_opt(14, 30, 45))
            .unwrap()
    }

    #[test]
    fn test_measurement_accessors() {
        let m = Measurement::new(3680, sample_time(), true);
        assert_eq!(m.temperature_centi_units(), 3680);
        assert!((m.temperature() - 36.80).abs() < 1e-9);
        assert_eq!(m.timestamp(), sample_time());
        assert!(m.is_live());
        assert!(!m.is_historical());
    }

    #[test]
    fn test_temperature_in_unit() {
        let m = Measurement::new(3700, sample_time(), false);
        let f = m.temperature_in(TemperatureUnit::Celsius, TemperatureUnit::Fahrenheit);
        assert!((f - 98.6).abs() < 0.001);

        let c = m.temperature_in(TemperatureUnit::Celsius, TemperatureUnit::Celsius);
        assert!((c - 37.0).abs() < 1e-9);
    }
}
