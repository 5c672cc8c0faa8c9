//! Temperature unit selection.

use crate::utils::{celsius_to_fahrenheit, fahrenheit_to_celsius};

/// Unit the thermometer reports temperatures in.
///
/// Notifications do not say which unit they use. The device applies the
/// unit last written with a unit-sync command, so callers must remember
/// what they configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TemperatureUnit {
    /// Degrees Celsius (device code 1).
    Celsius = 1,
    /// Degrees Fahrenheit (device code 2).
    Fahrenheit = 2,
}

impl TemperatureUnit {
    /// Map the `celsius` flag used by the unit-sync command.
    pub fn from_celsius(celsius: bool) -> Self {
        if celsius {
            Self::Celsius
        } else {
            Self::Fahrenheit
        }
    }

    /// Create from the device's unit code.
    pub fn from_device_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Celsius),
            2 => Some(Self::Fahrenheit),
            _ => None,
        }
    }

    /// The unit code written in the unit-sync command.
    pub fn device_code(&self) -> u8 {
        *self as u8
    }

    /// Check if this is Celsius.
    pub fn is_celsius(&self) -> bool {
        matches!(self, Self::Celsius)
    }

    /// Convert a value expressed in this unit into `target`.
    pub fn convert(&self, value: f64, target: TemperatureUnit) -> f64 {
        match (self, target) {
            (Self::Celsius, Self::Fahrenheit) => celsius_to_fahrenheit(value),
            (Self::Fahrenheit, Self::Celsius) => fahrenheit_to_celsius(value),
            _ => value,
        }
    }

    /// Unit symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}

impl std::fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Celsius => write!(f, "Celsius"),
            Self::Fahrenheit => write!(f, "Fahrenheit"),
        }
    }
}
