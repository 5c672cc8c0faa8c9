//! Utility functions for the easyhome-ble crate.

/// Convert Celsius to Fahrenheit.
///
/// # Example
///
/// ```
/// use easyhome_ble::celsius_to_fahrenheit;
///
/// let fahrenheit = celsius_to_fahrenheit(37.0);
/// assert!((fahrenheit - 98.6).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Convert Fahrenheit to Celsius.
///
/// # Example
///
/// ```
/// use easyhome_ble::fahrenheit_to_celsius;
///
/// let celsius = fahrenheit_to_celsius(98.6);
/// assert!((celsius - 37.0).abs() < 0.001);
/// ```
#[inline]
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Format a frame as space separated hex for log output.
pub(crate) fn hex_frame(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
