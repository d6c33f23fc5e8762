//! Raw reading to volume level conversion.
//!
//! The device reports 10-bit readings (`0..=1023`).  Audio targets work on a
//! `0.0..=1.0` scalar; the backlight works on whole percent.  All conversions
//! clamp rather than wrap.

use crate::protocol::parser::RAW_VALUE_MAX;

/// Converts a raw reading to a percentage in `0.0..=100.0`.
///
/// `clamp(raw / 1023 * 100, 0, 100)`.
pub fn raw_to_percent(raw_value: u32) -> f64 {
    let raw = f64::from(raw_value.min(RAW_VALUE_MAX));
    (raw / f64::from(RAW_VALUE_MAX) * 100.0).clamp(0.0, 100.0)
}

/// Converts a raw reading to a normalized level in `0.0..=1.0`.
pub fn normalize(raw_value: u32) -> f32 {
    (raw_to_percent(raw_value) / 100.0) as f32
}

/// Clamps an arbitrary level into `0.0..=1.0`.  `NaN` becomes `0.0`.
pub fn clamp_level(level: f32) -> f32 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

/// Converts a normalized level to the backlight's integer percent scale.
pub fn level_to_brightness(level: f32) -> u8 {
    (clamp_level(level) * 100.0).round() as u8
}

/// Converts a backlight percentage back to a normalized level.
pub fn brightness_to_level(percent: u8) -> f32 {
    f32::from(percent.min(100)) / 100.0
}
