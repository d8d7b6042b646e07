//! Volume unit conversions
//!
//! The control surface speaks percent (0-100); everything behind it works on 0.0-1.0.

/// Convert a percent volume to a unit gain, clamping to 0-100 first.
///
/// Non-finite input maps to silence.
pub fn percent_to_unit(percent: f32) -> f32 {
    if !percent.is_finite() {
        return 0.0;
    }
    percent.clamp(0.0, 100.0) / 100.0
}

/// Convert a unit gain back to a rounded percent value
pub fn unit_to_percent(unit: f32) -> f32 {
    (unit.clamp(0.0, 1.0) * 100.0).round()
}
