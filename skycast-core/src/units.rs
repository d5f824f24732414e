//! Unit conversions and formatting.
//!
//! Wind speed is carried in metres per second everywhere in the model.
//! Upstream values are converted into m/s when parsed; display values are
//! produced here at render time.

use crate::model::UnitSystem;

pub const KMH_PER_MPS: f64 = 3.6;
pub const MPH_PER_KMH: f64 = 0.621371;

pub fn kmh_to_mps(kmh: f64) -> f64 {
    kmh / KMH_PER_MPS
}

pub fn mph_to_mps(mph: f64) -> f64 {
    mph / MPH_PER_KMH / KMH_PER_MPS
}

/// Convert a wind speed reported by the primary upstream into m/s.
/// The primary reports m/s for metric and mph for imperial requests.
pub fn primary_wind_to_mps(speed: f64, unit: UnitSystem) -> f64 {
    match unit {
        UnitSystem::Metric => speed,
        UnitSystem::Imperial => mph_to_mps(speed),
    }
}

/// Convert a wind speed reported by the secondary upstream into m/s.
/// The secondary is asked for km/h (metric) or mph (imperial).
pub fn secondary_wind_to_mps(speed: f64, unit: UnitSystem) -> f64 {
    match unit {
        UnitSystem::Metric => kmh_to_mps(speed),
        UnitSystem::Imperial => mph_to_mps(speed),
    }
}

/// Wind speed in the display unit of `unit`: km/h for metric, mph for imperial.
pub fn display_wind(mps: f64, unit: UnitSystem) -> f64 {
    let kmh = mps * KMH_PER_MPS;
    match unit {
        UnitSystem::Metric => kmh,
        UnitSystem::Imperial => kmh * MPH_PER_KMH,
    }
}

pub fn wind_unit_label(unit: UnitSystem) -> &'static str {
    match unit {
        UnitSystem::Metric => "km/h",
        UnitSystem::Imperial => "mph",
    }
}

/// "12.3 km/h" / "7.6 mph".
pub fn format_wind(mps: f64, unit: UnitSystem) -> String {
    format!("{:.1} {}", display_wind(mps, unit), wind_unit_label(unit))
}

/// Rounded temperature with its unit symbol, e.g. "18°C".
pub fn format_temp(value: f64, unit: UnitSystem) -> String {
    let symbol = match unit {
        UnitSystem::Metric => "C",
        UnitSystem::Imperial => "F",
    };
    // `as i64` on -0.4.round() yields 0, avoiding "-0°C".
    format!("{}°{}", value.round() as i64, symbol)
}

/// Rounded temperature without a unit, for compact forecast rows.
pub fn format_temp_short(value: f64) -> String {
    format!("{}°", value.round() as i64)
}

/// Fraction in 0..=1 to a whole percentage clamped to 0..=100.
pub fn fraction_to_percent(fraction: f64) -> u8 {
    percent(fraction * 100.0)
}

/// Round and clamp into 0..=100.
pub fn percent(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}
