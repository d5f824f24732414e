use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{error::WeatherError, provider::ProviderId};

/// Unit system used for both the upstream request and every derived value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            UnitSystem::Metric => UnitSystem::Imperial,
            UnitSystem::Imperial => UnitSystem::Metric,
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "metric" | "c" | "celsius" => Ok(UnitSystem::Metric),
            "imperial" | "f" | "fahrenheit" => Ok(UnitSystem::Imperial),
            other => Err(format!("Unknown unit system '{other}'. Use metric or imperial.")),
        }
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Result<Self, WeatherError> {
        let coords = Self { lat, lon };
        coords.validate()?;
        Ok(coords)
    }

    pub fn validate(&self) -> Result<(), WeatherError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(WeatherError::InvalidInput(format!(
                "latitude {} is out of range",
                self.lat
            )));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(WeatherError::InvalidInput(format!(
                "longitude {} is out of range",
                self.lon
            )));
        }
        Ok(())
    }
}

/// Current conditions for one location at one instant.
///
/// Temperatures are in the unit of `unit`; wind speed is always metres per
/// second and is converted only when rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub city: String,
    pub country: String,
    /// Absent when the upstream omits `coord`; always set for coordinate lookups.
    pub coordinates: Option<Coordinates>,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub wind_speed_mps: f64,
    pub condition: String,
    pub description: Option<String>,
    pub sunrise: i64,
    pub sunset: i64,
    pub observed_at: i64,
    pub pressure_hpa: Option<f64>,
    pub visibility_km: Option<f64>,
    pub unit: UnitSystem,
}

/// One day of the multi-day outlook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    /// Epoch seconds, day granularity.
    pub date: i64,
    /// "Today" or a short weekday name.
    pub label: String,
    pub min_temp: f64,
    pub max_temp: f64,
    pub condition: String,
    pub humidity: Option<u8>,
    pub wind_speed_mps: Option<f64>,
    /// 0-100.
    pub precipitation_chance: u8,
}

/// Normalized forecast plus the upstream that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub days: Vec<ForecastDay>,
    pub provider: ProviderId,
    pub unit: UnitSystem,
}

/// Candidate returned by city autocomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitySuggestion {
    pub id: String,
    pub name: String,
    pub state: Option<String>,
    pub country: String,
    pub coordinates: Coordinates,
}

impl CitySuggestion {
    /// "Name, State, CC" with the state omitted when absent.
    pub fn label(&self) -> String {
        match &self.state {
            Some(state) => format!("{}, {}, {}", self.name, state, self.country),
            None => format!("{}, {}", self.name, self.country),
        }
    }
}

/// Approximate position derived from the caller's IP address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpLocation {
    pub city: String,
    pub country: String,
    pub coordinates: Coordinates,
}

/// Fixed vocabulary of coarse condition labels produced by code-based sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Clear,
    Clouds,
    Fog,
    Rain,
    Snow,
    Thunderstorm,
}

impl Condition {
    pub const ALL: [Condition; 6] = [
        Condition::Clear,
        Condition::Clouds,
        Condition::Fog,
        Condition::Rain,
        Condition::Snow,
        Condition::Thunderstorm,
    ];

    /// Map a WMO weather interpretation code onto the coarse vocabulary.
    /// Unknown codes fall back to `Clouds`.
    pub fn from_wmo_code(code: i32) -> Self {
        match code {
            0 => Condition::Clear,
            1..=3 => Condition::Clouds,
            45 | 48 => Condition::Fog,
            51 | 53 | 55 | 56 | 57 | 61 | 63 | 65 | 66 | 67 | 80 | 81 | 82 => Condition::Rain,
            71 | 73 | 75 | 77 | 85 | 86 => Condition::Snow,
            95 | 96 | 99 => Condition::Thunderstorm,
            _ => Condition::Clouds,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Clear => "Clear",
            Condition::Clouds => "Clouds",
            Condition::Fog => "Fog",
            Condition::Rain => "Rain",
            Condition::Snow => "Snow",
            Condition::Thunderstorm => "Thunderstorm",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
