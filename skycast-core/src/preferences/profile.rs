use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::model::UnitSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            other => Err(format!("Unknown theme '{other}'. Use light, dark or system.")),
        }
    }
}

/// Display and behaviour preferences. Missing fields are backfilled from
/// the defaults on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherProfile {
    pub theme: Theme,
    pub unit: UnitSystem,
    pub default_city: Option<String>,
    pub language: String,
    pub notifications_enabled: bool,
    pub analytics_enabled: bool,
}

impl Default for WeatherProfile {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            unit: UnitSystem::Metric,
            default_city: None,
            language: "en".to_string(),
            notifications_enabled: false,
            analytics_enabled: true,
        }
    }
}

impl WeatherProfile {
    pub const FIELDS: [&'static str; 6] = [
        "theme",
        "unit",
        "default_city",
        "language",
        "notifications_enabled",
        "analytics_enabled",
    ];

    /// Set one field from its textual form, as typed on a command line.
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "theme" => self.theme = value.parse()?,
            "unit" => self.unit = value.parse()?,
            "default_city" => {
                let city = value.trim();
                self.default_city = match city {
                    "" | "none" => None,
                    _ => Some(city.to_string()),
                };
            }
            "language" => {
                let lang = value.trim();
                if lang.is_empty() {
                    return Err("language must not be empty".to_string());
                }
                self.language = lang.to_lowercase();
            }
            "notifications_enabled" => self.notifications_enabled = parse_flag(value)?,
            "analytics_enabled" => self.analytics_enabled = parse_flag(value)?,
            other => {
                return Err(format!(
                    "Unknown preference '{other}'. Known: {}.",
                    Self::FIELDS.join(", ")
                ));
            }
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => Err(format!("Expected true or false, got '{other}'")),
    }
}
