//! Date labels, condition imagery and theme state for the presentation layer.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt::Display;

use crate::preferences::Theme;

/// "Today" when `date` falls on the same local calendar day as `now`,
/// otherwise the short English weekday ("Mon").
pub fn day_label<Tz>(date: i64, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match now.timezone().timestamp_opt(date, 0).single() {
        Some(day) if day.date_naive() == now.date_naive() => "Today".to_string(),
        Some(day) => day.format("%a").to_string(),
        None => String::new(),
    }
}

/// "Saturday, October 17".
pub fn long_date<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format("%A, %B %-d").to_string()
}

/// "HH:MM" in the timezone of `tz`.
pub fn clock_time<Tz>(epoch: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    tz.timestamp_opt(epoch, 0)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

/// Human aging of the last successful fetch. Display only.
pub fn last_updated_label(updated: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(updated);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{minutes} min ago")
    } else if hours < 24 {
        format!("{hours} hour{} ago", if hours > 1 { "s" } else { "" })
    } else {
        "More than a day ago".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WeatherIcon {
    Sun,
    CloudSun,
    Cloud,
    CloudRain,
    CloudSnow,
    CloudLightning,
    CloudFog,
    Droplets,
}

impl WeatherIcon {
    pub fn for_condition(condition: &str) -> Self {
        let c = condition.to_lowercase();

        if c.contains("clear") || c.contains("sunny") {
            WeatherIcon::Sun
        } else if c.contains("partly cloudy") || c.contains("few clouds") {
            WeatherIcon::CloudSun
        } else if c.contains("cloud") {
            WeatherIcon::Cloud
        } else if c.contains("rain") || c.contains("drizzle") {
            WeatherIcon::CloudRain
        } else if c.contains("snow") {
            WeatherIcon::CloudSnow
        } else if c.contains("thunder") || c.contains("lightning") {
            WeatherIcon::CloudLightning
        } else if c.contains("mist") || c.contains("fog") {
            WeatherIcon::CloudFog
        } else if c.contains("shower") {
            WeatherIcon::Droplets
        } else {
            WeatherIcon::Sun
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            WeatherIcon::Sun => "☀",
            WeatherIcon::CloudSun => "⛅",
            WeatherIcon::Cloud => "☁",
            WeatherIcon::CloudRain => "🌧",
            WeatherIcon::CloudSnow => "🌨",
            WeatherIcon::CloudLightning => "🌩",
            WeatherIcon::CloudFog => "🌫",
            WeatherIcon::Droplets => "💧",
        }
    }
}

/// Two-stop background gradient for a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Backdrop {
    pub from: &'static str,
    pub to: &'static str,
}

impl Backdrop {
    const fn new(from: &'static str, to: &'static str) -> Self {
        Self { from, to }
    }

    /// Backdrop used when nothing has been loaded yet.
    pub fn empty(is_dark: bool) -> Self {
        if is_dark {
            Backdrop::new("slate-900", "slate-800")
        } else {
            Backdrop::new("blue-200", "blue-100")
        }
    }

    pub fn for_condition(condition: &str, is_dark: bool) -> Self {
        let c = condition.to_lowercase();
        let clear = c.contains("clear") || c.contains("sunny");

        if is_dark {
            if clear {
                Backdrop::new("slate-900", "blue-900")
            } else if c.contains("cloud") {
                Backdrop::new("slate-900", "slate-800")
            } else if c.contains("rain") {
                Backdrop::new("slate-900", "blue-950")
            } else if c.contains("snow") {
                Backdrop::new("slate-900", "slate-700")
            } else if c.contains("thunder") {
                Backdrop::new("slate-900", "purple-950")
            } else {
                Backdrop::new("slate-900", "slate-800")
            }
        } else if clear {
            Backdrop::new("blue-400", "sky-300")
        } else if c.contains("cloud") {
            Backdrop::new("gray-300", "gray-200")
        } else if c.contains("rain") {
            Backdrop::new("blue-500", "blue-400")
        } else if c.contains("snow") {
            Backdrop::new("blue-100", "gray-100")
        } else if c.contains("thunder") {
            Backdrop::new("purple-400", "purple-300")
        } else {
            Backdrop::new("blue-200", "blue-100")
        }
    }
}

/// Resolved theme pushed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThemeState {
    pub theme: Theme,
    pub dark: bool,
    pub backdrop: Backdrop,
}

impl ThemeState {
    /// `system_prefers_dark` is only consulted for `Theme::System`.
    pub fn resolve(theme: Theme, system_prefers_dark: bool, condition: Option<&str>) -> Self {
        let dark = match theme {
            Theme::Dark => true,
            Theme::Light => false,
            Theme::System => system_prefers_dark,
        };
        let backdrop = match condition {
            Some(c) => Backdrop::for_condition(c, dark),
            None => Backdrop::empty(dark),
        };

        Self {
            theme,
            dark,
            backdrop,
        }
    }
}
