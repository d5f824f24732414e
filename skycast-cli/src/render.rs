//! Human-readable output.

use chrono::{Local, TimeZone, Utc};
use std::fmt::Write;

use skycast_core::{
    Forecast, WeatherProfile, WeatherSession, WeatherSnapshot,
    display::{ThemeState, WeatherIcon, clock_time, long_date},
    preferences::FavoriteCity,
    units::{format_temp, format_temp_short, format_wind},
};

pub fn snapshot(s: &WeatherSnapshot) -> String {
    let mut out = String::new();
    let icon = WeatherIcon::for_condition(&s.condition).glyph();
    let observed = Local
        .timestamp_opt(s.observed_at, 0)
        .single()
        .map(|t| long_date(&t))
        .unwrap_or_default();

    let _ = writeln!(out, "{}, {}  {}", s.city, s.country, observed);
    let _ = writeln!(
        out,
        "{icon}  {}  {}",
        format_temp(s.temperature, s.unit),
        s.description.as_deref().unwrap_or(&s.condition)
    );
    let _ = writeln!(out, "   Feels like  {}", format_temp(s.feels_like, s.unit));
    let _ = writeln!(out, "   Humidity    {}%", s.humidity);
    let _ = writeln!(out, "   Wind        {}", format_wind(s.wind_speed_mps, s.unit));
    if let Some(p) = s.pressure_hpa {
        let _ = writeln!(out, "   Pressure    {p:.0} hPa");
    }
    if let Some(v) = s.visibility_km {
        let _ = writeln!(out, "   Visibility  {v:.1} km");
    }
    let _ = writeln!(
        out,
        "   Sunrise     {}   Sunset {}",
        clock_time(s.sunrise, &Local),
        clock_time(s.sunset, &Local)
    );
    out
}

pub fn forecast(f: &Forecast) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}-day forecast ({})", f.days.len(), f.provider);

    for day in &f.days {
        let icon = WeatherIcon::for_condition(&day.condition).glyph();
        let _ = write!(
            out,
            "   {:<6} {icon}  {:>4} / {:<4} {:<13} rain {:>3}%",
            day.label,
            format_temp_short(day.max_temp),
            format_temp_short(day.min_temp),
            day.condition,
            day.precipitation_chance
        );
        if let Some(wind) = day.wind_speed_mps {
            let _ = write!(out, "  wind {}", format_wind(wind, f.unit));
        }
        if let Some(h) = day.humidity {
            let _ = write!(out, "  hum {h}%");
        }
        out.push('\n');
    }
    out
}

/// Current conditions, forecast and data age for a loaded session.
pub fn session(session: &WeatherSession) -> String {
    let mut out = String::new();
    if let Some(s) = session.snapshot() {
        out.push_str(&snapshot(s));
    }
    if let Some(f) = session.forecast() {
        out.push('\n');
        out.push_str(&forecast(f));
    }
    if let Some(label) = session.last_updated_label(Utc::now()) {
        let _ = writeln!(out, "\nUpdated: {label}");
    }
    out
}

pub fn favorites(list: &[FavoriteCity]) -> String {
    if list.is_empty() {
        return "No favorite cities yet.\n".to_string();
    }
    list.iter()
        .map(|f| format!("{:<40} [{}]\n", f.label(), f.id))
        .collect()
}

pub fn history(list: &[String]) -> String {
    if list.is_empty() {
        return "No recent searches.\n".to_string();
    }
    list.iter()
        .enumerate()
        .map(|(i, entry)| format!("{:>2}. {entry}\n", i + 1))
        .collect()
}

pub fn profile(p: &WeatherProfile, theme: &ThemeState) -> String {
    let mut out = String::new();
    let mode = if theme.dark { "dark" } else { "light" };
    let _ = writeln!(out, "theme                  {} ({mode})", p.theme);
    let _ = writeln!(out, "unit                   {}", p.unit);
    let _ = writeln!(
        out,
        "default_city           {}",
        p.default_city.as_deref().unwrap_or("none")
    );
    let _ = writeln!(out, "language               {}", p.language);
    let _ = writeln!(out, "notifications_enabled  {}", p.notifications_enabled);
    let _ = writeln!(out, "analytics_enabled      {}", p.analytics_enabled);
    out
}
