//! Upstream forecast shapes and their mapping into [`ForecastDay`].
//!
//! Each upstream shape is an explicit record type; nothing untyped crosses
//! this module. All days are keyed to local midnight of the calendar day in
//! the timezone of the `now` passed in.

use chrono::{DateTime, NaiveDate, TimeZone};
use serde::Deserialize;
use std::fmt::Display;

use crate::{
    display::day_label,
    error::WeatherError,
    model::{Condition, ForecastDay, UnitSystem},
    units::{fraction_to_percent, percent, primary_wind_to_mps, secondary_wind_to_mps},
};

pub const MAX_FORECAST_DAYS: usize = 7;

#[derive(Debug, Clone, Deserialize)]
pub struct OwWeather {
    pub main: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Primary source, daily aggregates.
#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryDailyEntry {
    pub dt: i64,
    pub temp: PrimaryDailyTemp,
    #[serde(default)]
    pub weather: Vec<OwWeather>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub pop: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryDailyTemp {
    pub min: f64,
    pub max: f64,
}

/// Primary source, one 3-hour step.
#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryStepEntry {
    pub dt: i64,
    pub main: PrimaryStepMain,
    #[serde(default)]
    pub weather: Vec<OwWeather>,
    #[serde(default)]
    pub wind: Option<PrimaryStepWind>,
    #[serde(default)]
    pub pop: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryStepMain {
    pub temp: f64,
    #[serde(default)]
    pub humidity: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryStepWind {
    pub speed: f64,
}

/// Body of the primary forecast endpoint, which answers in one of two shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PrimaryForecastBody {
    Daily { daily: Vec<PrimaryDailyEntry> },
    ThreeHour { list: Vec<PrimaryStepEntry> },
}

/// Secondary source, column-oriented daily aggregates keyed by calendar date.
#[derive(Debug, Clone, Deserialize)]
pub struct SecondaryDaily {
    pub time: Vec<String>,
    pub temperature_2m_max: Vec<Option<f64>>,
    pub temperature_2m_min: Vec<Option<f64>>,
    #[serde(alias = "weather_code")]
    pub weathercode: Vec<Option<i32>>,
    #[serde(default)]
    pub wind_speed_10m_max: Option<Vec<Option<f64>>>,
    #[serde(default)]
    pub precipitation_probability_max: Option<Vec<Option<f64>>>,
    #[serde(default)]
    pub relative_humidity_2m_max: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecondaryForecastBody {
    pub daily: SecondaryDaily,
}

#[derive(Debug, Clone)]
pub enum UpstreamForecast {
    PrimaryDaily(Vec<PrimaryDailyEntry>),
    PrimaryThreeHour(Vec<PrimaryStepEntry>),
    SecondaryDaily(SecondaryDaily),
}

impl From<PrimaryForecastBody> for UpstreamForecast {
    fn from(body: PrimaryForecastBody) -> Self {
        match body {
            PrimaryForecastBody::Daily { daily } => UpstreamForecast::PrimaryDaily(daily),
            PrimaryForecastBody::ThreeHour { list } => UpstreamForecast::PrimaryThreeHour(list),
        }
    }
}

/// Map any upstream shape into at most seven days in ascending date order.
pub fn normalize<Tz>(
    upstream: UpstreamForecast,
    unit: UnitSystem,
    now: &DateTime<Tz>,
) -> Result<Vec<ForecastDay>, WeatherError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut days = match upstream {
        UpstreamForecast::PrimaryDaily(entries) => from_primary_daily(entries, unit, now),
        UpstreamForecast::PrimaryThreeHour(entries) => from_primary_steps(entries, unit, now),
        UpstreamForecast::SecondaryDaily(daily) => from_secondary_daily(daily, unit, now)?,
    };

    days.sort_by_key(|d| d.date);
    days.truncate(MAX_FORECAST_DAYS);
    Ok(days)
}

fn from_primary_daily<Tz>(
    entries: Vec<PrimaryDailyEntry>,
    unit: UnitSystem,
    now: &DateTime<Tz>,
) -> Vec<ForecastDay>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    entries
        .into_iter()
        .map(|entry| {
            let date = local_day_start(entry.dt, now);
            ForecastDay {
                date,
                label: day_label(date, now),
                min_temp: entry.temp.min,
                max_temp: entry.temp.max,
                condition: primary_condition(&entry.weather),
                humidity: entry.humidity.map(percent),
                wind_speed_mps: entry.wind_speed.map(|s| primary_wind_to_mps(s, unit)),
                precipitation_chance: entry.pop.map(fraction_to_percent).unwrap_or(0),
            }
        })
        .collect()
}

fn from_primary_steps<Tz>(
    mut entries: Vec<PrimaryStepEntry>,
    unit: UnitSystem,
    now: &DateTime<Tz>,
) -> Vec<ForecastDay>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    entries.sort_by_key(|e| e.dt);

    let tz = now.timezone();
    let mut groups: Vec<(NaiveDate, Vec<PrimaryStepEntry>)> = Vec::new();

    for entry in entries {
        let Some(local) = tz.timestamp_opt(entry.dt, 0).single() else {
            continue;
        };
        let day = local.date_naive();
        // Entries are sorted, so each local day forms one contiguous run.
        match groups.last_mut() {
            Some((d, samples)) if *d == day => samples.push(entry),
            Some(_) | None => groups.push((day, vec![entry])),
        }
    }

    groups
        .into_iter()
        .map(|(day, samples)| {
            let date = midnight(day, &tz);
            aggregate_day(date, &samples, unit, now)
        })
        .collect()
}

fn aggregate_day<Tz>(
    date: i64,
    samples: &[PrimaryStepEntry],
    unit: UnitSystem,
    now: &DateTime<Tz>,
) -> ForecastDay
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let min_temp = samples
        .iter()
        .map(|s| s.main.temp)
        .fold(f64::INFINITY, f64::min);
    let max_temp = samples
        .iter()
        .map(|s| s.main.temp)
        .fold(f64::NEG_INFINITY, f64::max);

    let humidity = mean(samples.iter().filter_map(|s| s.main.humidity)).map(percent);
    let wind_speed_mps = mean(samples.iter().filter_map(|s| s.wind.as_ref().map(|w| w.speed)))
        .map(|s| primary_wind_to_mps(s, unit));
    let precipitation_chance = mean(samples.iter().map(|s| s.pop.unwrap_or(0.0)))
        .map(fraction_to_percent)
        .unwrap_or(0);

    let labels: Vec<String> = samples
        .iter()
        .map(|s| primary_condition(&s.weather))
        .collect();

    ForecastDay {
        date,
        label: day_label(date, now),
        min_temp,
        max_temp,
        condition: dominant_label(&labels),
        humidity,
        wind_speed_mps,
        precipitation_chance,
    }
}

fn from_secondary_daily<Tz>(
    daily: SecondaryDaily,
    unit: UnitSystem,
    now: &DateTime<Tz>,
) -> Result<Vec<ForecastDay>, WeatherError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let tz = now.timezone();
    let column = |values: &Option<Vec<Option<f64>>>, i: usize| {
        values.as_ref().and_then(|v| v.get(i).copied().flatten())
    };

    daily
        .time
        .iter()
        .enumerate()
        .map(|(i, raw_date)| -> Result<ForecastDay, WeatherError> {
            let day = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|e| {
                WeatherError::UnexpectedFormat(format!("bad forecast date '{raw_date}': {e}"))
            })?;
            let required = |values: &[Option<f64>], name: &str| {
                values.get(i).copied().flatten().ok_or_else(|| {
                    WeatherError::UnexpectedFormat(format!("missing {name} for {raw_date}"))
                })
            };
            let max_temp = required(daily.temperature_2m_max.as_slice(), "temperature_2m_max")?;
            let min_temp = required(daily.temperature_2m_min.as_slice(), "temperature_2m_min")?;
            let code = daily.weathercode.get(i).copied().flatten().ok_or_else(|| {
                WeatherError::UnexpectedFormat(format!("missing weathercode for {raw_date}"))
            })?;

            let date = midnight(day, &tz);
            Ok(ForecastDay {
                date,
                label: day_label(date, now),
                min_temp,
                max_temp,
                condition: Condition::from_wmo_code(code).to_string(),
                humidity: column(&daily.relative_humidity_2m_max, i).map(percent),
                wind_speed_mps: column(&daily.wind_speed_10m_max, i)
                    .map(|s| secondary_wind_to_mps(s, unit)),
                precipitation_chance: column(&daily.precipitation_probability_max, i)
                    .map(percent)
                    .unwrap_or(0),
            })
        })
        .collect()
}

/// Most frequent label. Counts are updated in one left-to-right pass and the
/// leader only changes on a strictly greater count, so ties go to whichever
/// label reached that count first.
pub fn dominant_label(labels: &[String]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut best: Option<(&str, usize)> = None;

    for label in labels {
        let count = match counts.iter_mut().find(|(l, _)| *l == label.as_str()) {
            Some((_, c)) => {
                *c += 1;
                *c
            }
            None => {
                counts.push((label.as_str(), 1));
                1
            }
        };
        if best.is_none_or(|(_, n)| count > n) {
            best = Some((label.as_str(), count));
        }
    }

    best.map(|(l, _)| l.to_string())
        .unwrap_or_else(|| Condition::Clouds.to_string())
}

fn primary_condition(weather: &[OwWeather]) -> String {
    weather
        .first()
        .map(|w| w.main.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn local_day_start<Tz: TimeZone>(epoch: i64, now: &DateTime<Tz>) -> i64 {
    let tz = now.timezone();
    match tz.timestamp_opt(epoch, 0).single() {
        Some(local) => midnight(local.date_naive(), &tz),
        None => epoch,
    }
}

fn midnight<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> i64 {
    let naive = day.and_hms_opt(0, 0, 0).unwrap_or_default();
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|t| t.timestamp())
        .unwrap_or_else(|| naive.and_utc().timestamp())
}
