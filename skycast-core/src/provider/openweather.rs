use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    config::Endpoints,
    error::WeatherError,
    model::{CitySuggestion, Coordinates, UnitSystem, WeatherSnapshot},
    provider::{
        http::get_json,
        normalize::{OwWeather, PrimaryForecastBody, UpstreamForecast},
    },
    units::{percent, primary_wind_to_mps},
};

/// How a current-conditions lookup is addressed.
#[derive(Debug, Clone, Copy)]
pub enum CurrentQuery<'a> {
    City(&'a str),
    Coordinates(Coordinates),
}

/// Primary upstream: current conditions, forecast and geocoding.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: Client,
    base_url: String,
    geo_base_url: String,
    forecast_path: String,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, http: Client, endpoints: &Endpoints) -> Self {
        Self {
            api_key,
            http,
            base_url: endpoints.openweather.trim_end_matches('/').to_string(),
            geo_base_url: endpoints.openweather_geo.trim_end_matches('/').to_string(),
            forecast_path: endpoints.forecast_path.trim_matches('/').to_string(),
        }
    }

    pub async fn fetch_current(
        &self,
        query: CurrentQuery<'_>,
        unit: UnitSystem,
    ) -> Result<WeatherSnapshot, WeatherError> {
        let url = format!("{}/weather", self.base_url);

        let mut params = match query {
            CurrentQuery::City(city) => vec![("q", city.to_string())],
            CurrentQuery::Coordinates(c) => {
                vec![("lat", c.lat.to_string()), ("lon", c.lon.to_string())]
            }
        };
        params.push(("units", unit.as_str().to_string()));
        params.push(("appid", self.api_key.clone()));

        let raw: Value = get_json(&self.http, "openweather", &url, &params).await?;
        check_embedded_code(&raw)?;

        let parsed: OwCurrentResponse = serde_json::from_value(raw)?;
        parsed.into_snapshot(unit)
    }

    pub async fn fetch_forecast(
        &self,
        coords: Coordinates,
        unit: UnitSystem,
    ) -> Result<UpstreamForecast, WeatherError> {
        let url = format!("{}/{}", self.base_url, self.forecast_path);

        let params = [
            ("lat", coords.lat.to_string()),
            ("lon", coords.lon.to_string()),
            ("units", unit.as_str().to_string()),
            ("exclude", "current,minutely,hourly,alerts".to_string()),
            ("appid", self.api_key.clone()),
        ];

        let raw: Value = get_json(&self.http, "openweather", &url, &params).await?;
        check_embedded_code(&raw)?;

        let body: PrimaryForecastBody = serde_json::from_value(raw).map_err(|e| {
            WeatherError::UnexpectedFormat(format!("Unexpected forecast response format: {e}"))
        })?;
        Ok(body.into())
    }

    pub async fn geocode(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CitySuggestion>, WeatherError> {
        let url = format!("{}/direct", self.geo_base_url);

        let params = [
            ("q", query.to_string()),
            ("limit", limit.to_string()),
            ("appid", self.api_key.clone()),
        ];

        let raw: Value = get_json(&self.http, "openweather-geo", &url, &params).await?;
        let Value::Array(items) = raw else {
            return Ok(Vec::new());
        };

        let suggestions = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<OwGeoEntry>(item).ok())
            .filter(OwGeoEntry::is_complete)
            .enumerate()
            .filter_map(|(index, entry)| entry.into_suggestion(index))
            .collect();

        Ok(suggestions)
    }
}

/// The upstream sometimes answers 200 with an error code in the body.
fn check_embedded_code(raw: &Value) -> Result<(), WeatherError> {
    let code = match raw.get("cod") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse::<i64>().ok(),
        _ => None,
    };

    match code {
        Some(200) | None => Ok(()),
        Some(code) => {
            let message = raw
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("upstream reported an error")
                .to_string();
            match code {
                404 => Err(WeatherError::NotFound(message)),
                401 | 403 => Err(WeatherError::Auth { status: code as u16 }),
                429 => Err(WeatherError::RateLimited),
                _ => Err(WeatherError::UnexpectedFormat(message)),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    country: String,
    sunrise: i64,
    sunset: i64,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: f64,
    #[serde(default)]
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    #[serde(default)]
    coord: Option<OwCoord>,
    sys: OwSys,
    main: OwMain,
    wind: OwWind,
    weather: Vec<OwWeather>,
    dt: i64,
    /// Metres.
    #[serde(default)]
    visibility: Option<f64>,
}

impl OwCurrentResponse {
    fn into_snapshot(self, unit: UnitSystem) -> Result<WeatherSnapshot, WeatherError> {
        let weather = self.weather.into_iter().next().ok_or_else(|| {
            WeatherError::UnexpectedFormat("current conditions without weather entry".into())
        })?;

        Ok(WeatherSnapshot {
            city: self.name,
            country: self.sys.country,
            coordinates: self.coord.map(|c| Coordinates {
                lat: c.lat,
                lon: c.lon,
            }),
            temperature: self.main.temp,
            feels_like: self.main.feels_like,
            humidity: percent(self.main.humidity),
            wind_speed_mps: primary_wind_to_mps(self.wind.speed, unit),
            condition: weather.main,
            description: weather.description,
            sunrise: self.sys.sunrise,
            sunset: self.sys.sunset,
            observed_at: self.dt,
            pressure_hpa: self.main.pressure,
            visibility_km: self.visibility.map(|m| m / 1000.0),
            unit,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwGeoEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

impl OwGeoEntry {
    fn is_complete(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
            && self.lat.is_some()
            && self.lon.is_some()
    }

    fn into_suggestion(self, index: usize) -> Option<CitySuggestion> {
        let name = self.name.filter(|n| !n.is_empty())?;
        let (lat, lon) = (self.lat?, self.lon?);

        Some(CitySuggestion {
            id: format!("{lat},{lon},{index}"),
            name,
            state: self.state,
            country: self.country.unwrap_or_default(),
            coordinates: Coordinates { lat, lon },
        })
    }
}
