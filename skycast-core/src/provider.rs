use anyhow::Context;
use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Debug};

use crate::{
    Config,
    config::Endpoints,
    error::WeatherError,
    model::{CitySuggestion, Coordinates, Forecast, IpLocation, UnitSystem, WeatherSnapshot},
    provider::{
        ipapi::IpApiLocator,
        normalize::normalize,
        openmeteo::OpenMeteoProvider,
        openweather::{CurrentQuery, OpenWeatherProvider},
    },
};

mod http;
pub mod ipapi;
pub mod normalize;
pub mod openmeteo;
pub mod openweather;

/// Shortest query that is sent to the geocoding upstream.
pub const MIN_SUGGESTION_QUERY_CHARS: usize = 2;
pub const DEFAULT_SUGGESTION_LIMIT: usize = 7;

/// Upstream that produced a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenWeather,
    OpenMeteo,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::OpenMeteo => "openmeteo",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the session needs from the weather upstreams.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn current_by_city(
        &self,
        city: &str,
        unit: UnitSystem,
    ) -> Result<WeatherSnapshot, WeatherError>;

    /// Never fails with `NotFound`: coordinates resolve to the nearest station.
    async fn current_by_coordinates(
        &self,
        coords: Coordinates,
        unit: UnitSystem,
    ) -> Result<WeatherSnapshot, WeatherError>;

    async fn forecast(&self, coords: Coordinates, unit: UnitSystem)
    -> Result<Forecast, WeatherError>;

    async fn suggest_cities(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CitySuggestion>, WeatherError>;

    async fn locate_by_ip(&self) -> Result<IpLocation, WeatherError>;
}

type SuggestionKey = (String, usize);

/// Primary upstream with a secondary forecast source and IP lookup behind
/// one interface.
#[derive(Debug)]
pub struct WeatherAdapter {
    primary: OpenWeatherProvider,
    secondary: OpenMeteoProvider,
    ip: IpApiLocator,
    suggestions: Mutex<HashMap<SuggestionKey, Vec<CitySuggestion>>>,
}

impl WeatherAdapter {
    pub fn new(api_key: String, http: Client, endpoints: &Endpoints) -> Self {
        Self {
            primary: OpenWeatherProvider::new(api_key, http.clone(), endpoints),
            secondary: OpenMeteoProvider::new(http.clone(), endpoints),
            ip: IpApiLocator::new(http, endpoints),
            suggestions: Mutex::new(HashMap::new()),
        }
    }

    async fn primary_forecast(
        &self,
        coords: Coordinates,
        unit: UnitSystem,
    ) -> Result<Forecast, WeatherError> {
        let upstream = self.primary.fetch_forecast(coords, unit).await?;
        let days = normalize(upstream, unit, &Local::now())?;
        Ok(Forecast {
            days,
            provider: ProviderId::OpenWeather,
            unit,
        })
    }

    async fn secondary_forecast(
        &self,
        coords: Coordinates,
        unit: UnitSystem,
    ) -> Result<Forecast, WeatherError> {
        let upstream = self.secondary.fetch_forecast(coords, unit).await?;
        let days = normalize(upstream, unit, &Local::now())?;
        Ok(Forecast {
            days,
            provider: ProviderId::OpenMeteo,
            unit,
        })
    }
}

#[async_trait]
impl WeatherProvider for WeatherAdapter {
    async fn current_by_city(
        &self,
        city: &str,
        unit: UnitSystem,
    ) -> Result<WeatherSnapshot, WeatherError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(WeatherError::InvalidInput("city name is empty".into()));
        }

        let snapshot = self
            .primary
            .fetch_current(CurrentQuery::City(city), unit)
            .await?;
        tracing::debug!(city = %snapshot.city, unit = %unit, "current conditions loaded");
        Ok(snapshot)
    }

    async fn current_by_coordinates(
        &self,
        coords: Coordinates,
        unit: UnitSystem,
    ) -> Result<WeatherSnapshot, WeatherError> {
        coords.validate()?;

        let mut snapshot = self
            .primary
            .fetch_current(CurrentQuery::Coordinates(coords), unit)
            .await
            .map_err(|e| match e {
                WeatherError::NotFound(msg) => WeatherError::UnexpectedFormat(format!(
                    "coordinate lookup reported not found: {msg}"
                )),
                other => other,
            })?;

        if snapshot.coordinates.is_none() {
            snapshot.coordinates = Some(coords);
        }
        Ok(snapshot)
    }

    async fn forecast(
        &self,
        coords: Coordinates,
        unit: UnitSystem,
    ) -> Result<Forecast, WeatherError> {
        coords.validate()?;

        let primary_err = match self.primary_forecast(coords, unit).await {
            Ok(forecast) => return Ok(forecast),
            Err(e) if !e.allows_forecast_fallback() => return Err(e),
            Err(e) => e,
        };

        tracing::warn!(
            error = %primary_err,
            fallback = %ProviderId::OpenMeteo,
            "primary forecast failed, trying fallback"
        );

        self.secondary_forecast(coords, unit)
            .await
            .map_err(|secondary_err| combine_forecast_errors(&primary_err, secondary_err))
    }

    async fn suggest_cities(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CitySuggestion>, WeatherError> {
        let query = query.trim();
        let normalized = query.to_lowercase();
        if normalized.chars().count() < MIN_SUGGESTION_QUERY_CHARS || limit == 0 {
            return Ok(Vec::new());
        }

        let key = (normalized, limit);
        let cached = self.suggestions.lock().get(&key).cloned();
        if let Some(hit) = cached {
            tracing::trace!(query = %key.0, "suggestion cache hit");
            return Ok(hit);
        }

        let found = self.primary.geocode(query, limit).await?;
        self.suggestions.lock().insert(key, found.clone());
        Ok(found)
    }

    async fn locate_by_ip(&self) -> Result<IpLocation, WeatherError> {
        self.ip.locate().await
    }
}

/// Single error surfaced when both forecast sources fail.
fn combine_forecast_errors(primary: &WeatherError, secondary: WeatherError) -> WeatherError {
    tracing::warn!(error = %secondary, "fallback forecast failed");

    let detail = format!("primary: {primary}; fallback: {secondary}");
    match secondary {
        WeatherError::UnexpectedFormat(_) => WeatherError::UnexpectedFormat(detail),
        _ => WeatherError::Network(detail),
    }
}

/// Build the adapter from config, resolving the API key from the
/// environment or the config file.
pub fn adapter_from_config(config: &Config) -> anyhow::Result<WeatherAdapter> {
    adapter_with_key(config, config.resolved_api_key(ProviderId::OpenWeather))
}

fn adapter_with_key(config: &Config, api_key: Option<String>) -> anyhow::Result<WeatherAdapter> {
    let id = ProviderId::OpenWeather;
    let api_key = api_key.ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `skycast configure` and enter your API key, or set {}.",
            crate::config::API_KEY_ENV
        )
    })?;

    let http = Client::builder()
        .timeout(config.http_timeout())
        .user_agent(concat!("skycast/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    Ok(WeatherAdapter::new(api_key, http, &config.endpoints))
}
