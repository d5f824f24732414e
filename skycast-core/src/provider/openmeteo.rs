use reqwest::Client;

use crate::{
    config::Endpoints,
    error::WeatherError,
    model::{Coordinates, UnitSystem},
    provider::{
        http::get_json,
        normalize::{SecondaryForecastBody, UpstreamForecast},
    },
};

const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,weathercode,wind_speed_10m_max,precipitation_probability_max,relative_humidity_2m_max";

/// Secondary forecast upstream. Keyless; used only when the primary fails.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    http: Client,
    base_url: String,
}

impl OpenMeteoProvider {
    pub fn new(http: Client, endpoints: &Endpoints) -> Self {
        Self {
            http,
            base_url: endpoints.openmeteo.trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_forecast(
        &self,
        coords: Coordinates,
        unit: UnitSystem,
    ) -> Result<UpstreamForecast, WeatherError> {
        let url = format!("{}/forecast", self.base_url);

        let (temperature_unit, wind_speed_unit) = match unit {
            UnitSystem::Metric => ("celsius", "kmh"),
            UnitSystem::Imperial => ("fahrenheit", "mph"),
        };

        let params = [
            ("latitude", coords.lat.to_string()),
            ("longitude", coords.lon.to_string()),
            ("daily", DAILY_FIELDS.to_string()),
            ("timezone", "auto".to_string()),
            ("temperature_unit", temperature_unit.to_string()),
            ("wind_speed_unit", wind_speed_unit.to_string()),
        ];

        let body: SecondaryForecastBody = get_json(&self.http, "openmeteo", &url, &params).await?;
        Ok(UpstreamForecast::SecondaryDaily(body.daily))
    }
}
