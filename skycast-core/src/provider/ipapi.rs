//! Approximate location from the caller's public IP address.

use reqwest::Client;
use serde::Deserialize;

use crate::{
    config::Endpoints,
    error::WeatherError,
    model::{Coordinates, IpLocation},
    provider::http::get_json,
};

#[derive(Debug, Clone)]
pub struct IpApiLocator {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    /// Set on rate limiting and reserved ranges, with `reason`.
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
}

impl IpApiLocator {
    pub fn new(http: Client, endpoints: &Endpoints) -> Self {
        Self {
            http,
            base_url: endpoints.ip_lookup.trim_end_matches('/').to_string(),
        }
    }

    pub async fn locate(&self) -> Result<IpLocation, WeatherError> {
        let url = format!("{}/json/", self.base_url);
        let body: IpApiResponse = get_json(&self.http, "ipapi", &url, &[]).await?;
        body.into_location()
    }
}

impl IpApiResponse {
    fn into_location(self) -> Result<IpLocation, WeatherError> {
        if self.error {
            let reason = self.reason.unwrap_or_else(|| "unknown reason".to_string());
            if reason.to_lowercase().contains("ratelimited") {
                return Err(WeatherError::RateLimited);
            }
            return Err(WeatherError::Network(format!("IP geolocation failed: {reason}")));
        }

        let city = self
            .city
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| WeatherError::UnexpectedFormat("IP lookup returned no city".into()))?;
        let (lat, lon) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                return Err(WeatherError::UnexpectedFormat(
                    "IP lookup returned no coordinates".into(),
                ));
            }
        };

        Ok(IpLocation {
            city,
            country: self.country.unwrap_or_default(),
            coordinates: Coordinates::new(lat, lon)
                .map_err(|e| WeatherError::UnexpectedFormat(e.to_string()))?,
        })
    }
}
