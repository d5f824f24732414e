//! In-crate fakes for the async seams.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    error::{LocationError, WeatherError},
    location::{DeviceLocator, GeolocationOptions},
    model::{
        CitySuggestion, Coordinates, Forecast, ForecastDay, IpLocation, UnitSystem,
        WeatherSnapshot,
    },
    provider::{ProviderId, WeatherProvider},
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CurrentByCity(String, UnitSystem),
    CurrentByCoordinates(Coordinates, UnitSystem),
    Forecast(Coordinates, UnitSystem),
    Suggest(String, usize),
    LocateByIp,
}

pub(crate) const PARIS: Coordinates = Coordinates {
    lat: 48.85,
    lon: 2.35,
};

#[derive(Debug)]
pub(crate) struct FakeProvider {
    calls: Mutex<Vec<Call>>,
    city_error: Mutex<Option<WeatherError>>,
    forecast_error: Mutex<Option<WeatherError>>,
    ip: Result<IpLocation, WeatherError>,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            city_error: Mutex::new(None),
            forecast_error: Mutex::new(None),
            ip: Ok(IpLocation {
                city: "Lyon".into(),
                country: "FR".into(),
                coordinates: Coordinates {
                    lat: 45.75,
                    lon: 4.85,
                },
            }),
        }
    }

    pub(crate) fn with_ip_error(mut self, err: WeatherError) -> Self {
        self.ip = Err(err);
        self
    }

    pub(crate) fn set_city_error(&self, err: Option<WeatherError>) {
        *self.city_error.lock() = err;
    }

    pub(crate) fn set_forecast_error(&self, err: Option<WeatherError>) {
        *self.forecast_error.lock() = err;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

pub(crate) fn snapshot(city: &str, unit: UnitSystem, coords: Coordinates) -> WeatherSnapshot {
    let temperature = match unit {
        UnitSystem::Metric => 18.0,
        UnitSystem::Imperial => 64.4,
    };
    WeatherSnapshot {
        city: city.to_string(),
        country: "FR".into(),
        coordinates: Some(coords),
        temperature,
        feels_like: temperature - 1.0,
        humidity: 60,
        wind_speed_mps: 3.1,
        condition: "Clouds".into(),
        description: None,
        sunrise: 1_699_990_000,
        sunset: 1_700_030_000,
        observed_at: 1_700_000_000,
        pressure_hpa: None,
        visibility_km: None,
        unit,
    }
}

fn forecast(unit: UnitSystem) -> Forecast {
    let days = (0..3)
        .map(|i| ForecastDay {
            date: 1_700_000_000 + i * 86_400,
            label: if i == 0 { "Today".into() } else { format!("Day {i}") },
            min_temp: 10.0,
            max_temp: 20.0,
            condition: "Rain".into(),
            humidity: Some(70),
            wind_speed_mps: Some(4.0),
            precipitation_chance: 40,
        })
        .collect();
    Forecast {
        days,
        provider: ProviderId::OpenWeather,
        unit,
    }
}

#[async_trait]
impl WeatherProvider for FakeProvider {
    async fn current_by_city(
        &self,
        city: &str,
        unit: UnitSystem,
    ) -> Result<WeatherSnapshot, WeatherError> {
        self.record(Call::CurrentByCity(city.to_string(), unit));
        if let Some(err) = self.city_error.lock().clone() {
            return Err(err);
        }
        Ok(snapshot(city, unit, PARIS))
    }

    async fn current_by_coordinates(
        &self,
        coords: Coordinates,
        unit: UnitSystem,
    ) -> Result<WeatherSnapshot, WeatherError> {
        self.record(Call::CurrentByCoordinates(coords, unit));
        Ok(snapshot("Nearby", unit, coords))
    }

    async fn forecast(
        &self,
        coords: Coordinates,
        unit: UnitSystem,
    ) -> Result<Forecast, WeatherError> {
        self.record(Call::Forecast(coords, unit));
        if let Some(err) = self.forecast_error.lock().clone() {
            return Err(err);
        }
        Ok(forecast(unit))
    }

    async fn suggest_cities(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CitySuggestion>, WeatherError> {
        self.record(Call::Suggest(query.to_string(), limit));
        Ok(vec![CitySuggestion {
            id: "48.85,2.35,0".into(),
            name: query.to_string(),
            state: None,
            country: "FR".into(),
            coordinates: PARIS,
        }])
    }

    async fn locate_by_ip(&self) -> Result<IpLocation, WeatherError> {
        self.record(Call::LocateByIp);
        self.ip.clone()
    }
}

/// Never answers, like a device stuck waiting for a fix.
#[derive(Debug)]
pub(crate) struct HangingLocator;

#[async_trait]
impl DeviceLocator for HangingLocator {
    async fn current_position(
        &self,
        _options: &GeolocationOptions,
    ) -> Result<Coordinates, LocationError> {
        std::future::pending().await
    }
}
