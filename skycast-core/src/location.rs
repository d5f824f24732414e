//! Device geolocation seam.

use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

use crate::{config::GeolocationConfig, error::LocationError, model::Coordinates};

/// Options handed to a single position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeolocationOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl From<&GeolocationConfig> for GeolocationOptions {
    fn from(cfg: &GeolocationConfig) -> Self {
        Self {
            high_accuracy: cfg.high_accuracy,
            timeout: Duration::from_secs(cfg.device_timeout_secs),
            maximum_age: Duration::from_secs(cfg.maximum_age_secs),
        }
    }
}

impl Default for GeolocationOptions {
    fn default() -> Self {
        Self::from(&GeolocationConfig::default())
    }
}

/// One-shot position source.
#[async_trait]
pub trait DeviceLocator: Send + Sync + Debug {
    async fn current_position(
        &self,
        options: &GeolocationOptions,
    ) -> Result<Coordinates, LocationError>;
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct StaticLocator {
    position: Coordinates,
}

impl StaticLocator {
    pub fn new(position: Coordinates) -> Self {
        Self { position }
    }
}

#[async_trait]
impl DeviceLocator for StaticLocator {
    async fn current_position(
        &self,
        _options: &GeolocationOptions,
    ) -> Result<Coordinates, LocationError> {
        Ok(self.position)
    }
}

/// A device without any position source.
#[derive(Debug, Clone, Copy)]
pub struct UnavailableLocator {
    error: LocationError,
}

impl UnavailableLocator {
    pub fn new(error: LocationError) -> Self {
        Self { error }
    }
}

impl Default for UnavailableLocator {
    fn default() -> Self {
        Self::new(LocationError::Unsupported)
    }
}

#[async_trait]
impl DeviceLocator for UnavailableLocator {
    async fn current_position(
        &self,
        _options: &GeolocationOptions,
    ) -> Result<Coordinates, LocationError> {
        Err(self.error)
    }
}

/// The static locator when a fixed position is configured, otherwise an
/// unavailable one.
pub fn locator_from_config(cfg: &GeolocationConfig) -> Box<dyn DeviceLocator> {
    match (cfg.latitude, cfg.longitude) {
        (Some(lat), Some(lon)) => match Coordinates::new(lat, lon) {
            Ok(position) => Box::new(StaticLocator::new(position)),
            Err(e) => {
                tracing::warn!(error = %e, "configured position is invalid, ignoring it");
                Box::new(UnavailableLocator::new(LocationError::PositionUnavailable))
            }
        },
        _ => Box::new(UnavailableLocator::default()),
    }
}
