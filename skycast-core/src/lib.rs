//! Core library for the `skycast` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The weather provider adapter, with forecast fallback and normalization
//! - Identity-scoped preference storage and local accounts
//! - The session controller the presentation layer drives
//!
//! It is used by `skycast-cli`, but can also be reused by other front ends.

pub mod config;
pub mod display;
pub mod error;
pub mod identity;
pub mod location;
pub mod model;
pub mod preferences;
pub mod provider;
pub mod session;
pub mod storage;
pub mod units;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, ProviderConfig};
pub use error::{IdentityError, LocationError, StorageError, WeatherError};
pub use identity::{Identity, IdentityProvider};
pub use model::{
    CitySuggestion, Condition, Coordinates, Forecast, ForecastDay, IpLocation, UnitSystem,
    WeatherSnapshot,
};
pub use preferences::{PreferenceStore, Scope, Theme, WeatherProfile};
pub use provider::{ProviderId, WeatherAdapter, WeatherProvider, adapter_from_config};
pub use session::{SessionOptions, SessionState, WeatherSession};
