use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::provider::ProviderId;

/// Environment variable that overrides the stored OpenWeather API key.
pub const API_KEY_ENV: &str = "SKYCAST_OPENWEATHER_API_KEY";

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Upstream base URLs. Overridable so tests and self-hosted relays can
/// stand in for the public services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub openweather: String,
    pub openweather_geo: String,
    /// Path under `openweather` for the forecast call. `onecall` answers with
    /// daily aggregates; `forecast` answers with 3-hour steps.
    pub forecast_path: String,
    pub openmeteo: String,
    pub ip_lookup: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            openweather: "https://api.openweathermap.org/data/2.5".to_string(),
            openweather_geo: "https://api.openweathermap.org/geo/1.0".to_string(),
            forecast_path: "onecall".to_string(),
            openmeteo: "https://api.open-meteo.com/v1".to_string(),
            ip_lookup: "https://ipapi.co".to_string(),
        }
    }
}

impl Endpoints {
    /// Every endpoint rooted at `base`, e.g. a mock server URI.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            openweather: format!("{base}/data/2.5"),
            openweather_geo: format!("{base}/geo/1.0"),
            forecast_path: "onecall".to_string(),
            openmeteo: format!("{base}/v1"),
            ip_lookup: base.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    /// Timeout handed to the device locator itself.
    pub device_timeout_secs: u64,
    /// Controller-level ceiling; must be shorter than the device timeout so
    /// the controller pre-empts a hanging request.
    pub controller_timeout_secs: u64,
    pub maximum_age_secs: u64,
    pub high_accuracy: bool,
    /// Fixed position reported by the static device locator, if any.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            device_timeout_secs: 8,
            controller_timeout_secs: 6,
            maximum_age_secs: 60,
            high_accuracy: false,
            latitude: None,
            longitude: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    pub debounce_ms: u64,
    pub limit: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            limit: 7,
        }
    }
}

fn default_http_timeout_secs() -> u64 {
    10
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Example TOML:
    /// [providers.openweather]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub endpoints: Endpoints,

    #[serde(default)]
    pub geolocation: GeolocationConfig,

    #[serde(default)]
    pub suggestions: SuggestionConfig,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Where preferences and credentials are kept. Defaults to the
    /// platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            endpoints: Endpoints::default(),
            geolocation: GeolocationConfig::default(),
            suggestions: SuggestionConfig::default(),
            http_timeout_secs: default_http_timeout_secs(),
            data_dir: None,
        }
    }
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(contents)?;
        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "skycast", "skycast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory for durable preference and credential storage.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("storage")),
        }
    }

    /// Set/replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .insert(provider_id.as_str().to_string(), ProviderConfig { api_key });
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers
            .get(provider_id.as_str())
            .map(|cfg| cfg.api_key.as_str())
            .filter(|key| !key.trim().is_empty())
    }

    /// Stored key, overridden by a non-empty `SKYCAST_OPENWEATHER_API_KEY`.
    pub fn resolved_api_key(&self, provider_id: ProviderId) -> Option<String> {
        let from_env = match provider_id {
            ProviderId::OpenWeather => std::env::var(API_KEY_ENV).ok(),
            ProviderId::OpenMeteo => None,
        };
        self.resolve_api_key_with(provider_id, from_env)
    }

    fn resolve_api_key_with(
        &self,
        provider_id: ProviderId,
        from_env: Option<String>,
    ) -> Option<String> {
        from_env
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .or_else(|| self.provider_api_key(provider_id).map(str::to_owned))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Problems that would make the session misbehave.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let geo = &self.geolocation;

        if geo.controller_timeout_secs >= geo.device_timeout_secs {
            problems.push(format!(
                "geolocation.controller_timeout_secs ({}) must be shorter than geolocation.device_timeout_secs ({})",
                geo.controller_timeout_secs, geo.device_timeout_secs
            ));
        }
        if geo.latitude.is_some() != geo.longitude.is_some() {
            problems.push(
                "geolocation.latitude and geolocation.longitude must be set together".to_string(),
            );
        }
        if self.suggestions.limit == 0 {
            problems.push("suggestions.limit must be at least 1".to_string());
        }
        if self.http_timeout_secs == 0 {
            problems.push("http_timeout_secs must be at least 1".to_string());
        }

        problems
    }
}
