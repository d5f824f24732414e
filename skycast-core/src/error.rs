//! Error taxonomy for the core library.
//!
//! Every error carries enough context for logs, and exposes `user_message()`
//! for the short, actionable text shown by the presentation layer.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by the weather provider adapter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WeatherError {
    #[error("Location not found: {0}")]
    NotFound(String),

    #[error("Upstream rejected the API credential (status {status})")]
    Auth { status: u16 },

    #[error("Upstream rate limit exceeded")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected upstream response: {0}")]
    UnexpectedFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl WeatherError {
    /// Classify a non-success HTTP status from a weather upstream.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::NOT_FOUND => WeatherError::NotFound(truncate_body(body)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => WeatherError::Auth {
                status: status.as_u16(),
            },
            StatusCode::TOO_MANY_REQUESTS => WeatherError::RateLimited,
            _ => WeatherError::Network(format!(
                "status {}: {}",
                status.as_u16(),
                truncate_body(body)
            )),
        }
    }

    /// Whether a failed primary forecast call may be retried against the
    /// secondary forecast source.
    pub fn allows_forecast_fallback(&self) -> bool {
        !matches!(self, WeatherError::InvalidInput(_))
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::NotFound(_) => {
                "City not found. Please check the spelling and try again."
            }
            WeatherError::Auth { .. } => {
                "Missing or invalid OpenWeather API key. Run `skycast configure` to set one."
            }
            WeatherError::RateLimited => "Too many requests. Please try again later.",
            WeatherError::Network(_) => {
                "Unable to reach the weather service. Check your internet connection and try again."
            }
            WeatherError::UnexpectedFormat(_) => "Failed to fetch weather data.",
            WeatherError::InvalidInput(_) => "Please enter a valid city name or location.",
        }
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_decode() {
            WeatherError::UnexpectedFormat(err.to_string())
        } else if let Some(status) = err.status() {
            WeatherError::from_status(status, "")
        } else {
            WeatherError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for WeatherError {
    fn from(err: serde_json::Error) -> Self {
        WeatherError::UnexpectedFormat(err.to_string())
    }
}

/// Errors raised by a device geolocation source.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location unavailable")]
    PositionUnavailable,
    #[error("Location request timed out")]
    Timeout,
    #[error("Geolocation is not supported on this device")]
    Unsupported,
}

impl LocationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationError::PermissionDenied => {
                "Failed to get your location. Please allow location access or search manually."
            }
            LocationError::PositionUnavailable => {
                "Failed to get your location. Your position is unavailable. Please try again or search manually."
            }
            LocationError::Timeout => {
                "Failed to get your location. Please try again or search manually."
            }
            LocationError::Unsupported => {
                "Geolocation is not supported on this device. Please search manually."
            }
        }
    }
}

/// Failure of the durable key-value storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage is disabled")]
    Disabled,
}

/// Errors raised by the local identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("{0}")]
    Validation(String),

    #[error("An account with this email already exists.")]
    DuplicateAccount,

    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("Credential storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

impl IdentityError {
    pub fn user_message(&self) -> String {
        match self {
            IdentityError::Validation(msg) => msg.clone(),
            IdentityError::DuplicateAccount => {
                "An account with this email already exists.".to_string()
            }
            IdentityError::InvalidCredentials => "Invalid email or password.".to_string(),
            IdentityError::Storage(_) | IdentityError::Hashing(_) => {
                "Could not save your account on this device. Please try again.".to_string()
            }
        }
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
