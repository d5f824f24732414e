use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::WeatherError;

/// GET `url` with `query`, classify non-success statuses and decode JSON.
///
/// `upstream` names the service in logs; query strings are never logged
/// because they can carry credentials.
pub(crate) async fn get_json<T: DeserializeOwned>(
    http: &Client,
    upstream: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, WeatherError> {
    tracing::debug!(upstream, url, "sending request");

    let res = http.get(url).query(query).send().await.map_err(|e| {
        let e = e.without_url();
        tracing::warn!(upstream, error = %e, "request failed");
        WeatherError::Network(format!("{upstream}: {e}"))
    })?;

    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| WeatherError::Network(format!("{upstream}: failed to read body: {e}")))?;

    if !status.is_success() {
        tracing::warn!(upstream, status = status.as_u16(), "upstream returned error status");
        return Err(WeatherError::from_status(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::warn!(upstream, error = %e, "could not decode response");
        WeatherError::UnexpectedFormat(format!("{upstream}: {e}"))
    })
}
