use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::{
    error::WeatherError,
    model::CitySuggestion,
    provider::{MIN_SUGGESTION_QUERY_CHARS, WeatherProvider},
};

/// Debounced city autocomplete where the most recently issued query wins.
///
/// Every call takes a new generation. A call only reaches the provider if no
/// newer call arrived during the debounce window, and its result is dropped
/// if a newer call arrived while the request was in flight.
#[derive(Debug, Clone)]
pub struct SuggestionDebouncer {
    provider: Arc<dyn WeatherProvider>,
    delay: Duration,
    limit: usize,
    generation: Arc<AtomicU64>,
}

impl SuggestionDebouncer {
    pub fn new(provider: Arc<dyn WeatherProvider>, delay: Duration, limit: usize) -> Self {
        Self {
            provider,
            delay,
            limit,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// `Ok(None)` when a newer query superseded this one.
    pub async fn suggest(&self, query: &str) -> Result<Option<Vec<CitySuggestion>>, WeatherError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if query.trim().chars().count() < MIN_SUGGESTION_QUERY_CHARS {
            return Ok(Some(Vec::new()));
        }

        tokio::time::sleep(self.delay).await;
        if self.is_stale(ticket) {
            tracing::trace!(query, "suggestion query superseded before sending");
            return Ok(None);
        }

        let result = self.provider.suggest_cities(query, self.limit).await;
        if self.is_stale(ticket) {
            tracing::trace!(query, "discarding superseded suggestions");
            return Ok(None);
        }
        result.map(Some)
    }

    /// Drop whatever is pending, e.g. when the input is cleared.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_stale(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != ticket
    }
}
