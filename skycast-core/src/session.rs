//! Session controller: drives lookups and owns what the presentation layer shows.

use chrono::{DateTime, Utc};
use std::{fmt, sync::Arc, time::Duration};

use crate::{
    Config,
    display::{ThemeState, last_updated_label},
    error::{LocationError, WeatherError},
    identity::Identity,
    location::{DeviceLocator, GeolocationOptions},
    model::{CitySuggestion, Coordinates, Forecast, UnitSystem, WeatherSnapshot},
    preferences::{PreferenceStore, Scope, WeatherProfile},
    provider::WeatherProvider,
};

mod suggest;

pub use suggest::SuggestionDebouncer;

/// Guidance shown when no location could be determined.
pub const MANUAL_SEARCH_GUIDANCE: &str =
    "We couldn't determine your location. Please search for a city manually.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed { message: String },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Loading => f.write_str("loading"),
            SessionState::Loaded => f.write_str("loaded"),
            SessionState::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// What the currently shown data was looked up by.
#[derive(Debug, Clone, PartialEq)]
pub enum LastQuery {
    City(String),
    Coordinates(Coordinates),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub geolocation: GeolocationOptions,
    /// Must be shorter than `geolocation.timeout` to pre-empt a hanging device.
    pub controller_timeout: Duration,
    pub suggestion_limit: usize,
    pub suggestion_debounce: Duration,
}

impl From<&Config> for SessionOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            geolocation: GeolocationOptions::from(&cfg.geolocation),
            controller_timeout: Duration::from_secs(cfg.geolocation.controller_timeout_secs),
            suggestion_limit: cfg.suggestions.limit,
            suggestion_debounce: Duration::from_millis(cfg.suggestions.debounce_ms),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

type Loaded = (WeatherSnapshot, Forecast);

#[derive(Debug)]
pub struct WeatherSession {
    provider: Arc<dyn WeatherProvider>,
    locator: Arc<dyn DeviceLocator>,
    store: Arc<PreferenceStore>,
    identity: Identity,
    options: SessionOptions,

    state: SessionState,
    snapshot: Option<WeatherSnapshot>,
    forecast: Option<Forecast>,
    last_query: Option<LastQuery>,
    last_updated: Option<DateTime<Utc>>,
    location_guidance: Option<String>,
    notices: Vec<String>,
}

impl WeatherSession {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        locator: Arc<dyn DeviceLocator>,
        store: Arc<PreferenceStore>,
        identity: Identity,
        options: SessionOptions,
    ) -> Self {
        Self {
            provider,
            locator,
            store,
            identity,
            options,
            state: SessionState::Idle,
            snapshot: None,
            forecast: None,
            last_query: None,
            last_updated: None,
            location_guidance: None,
            notices: Vec::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> Option<&WeatherSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn forecast(&self) -> Option<&Forecast> {
        self.forecast.as_ref()
    }

    pub fn last_query(&self) -> Option<&LastQuery> {
        self.last_query.as_ref()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn last_updated_label(&self, now: DateTime<Utc>) -> Option<String> {
        self.last_updated.map(|at| last_updated_label(at, now))
    }

    /// Persistent guidance after a failed location resolution.
    pub fn location_guidance(&self) -> Option<&str> {
        self.location_guidance.as_deref()
    }

    /// Pending user-facing notices, oldest first.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn scope(&self) -> Scope {
        self.identity.scope()
    }

    pub fn store(&self) -> &PreferenceStore {
        &self.store
    }

    pub fn profile(&self) -> WeatherProfile {
        self.store.profile(&self.scope())
    }

    pub fn unit(&self) -> UnitSystem {
        self.profile().unit
    }

    /// Switch whose preferences apply. Shown data is kept; nothing is merged
    /// between scopes.
    pub fn set_identity(&mut self, identity: Identity) {
        tracing::debug!(from = %self.identity, to = %identity, "identity changed");
        self.identity = identity;
    }

    pub fn theme_state(&self, system_prefers_dark: bool) -> ThemeState {
        let condition = self.snapshot.as_ref().map(|s| s.condition.as_str());
        ThemeState::resolve(self.profile().theme, system_prefers_dark, condition)
    }

    pub fn suggester(&self) -> SuggestionDebouncer {
        SuggestionDebouncer::new(
            self.provider.clone(),
            self.options.suggestion_debounce,
            self.options.suggestion_limit,
        )
    }

    /// Load the profile's default city if nothing has been loaded yet.
    /// Returns whether a lookup was started.
    pub async fn load_default(&mut self) -> Result<bool, WeatherError> {
        if self.state != SessionState::Idle || self.snapshot.is_some() {
            return Ok(false);
        }
        let Some(city) = self.profile().default_city else {
            return Ok(false);
        };

        self.begin();
        let result = self.fetch_city(&city, self.unit()).await;
        self.finish(result, LastQuery::City(city), None)?;
        Ok(true)
    }

    /// Manual city search. Recorded in the search history on success.
    pub async fn search(&mut self, city: &str) -> Result<(), WeatherError> {
        let city = city.trim().to_string();
        self.begin();
        let result = self.fetch_city(&city, self.unit()).await;
        self.finish(result, LastQuery::City(city.clone()), Some(city))
    }

    /// Load an autocomplete pick by its coordinates.
    pub async fn select_suggestion(
        &mut self,
        suggestion: &CitySuggestion,
    ) -> Result<(), WeatherError> {
        self.begin();
        let result = self
            .fetch_coordinates(suggestion.coordinates, self.unit())
            .await;
        self.finish(
            result,
            LastQuery::Coordinates(suggestion.coordinates),
            Some(suggestion.name.clone()),
        )
    }

    /// Device position first, then one IP-based attempt. At most one
    /// notice is raised however the attempt ends.
    pub async fn use_current_location(&mut self) -> Result<(), WeatherError> {
        self.begin();
        self.location_guidance = None;

        let located = tokio::time::timeout(
            self.options.controller_timeout,
            self.locator.current_position(&self.options.geolocation),
        )
        .await
        .unwrap_or(Err(LocationError::Timeout));

        match located {
            Ok(coords) => {
                let result = self.fetch_coordinates(coords, self.unit()).await;
                self.finish(result, LastQuery::Coordinates(coords), None)
            }
            Err(geo_err) => self.fall_back_to_ip(geo_err).await,
        }
    }

    async fn fall_back_to_ip(&mut self, geo_err: LocationError) -> Result<(), WeatherError> {
        tracing::info!(
            error = %geo_err,
            detail = geo_err.user_message(),
            "device location failed, trying IP lookup"
        );

        match self.provider.locate_by_ip().await {
            Ok(place) => {
                tracing::info!(city = %place.city, "located by IP");
                let result = self.fetch_city(&place.city, self.unit()).await;
                self.finish(result, LastQuery::City(place.city), None)
            }
            Err(ip_err) => {
                tracing::warn!(error = %ip_err, "IP lookup failed");
                self.location_guidance = Some(MANUAL_SEARCH_GUIDANCE.to_string());
                self.fail(MANUAL_SEARCH_GUIDANCE.to_string());
                Err(ip_err)
            }
        }
    }

    /// Persist the unit and refetch whatever is shown under it.
    pub async fn change_unit(&mut self, unit: UnitSystem) -> Result<(), WeatherError> {
        let scope = self.scope();
        let previous = self.store.profile(&scope).unit;
        if previous == unit {
            return Ok(());
        }

        self.store.update_profile(&scope, |p| p.unit = unit);
        self.collect_store_notice();

        self.refresh().await
    }

    pub async fn toggle_unit(&mut self) -> Result<(), WeatherError> {
        let next = self.unit().toggled();
        self.change_unit(next).await
    }

    /// Refetch the last query under the current unit. Not recorded in history.
    pub async fn refresh(&mut self) -> Result<(), WeatherError> {
        let Some(query) = self.last_query.clone() else {
            return Ok(());
        };

        let unit = self.unit();
        self.begin();
        let result = match &query {
            LastQuery::City(city) => self.fetch_city(city, unit).await,
            LastQuery::Coordinates(coords) => self.fetch_coordinates(*coords, unit).await,
        };
        self.finish(result, query, None)
    }

    fn begin(&mut self) {
        self.state = SessionState::Loading;
    }

    /// City lookups need the coordinates from current conditions before the
    /// forecast can be requested.
    async fn fetch_city(&self, city: &str, unit: UnitSystem) -> Result<Loaded, WeatherError> {
        let snapshot = self.provider.current_by_city(city, unit).await?;
        let coords = snapshot.coordinates.ok_or_else(|| {
            WeatherError::UnexpectedFormat("current conditions carried no coordinates".into())
        })?;
        let forecast = self.provider.forecast(coords, unit).await?;
        Ok((snapshot, forecast))
    }

    async fn fetch_coordinates(
        &self,
        coords: Coordinates,
        unit: UnitSystem,
    ) -> Result<Loaded, WeatherError> {
        let (current, forecast) = tokio::join!(
            self.provider.current_by_coordinates(coords, unit),
            self.provider.forecast(coords, unit),
        );
        Ok((current?, forecast?))
    }

    fn finish(
        &mut self,
        result: Result<Loaded, WeatherError>,
        query: LastQuery,
        history_entry: Option<String>,
    ) -> Result<(), WeatherError> {
        match result {
            Ok((snapshot, forecast)) => {
                tracing::info!(
                    city = %snapshot.city,
                    unit = %snapshot.unit,
                    provider = %forecast.provider,
                    days = forecast.days.len(),
                    "weather loaded"
                );
                self.snapshot = Some(snapshot);
                self.forecast = Some(forecast);
                self.last_query = Some(query);
                self.last_updated = Some(Utc::now());
                self.location_guidance = None;
                self.state = SessionState::Loaded;

                if let Some(entry) = history_entry {
                    self.store.add_to_history(&self.scope(), &entry);
                    self.collect_store_notice();
                }
                Ok(())
            }
            Err(e) => {
                match &e {
                    WeatherError::Auth { .. } | WeatherError::UnexpectedFormat(_) => {
                        tracing::error!(error = %e, "weather lookup failed")
                    }
                    _ => tracing::warn!(error = %e, "weather lookup failed"),
                }
                self.fail(e.user_message().to_string());
                Err(e)
            }
        }
    }

    /// Previously loaded data stays visible.
    fn fail(&mut self, message: String) {
        self.notices.push(message.clone());
        self.state = SessionState::Failed { message };
    }

    fn collect_store_notice(&mut self) {
        if let Some(notice) = self.store.take_degraded_notice() {
            self.notices.push(notice.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        location::{StaticLocator, UnavailableLocator},
        storage::MemoryStorage,
        testing::{Call, FakeProvider, HangingLocator, PARIS},
    };

    struct Harness {
        fake: Arc<FakeProvider>,
        storage: Arc<MemoryStorage>,
        store: Arc<PreferenceStore>,
    }

    impl Harness {
        fn new(fake: FakeProvider) -> Self {
            let storage = Arc::new(MemoryStorage::new());
            let store = Arc::new(PreferenceStore::new(storage.clone()));
            Self {
                fake: Arc::new(fake),
                storage,
                store,
            }
        }

        fn session(&self, locator: Arc<dyn DeviceLocator>) -> WeatherSession {
            WeatherSession::new(
                self.fake.clone(),
                locator,
                self.store.clone(),
                Identity::Guest,
                SessionOptions::default(),
            )
        }
    }

    fn denied() -> Arc<dyn DeviceLocator> {
        Arc::new(UnavailableLocator::new(LocationError::PermissionDenied))
    }

    #[tokio::test]
    async fn search_loads_and_records_history() {
        let h = Harness::new(FakeProvider::new());
        let mut session = h.session(denied());
        assert_eq!(session.state(), &SessionState::Idle);

        session.search("  Paris ").await.unwrap();

        assert_eq!(session.state(), &SessionState::Loaded);
        assert_eq!(session.snapshot().unwrap().city, "Paris");
        assert_eq!(session.forecast().unwrap().days.len(), 3);
        assert!(session.last_updated().is_some());
        assert_eq!(h.store.history(&Scope::Guest), vec!["Paris".to_string()]);
        assert_eq!(
            h.fake.calls(),
            vec![
                Call::CurrentByCity("Paris".into(), UnitSystem::Metric),
                Call::Forecast(PARIS, UnitSystem::Metric),
            ]
        );
    }

    #[tokio::test]
    async fn failure_keeps_last_good_data() {
        let h = Harness::new(FakeProvider::new());
        let mut session = h.session(denied());
        session.search("Paris").await.unwrap();

        h.fake
            .set_city_error(Some(WeatherError::NotFound("city not found".into())));
        let err = session.search("Atlantis").await.unwrap_err();

        assert!(matches!(err, WeatherError::NotFound(_)));
        assert!(matches!(session.state(), SessionState::Failed { .. }));
        assert_eq!(session.snapshot().unwrap().city, "Paris");
        assert_eq!(session.take_notices(), vec![err.user_message().to_string()]);
        assert_eq!(h.store.history(&Scope::Guest), vec!["Paris".to_string()]);
    }

    #[tokio::test]
    async fn unit_toggle_refetches_instead_of_converting() {
        let h = Harness::new(FakeProvider::new());
        let mut session = h.session(denied());
        session.search("Paris").await.unwrap();

        session.toggle_unit().await.unwrap();

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.unit, UnitSystem::Imperial);
        assert_eq!(snapshot.temperature, 64.4);
        assert_eq!(h.store.profile(&Scope::Guest).unit, UnitSystem::Imperial);

        let city_calls: Vec<_> = h
            .fake
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::CurrentByCity(..)))
            .collect();
        assert_eq!(
            city_calls,
            vec![
                Call::CurrentByCity("Paris".into(), UnitSystem::Metric),
                Call::CurrentByCity("Paris".into(), UnitSystem::Imperial),
            ]
        );
        // Refetches are not searches.
        assert_eq!(h.store.history(&Scope::Guest).len(), 1);
    }

    #[tokio::test]
    async fn unchanged_unit_does_nothing() {
        let h = Harness::new(FakeProvider::new());
        let mut session = h.session(denied());
        session.search("Paris").await.unwrap();
        let before = h.fake.calls().len();

        session.change_unit(UnitSystem::Metric).await.unwrap();
        assert_eq!(h.fake.calls().len(), before);
    }

    #[tokio::test]
    async fn suggestion_selection_uses_coordinates() {
        let h = Harness::new(FakeProvider::new());
        let mut session = h.session(denied());
        let pick = CitySuggestion {
            id: "1,2,0".into(),
            name: "Springfield".into(),
            state: Some("Illinois".into()),
            country: "US".into(),
            coordinates: Coordinates { lat: 39.8, lon: -89.6 },
        };

        session.select_suggestion(&pick).await.unwrap();

        assert_eq!(session.state(), &SessionState::Loaded);
        assert_eq!(
            session.last_query(),
            Some(&LastQuery::Coordinates(pick.coordinates))
        );
        assert_eq!(h.store.history(&Scope::Guest), vec!["Springfield".to_string()]);
        assert!(!h.fake.calls().iter().any(|c| matches!(c, Call::CurrentByCity(..))));
    }

    #[tokio::test]
    async fn device_position_is_used_when_available() {
        let h = Harness::new(FakeProvider::new());
        let here = Coordinates { lat: 59.91, lon: 10.75 };
        let mut session = h.session(Arc::new(StaticLocator::new(here)));

        session.use_current_location().await.unwrap();

        assert_eq!(session.state(), &SessionState::Loaded);
        assert!(h.fake.calls().contains(&Call::CurrentByCoordinates(here, UnitSystem::Metric)));
        assert!(!h.fake.calls().contains(&Call::LocateByIp));
        assert!(h.store.history(&Scope::Guest).is_empty());
    }

    #[tokio::test]
    async fn denied_location_falls_back_to_ip_without_notices() {
        let h = Harness::new(FakeProvider::new());
        let mut session = h.session(denied());

        session.use_current_location().await.unwrap();

        assert_eq!(session.state(), &SessionState::Loaded);
        assert_eq!(session.snapshot().unwrap().city, "Lyon");
        assert!(session.take_notices().is_empty());
        assert_eq!(session.location_guidance(), None);
        assert_eq!(
            h.fake.calls()[..2],
            [
                Call::LocateByIp,
                Call::CurrentByCity("Lyon".into(), UnitSystem::Metric)
            ]
        );
    }

    #[tokio::test]
    async fn failed_fallback_raises_exactly_one_notice() {
        let h = Harness::new(
            FakeProvider::new().with_ip_error(WeatherError::Network("offline".into())),
        );
        let mut session = h.session(denied());

        assert!(session.use_current_location().await.is_err());

        assert_eq!(
            session.state(),
            &SessionState::Failed {
                message: MANUAL_SEARCH_GUIDANCE.into()
            }
        );
        assert_eq!(session.take_notices().len(), 1);
        assert_eq!(session.location_guidance(), Some(MANUAL_SEARCH_GUIDANCE));

        let ip_calls = h.fake.calls().iter().filter(|c| **c == Call::LocateByIp).count();
        assert_eq!(ip_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_device_is_preempted_by_controller_timeout() {
        let h = Harness::new(FakeProvider::new());
        let mut session = h.session(Arc::new(HangingLocator));
        let start = tokio::time::Instant::now();

        session.use_current_location().await.unwrap();

        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(6));
        assert!(waited < Duration::from_secs(8));
        assert_eq!(session.snapshot().unwrap().city, "Lyon");
    }

    #[tokio::test]
    async fn default_city_loads_once_without_history() {
        let h = Harness::new(FakeProvider::new());
        h.store
            .update_profile(&Scope::Guest, |p| p.default_city = Some("Rome".into()));
        let mut session = h.session(denied());

        assert!(session.load_default().await.unwrap());
        assert!(!session.load_default().await.unwrap());
        assert_eq!(session.snapshot().unwrap().city, "Rome");
        assert!(h.store.history(&Scope::Guest).is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_a_single_notice() {
        let h = Harness::new(FakeProvider::new());
        h.storage.set_writes_disabled(true);
        let mut session = h.session(denied());

        session.search("Paris").await.unwrap();
        session.search("Berlin").await.unwrap();

        assert_eq!(session.state(), &SessionState::Loaded);
        assert_eq!(
            session.take_notices(),
            vec![crate::preferences::DEGRADED_NOTICE.to_string()]
        );
        assert_eq!(h.store.history(&Scope::Guest).len(), 2);
    }

    #[tokio::test]
    async fn identity_switch_changes_scope() {
        let h = Harness::new(FakeProvider::new());
        let mut session = h.session(denied());
        session.set_identity(Identity::User {
            id: "u-1".into(),
            email: "ann@example.com".into(),
        });

        session.search("Oslo").await.unwrap();

        assert!(h.store.history(&Scope::Guest).is_empty());
        assert_eq!(
            h.store.history(&Scope::User("u-1".into())),
            vec!["Oslo".to_string()]
        );
    }

    #[tokio::test]
    async fn forecast_failure_after_current_conditions_fails_the_search() {
        let h = Harness::new(FakeProvider::new());
        let mut session = h.session(denied());
        session.search("Paris").await.unwrap();
        let updated = session.last_updated();

        h.fake.set_forecast_error(Some(WeatherError::Network("offline".into())));
        let err = session.search("Berlin").await.unwrap_err();

        assert!(matches!(err, WeatherError::Network(_)));
        assert_eq!(
            session.state(),
            &SessionState::Failed {
                message: err.user_message().to_string()
            }
        );
        assert!(
            h.fake
                .calls()
                .contains(&Call::CurrentByCity("Berlin".into(), UnitSystem::Metric))
        );
        assert_eq!(session.snapshot().unwrap().city, "Paris");
        assert_eq!(session.forecast().unwrap().days.len(), 3);
        assert_eq!(session.last_query(), Some(&LastQuery::City("Paris".into())));
        assert_eq!(session.last_updated(), updated);
        assert_eq!(h.store.history(&Scope::Guest), vec!["Paris".to_string()]);
    }

    #[tokio::test]
    async fn forecast_failure_fails_a_suggestion_pick() {
        let h = Harness::new(FakeProvider::new());
        let mut session = h.session(denied());
        session.search("Paris").await.unwrap();

        let pick = CitySuggestion {
            id: "52.52,13.4,0".into(),
            name: "Berlin".into(),
            state: None,
            country: "DE".into(),
            coordinates: Coordinates { lat: 52.52, lon: 13.4 },
        };
        h.fake.set_forecast_error(Some(WeatherError::RateLimited));
        let err = session.select_suggestion(&pick).await.unwrap_err();

        assert_eq!(err, WeatherError::RateLimited);
        assert!(matches!(session.state(), SessionState::Failed { .. }));
        let calls = h.fake.calls();
        assert!(calls.contains(&Call::CurrentByCoordinates(pick.coordinates, UnitSystem::Metric)));
        assert!(calls.contains(&Call::Forecast(pick.coordinates, UnitSystem::Metric)));
        assert_eq!(session.snapshot().unwrap().city, "Paris");
        assert_eq!(session.last_query(), Some(&LastQuery::City("Paris".into())));
        assert_eq!(h.store.history(&Scope::Guest), vec!["Paris".to_string()]);
    }

    #[tokio::test]
    async fn weather_failure_at_a_known_position_is_not_a_location_failure() {
        let h = Harness::new(FakeProvider::new());
        let here = Coordinates { lat: 59.91, lon: 10.75 };
        let mut session = h.session(Arc::new(StaticLocator::new(here)));
        h.fake.set_forecast_error(Some(WeatherError::Network("offline".into())));

        assert!(session.use_current_location().await.is_err());

        assert_eq!(session.location_guidance(), None);
        assert_eq!(
            session.take_notices(),
            vec![WeatherError::Network(String::new()).user_message().to_string()]
        );
        assert!(!h.fake.calls().contains(&Call::LocateByIp));
    }

    #[test]
    fn options_come_from_config() {
        let opts = SessionOptions::default();
        assert!(opts.controller_timeout < opts.geolocation.timeout);
        assert_eq!(opts.suggestion_debounce, Duration::from_millis(250));
        assert_eq!(opts.suggestion_limit, 7);
    }
}
