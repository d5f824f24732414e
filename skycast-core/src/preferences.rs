//! Identity-scoped storage for the profile, favorites and search history.
//!
//! Reads never fail: absent or corrupt values come back as defaults. Writes
//! never fail either; when the backing storage refuses a write the value is
//! kept in memory for the rest of the process and the caller is told the
//! change is session-only. A read-modify-write whose read failed is kept in
//! memory too, and never replaces the stored value it could not see.

use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::storage::KeyValueStorage;

pub mod favorites;
pub mod history;
pub mod profile;

pub use favorites::{FavoriteCity, FavoriteInput, MAX_FAVORITES, favorite_id};
pub use history::MAX_HISTORY;
pub use profile::{Theme, WeatherProfile};

const KEY_PREFIX: &str = "skycast";
const EVENT_CAPACITY: usize = 64;

pub const DEGRADED_NOTICE: &str =
    "Your changes could not be saved on this device and will only last for this session.";

/// Whose data a read or write applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Guest,
    User(String),
}

impl Scope {
    fn marker(&self) -> &str {
        match self {
            Scope::Guest => "guest",
            Scope::User(id) => id,
        }
    }

    pub fn key(&self, kind: RecordKind) -> String {
        format!("{KEY_PREFIX}:{}:{}", kind.as_str(), self.marker())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Guest => f.write_str("guest"),
            Scope::User(id) => write!(f, "user {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Profile,
    Favorites,
    History,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::Profile,
        RecordKind::Favorites,
        RecordKind::History,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Profile => "profile",
            RecordKind::Favorites => "favorites",
            RecordKind::History => "history",
        }
    }
}

/// Sent to subscribers after every applied change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: String,
    pub kind: RecordKind,
}

/// Where a change ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    Durable,
    /// Storage refused the write; the change lives in memory only.
    SessionOnly,
    /// Nothing needed writing.
    Unchanged,
}

/// Result of a mutation together with where it was persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Saved<T> {
    pub value: T,
    pub persistence: Persistence,
}

impl<T> Saved<T> {
    pub fn is_session_only(&self) -> bool {
        self.persistence == Persistence::SessionOnly
    }
}

/// A value that lives in memory instead of storage.
#[derive(Debug, Clone)]
struct Held {
    raw: String,
    /// Built on top of a stored value that could not be read. Never written
    /// back until a full replacement succeeds.
    detached: bool,
}

pub struct PreferenceStore {
    storage: Arc<dyn KeyValueStorage>,
    /// Values whose durable write failed or was skipped, by key.
    overlay: Mutex<HashMap<String, Held>>,
    degraded: AtomicBool,
    notice_taken: AtomicBool,
    events: broadcast::Sender<StoreEvent>,
}

impl fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("overlay_keys", &self.overlay.lock().len())
            .field("degraded", &self.degraded.load(Ordering::SeqCst))
            .finish()
    }
}

impl PreferenceStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            storage,
            overlay: Mutex::new(HashMap::new()),
            degraded: AtomicBool::new(false),
            notice_taken: AtomicBool::new(false),
            events,
        }
    }

    /// Change notifications for `scope` only.
    pub fn subscribe(&self, scope: &Scope) -> ScopedReceiver {
        ScopedReceiver {
            keys: RecordKind::ALL.map(|kind| scope.key(kind)),
            rx: self.events.subscribe(),
        }
    }

    /// Whether any write has fallen back to memory.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// The session-only notice, returned once after the first failed write.
    pub fn take_degraded_notice(&self) -> Option<&'static str> {
        if self.is_degraded() && !self.notice_taken.swap(true, Ordering::SeqCst) {
            Some(DEGRADED_NOTICE)
        } else {
            None
        }
    }

    pub fn profile(&self, scope: &Scope) -> WeatherProfile {
        self.read(scope, RecordKind::Profile)
    }

    pub fn write_profile(&self, scope: &Scope, profile: &WeatherProfile) -> Persistence {
        self.write(scope, RecordKind::Profile, profile)
    }

    /// Read-modify-write of the whole profile.
    pub fn update_profile(
        &self,
        scope: &Scope,
        change: impl FnOnce(&mut WeatherProfile),
    ) -> Saved<WeatherProfile> {
        let (mut profile, known) = self.read_for_update(scope, RecordKind::Profile);
        change(&mut profile);
        let persistence = self.commit(scope, RecordKind::Profile, &profile, known);
        Saved {
            value: profile,
            persistence,
        }
    }

    pub fn reset_profile(&self, scope: &Scope) -> Persistence {
        self.write_profile(scope, &WeatherProfile::default())
    }

    pub fn favorites(&self, scope: &Scope) -> Vec<FavoriteCity> {
        self.read(scope, RecordKind::Favorites)
    }

    /// Returns whether a new entry was added; re-adding is a no-op.
    pub fn add_favorite(&self, scope: &Scope, input: &FavoriteInput) -> Saved<bool> {
        let (mut list, known) = self.read_for_update(scope, RecordKind::Favorites);
        let added_at = chrono::Utc::now().timestamp_millis();
        if !favorites::insert(&mut list, input, added_at) {
            return unchanged(false);
        }
        Saved {
            value: true,
            persistence: self.commit(scope, RecordKind::Favorites, &list, known),
        }
    }

    /// Returns whether an entry was removed.
    pub fn remove_favorite(&self, scope: &Scope, id: &str) -> Saved<bool> {
        let (mut list, known): (Vec<FavoriteCity>, _) =
            self.read_for_update(scope, RecordKind::Favorites);
        if !favorites::remove(&mut list, id) {
            return unchanged(false);
        }
        Saved {
            value: true,
            persistence: self.commit(scope, RecordKind::Favorites, &list, known),
        }
    }

    /// Returns whether the city is a favorite afterwards.
    pub fn toggle_favorite(&self, scope: &Scope, input: &FavoriteInput) -> Saved<bool> {
        let id = input.id();
        if self.favorites(scope).iter().any(|f| f.id == id) {
            let removed = self.remove_favorite(scope, &id);
            Saved {
                value: false,
                persistence: removed.persistence,
            }
        } else {
            self.add_favorite(scope, input)
        }
    }

    pub fn is_favorite(&self, scope: &Scope, input: &FavoriteInput) -> bool {
        let id = input.id();
        self.favorites(scope).iter().any(|f| f.id == id)
    }

    pub fn clear_favorites(&self, scope: &Scope) -> Persistence {
        self.write::<Vec<FavoriteCity>>(scope, RecordKind::Favorites, &Vec::new())
    }

    pub fn history(&self, scope: &Scope) -> Vec<String> {
        self.read(scope, RecordKind::History)
    }

    /// Returns whether the history changed.
    pub fn add_to_history(&self, scope: &Scope, entry: &str) -> Saved<bool> {
        let (mut list, known): (Vec<String>, _) = self.read_for_update(scope, RecordKind::History);
        if !history::push(&mut list, entry) {
            return unchanged(false);
        }
        Saved {
            value: true,
            persistence: self.commit(scope, RecordKind::History, &list, known),
        }
    }

    pub fn clear_history(&self, scope: &Scope) -> Persistence {
        self.write::<Vec<String>>(scope, RecordKind::History, &Vec::new())
    }

    fn read<T>(&self, scope: &Scope, kind: RecordKind) -> T
    where
        T: DeserializeOwned + Default,
    {
        self.read_for_update(scope, kind).0
    }

    /// The current value and whether it reflects what storage holds. `false`
    /// means storage could not be read, so the result must not be written
    /// back over the stored value.
    fn read_for_update<T>(&self, scope: &Scope, kind: RecordKind) -> (T, bool)
    where
        T: DeserializeOwned + Default,
    {
        let key = scope.key(kind);

        let held = self.overlay.lock().get(&key).cloned();
        if let Some(held) = held {
            return (decode(&key, &held.raw), !held.detached);
        }

        match self.storage.get(&key) {
            Ok(Some(raw)) => (decode(&key, &raw), true),
            Ok(None) => (T::default(), true),
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "could not read stored value, using defaults"
                );
                (T::default(), false)
            }
        }
    }

    /// Full replacement of the stored value.
    fn write<T: Serialize>(&self, scope: &Scope, kind: RecordKind, value: &T) -> Persistence {
        self.commit(scope, kind, value, true)
    }

    fn commit<T: Serialize>(
        &self,
        scope: &Scope,
        kind: RecordKind,
        value: &T,
        known: bool,
    ) -> Persistence {
        let key = scope.key(kind);

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "could not serialize value");
                return Persistence::Unchanged;
            }
        };

        let persistence = if !known {
            tracing::warn!(
                key = %key,
                "stored value unreadable, keeping change for this session only"
            );
            self.hold(&key, raw, true);
            Persistence::SessionOnly
        } else {
            match self.storage.set(&key, &raw) {
                Ok(()) => {
                    self.overlay.lock().remove(&key);
                    Persistence::Durable
                }
                Err(e) => {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        "write failed, keeping change for this session only"
                    );
                    self.hold(&key, raw, false);
                    Persistence::SessionOnly
                }
            }
        };

        // No receivers is fine.
        let _ = self.events.send(StoreEvent { key, kind });
        persistence
    }

    fn hold(&self, key: &str, raw: String, detached: bool) {
        self.overlay
            .lock()
            .insert(key.to_string(), Held { raw, detached });
        self.degraded.store(true, Ordering::SeqCst);
    }
}

fn decode<T>(key: &str, raw: &str) -> T
where
    T: DeserializeOwned + Default,
{
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(key = %key, error = %e, "stored value is corrupt, using defaults");
        T::default()
    })
}

fn unchanged<T>(value: T) -> Saved<T> {
    Saved {
        value,
        persistence: Persistence::Unchanged,
    }
}

/// Receiver that skips events for other scopes.
#[derive(Debug)]
pub struct ScopedReceiver {
    keys: [String; 3],
    rx: broadcast::Receiver<StoreEvent>,
}

impl ScopedReceiver {
    fn matches(&self, event: &StoreEvent) -> bool {
        self.keys.contains(&event.key)
    }

    /// Next event for this scope, or `None` once the store is dropped.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "preference subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-delivered event for this scope, if any.
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::UnitSystem, storage::MemoryStorage};

    fn store() -> (Arc<MemoryStorage>, PreferenceStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = PreferenceStore::new(storage.clone());
        (storage, store)
    }

    #[test]
    fn scope_keys() {
        assert_eq!(Scope::Guest.key(RecordKind::Favorites), "skycast:favorites:guest");
        assert_eq!(
            Scope::User("u-1".into()).key(RecordKind::History),
            "skycast:history:u-1"
        );
    }

    #[test]
    fn profile_roundtrip_merges_over_defaults() {
        let (storage, store) = store();
        let scope = Scope::Guest;

        assert_eq!(store.profile(&scope), WeatherProfile::default());

        let mut profile = WeatherProfile::default();
        profile.unit = UnitSystem::Imperial;
        profile.default_city = Some("Paris".into());
        assert_eq!(store.write_profile(&scope, &profile), Persistence::Durable);
        assert_eq!(store.profile(&scope), profile);

        storage
            .set(&scope.key(RecordKind::Profile), r#"{"theme":"dark"}"#)
            .unwrap();
        let read = store.profile(&scope);
        assert_eq!(read.theme, Theme::Dark);
        assert_eq!(read.unit, UnitSystem::Metric);
    }

    #[test]
    fn corrupt_values_read_as_defaults() {
        let (storage, store) = store();
        let scope = Scope::Guest;
        storage.set(&scope.key(RecordKind::Favorites), "{not json").unwrap();
        storage.set(&scope.key(RecordKind::History), r#"{"a":1}"#).unwrap();

        assert!(store.favorites(&scope).is_empty());
        assert!(store.history(&scope).is_empty());
    }

    #[test]
    fn favorites_are_idempotent_and_keep_added_at() {
        let (_, store) = store();
        let scope = Scope::Guest;
        let paris = FavoriteInput::new("Paris").with_country("FR");

        assert!(store.add_favorite(&scope, &FavoriteInput::new("Oslo")).value);
        assert!(store.add_favorite(&scope, &paris).value);
        let before = store.favorites(&scope);

        let again = store.add_favorite(&scope, &FavoriteInput::new("paris").with_country("fr"));
        assert!(!again.value);
        assert_eq!(again.persistence, Persistence::Unchanged);
        assert_eq!(store.favorites(&scope), before);
        assert_eq!(before[0].id, "paris::fr");
    }

    #[test]
    fn toggle_and_clear_favorites() {
        let (_, store) = store();
        let scope = Scope::Guest;
        let rome = FavoriteInput::new("Rome").with_country("IT");

        assert!(store.toggle_favorite(&scope, &rome).value);
        assert!(store.is_favorite(&scope, &rome));
        assert!(!store.toggle_favorite(&scope, &rome).value);
        assert!(!store.is_favorite(&scope, &rome));

        store.add_favorite(&scope, &rome);
        assert_eq!(store.clear_favorites(&scope), Persistence::Durable);
        assert!(store.favorites(&scope).is_empty());
        assert!(!store.remove_favorite(&scope, "rome::it").value);
    }

    #[test]
    fn history_dedupes_case_insensitively() {
        let (_, store) = store();
        let scope = Scope::Guest;
        store.add_to_history(&scope, "Paris");
        store.add_to_history(&scope, "paris");
        assert_eq!(store.history(&scope), vec!["paris".to_string()]);

        store.clear_history(&scope);
        assert!(store.history(&scope).is_empty());
    }

    #[test]
    fn scopes_are_isolated() {
        let (_, store) = store();
        let user = Scope::User("abc".into());
        store.add_to_history(&Scope::Guest, "Paris");
        assert!(store.history(&user).is_empty());
    }

    #[test]
    fn failed_writes_stay_in_memory_and_notice_once() {
        let (storage, store) = store();
        let scope = Scope::Guest;
        storage.set_writes_disabled(true);

        let saved = store.add_to_history(&scope, "Berlin");
        assert!(saved.value);
        assert!(saved.is_session_only());
        assert_eq!(store.history(&scope), vec!["Berlin".to_string()]);
        assert_eq!(storage.get(&scope.key(RecordKind::History)).unwrap(), None);

        assert_eq!(store.take_degraded_notice(), Some(DEGRADED_NOTICE));
        store.add_to_history(&scope, "Madrid");
        assert_eq!(store.take_degraded_notice(), None);

        storage.set_writes_disabled(false);
        assert_eq!(
            store.add_to_history(&scope, "Lisbon").persistence,
            Persistence::Durable
        );
        let durable = storage.get(&scope.key(RecordKind::History)).unwrap().unwrap();
        assert!(durable.contains("Madrid"));
    }

    #[test]
    fn subscribers_only_see_their_scope() {
        let (_, store) = store();
        let guest = Scope::Guest;
        let user = Scope::User("u-9".into());
        let mut guest_rx = store.subscribe(&guest);

        store.add_to_history(&user, "Tokyo");
        store.add_favorite(&guest, &FavoriteInput::new("Kyoto"));

        let event = guest_rx.try_recv().unwrap();
        assert_eq!(event.kind, RecordKind::Favorites);
        assert_eq!(event.key, "skycast:favorites:guest");
        assert!(guest_rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn async_subscriber_receives_profile_updates() {
        let (_, store) = store();
        let scope = Scope::User("u-2".into());
        let mut rx = store.subscribe(&scope);

        let saved = store.update_profile(&scope, |p| p.theme = Theme::System);
        assert_eq!(saved.value.theme, Theme::System);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, RecordKind::Profile);
    }

    #[test]
    fn unreadable_values_are_never_overwritten() {
        let (storage, store) = store();
        let scope = Scope::Guest;
        for city in ["Oslo", "Rome", "Lima"] {
            store.add_favorite(&scope, &FavoriteInput::new(city));
        }
        store.add_to_history(&scope, "Paris");
        store.update_profile(&scope, |p| p.default_city = Some("Oslo".into()));

        storage.set_reads_failing(true);
        let saved = store.add_favorite(&scope, &FavoriteInput::new("Kyiv"));
        assert!(saved.value);
        assert!(saved.is_session_only());
        assert!(store.add_to_history(&scope, "Berlin").is_session_only());
        assert!(
            store
                .update_profile(&scope, |p| p.unit = UnitSystem::Imperial)
                .is_session_only()
        );
        assert_eq!(store.take_degraded_notice(), Some(DEGRADED_NOTICE));
        storage.set_reads_failing(false);

        // Further changes on top of a value that was never read stay in memory.
        assert!(
            store
                .add_favorite(&scope, &FavoriteInput::new("Quito"))
                .is_session_only()
        );

        let raw = |kind: RecordKind| storage.get(&scope.key(kind)).unwrap().unwrap();
        let favorites: Vec<FavoriteCity> =
            serde_json::from_str(&raw(RecordKind::Favorites)).unwrap();
        let names: Vec<&str> = favorites.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Lima", "Rome", "Oslo"]);

        let history: Vec<String> = serde_json::from_str(&raw(RecordKind::History)).unwrap();
        assert_eq!(history, vec!["Paris".to_string()]);

        let profile: WeatherProfile = serde_json::from_str(&raw(RecordKind::Profile)).unwrap();
        assert_eq!(profile.default_city.as_deref(), Some("Oslo"));
        assert_eq!(profile.unit, UnitSystem::Metric);

        // A full replacement is written again once storage is readable.
        assert_eq!(store.clear_history(&scope), Persistence::Durable);
        assert!(store.history(&scope).is_empty());
    }
}
