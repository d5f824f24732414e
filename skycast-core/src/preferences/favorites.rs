use serde::{Deserialize, Serialize};

use crate::model::{CitySuggestion, WeatherSnapshot};

pub const MAX_FAVORITES: usize = 50;

/// A saved location shortcut, most recently added first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteCity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Epoch milliseconds.
    pub added_at: i64,
}

impl FavoriteCity {
    pub fn label(&self) -> String {
        [Some(self.name.as_str()), self.state.as_deref(), self.country.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteInput {
    pub name: String,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl FavoriteInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: None,
            country: None,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn id(&self) -> String {
        favorite_id(&self.name, self.state.as_deref(), self.country.as_deref())
    }
}

impl From<&WeatherSnapshot> for FavoriteInput {
    fn from(snapshot: &WeatherSnapshot) -> Self {
        Self {
            name: snapshot.city.clone(),
            state: None,
            country: Some(snapshot.country.clone()).filter(|c| !c.is_empty()),
        }
    }
}

impl From<&CitySuggestion> for FavoriteInput {
    fn from(suggestion: &CitySuggestion) -> Self {
        Self {
            name: suggestion.name.clone(),
            state: suggestion.state.clone(),
            country: Some(suggestion.country.clone()).filter(|c| !c.is_empty()),
        }
    }
}

/// `name::state::country`, trimmed and lower-cased, absent parts skipped.
pub fn favorite_id(name: &str, state: Option<&str>, country: Option<&str>) -> String {
    [Some(name), state, country]
        .into_iter()
        .flatten()
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("::")
}

/// Insert at the front unless already present. Returns whether the list changed.
pub(crate) fn insert(list: &mut Vec<FavoriteCity>, input: &FavoriteInput, added_at: i64) -> bool {
    let name = input.name.trim();
    if name.is_empty() {
        return false;
    }

    let id = favorite_id(name, input.state.as_deref(), input.country.as_deref());
    if list.iter().any(|f| f.id == id) {
        return false;
    }

    list.insert(
        0,
        FavoriteCity {
            id,
            name: name.to_string(),
            state: input.state.clone(),
            country: input.country.clone(),
            added_at,
        },
    );
    list.truncate(MAX_FAVORITES);
    true
}

pub(crate) fn remove(list: &mut Vec<FavoriteCity>, id: &str) -> bool {
    let before = list.len();
    list.retain(|f| f.id != id);
    list.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_case_folded_and_skips_missing_parts() {
        assert_eq!(favorite_id(" Paris ", None, Some("FR")), "paris::fr");
        assert_eq!(
            favorite_id("Springfield", Some("Illinois"), Some("US")),
            "springfield::illinois::us"
        );
        assert_eq!(favorite_id("Oslo", Some(""), None), "oslo");
    }

    #[test]
    fn insert_is_idempotent() {
        let mut list = Vec::new();
        assert!(insert(&mut list, &FavoriteInput::new("Paris").with_country("FR"), 1));
        assert!(insert(&mut list, &FavoriteInput::new("Lyon").with_country("FR"), 2));
        assert!(!insert(&mut list, &FavoriteInput::new("PARIS").with_country("fr"), 3));

        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Lyon");
        assert_eq!(list[1].added_at, 1);
    }

    #[test]
    fn insert_caps_the_list() {
        let mut list = Vec::new();
        for i in 0..(MAX_FAVORITES + 5) {
            insert(&mut list, &FavoriteInput::new(format!("City {i}")), i as i64);
        }
        assert_eq!(list.len(), MAX_FAVORITES);
        assert_eq!(list[0].name, format!("City {}", MAX_FAVORITES + 4));
    }

    #[test]
    fn blank_names_are_ignored() {
        let mut list = Vec::new();
        assert!(!insert(&mut list, &FavoriteInput::new("   "), 1));
        assert!(list.is_empty());
    }

    #[test]
    fn label_joins_present_parts() {
        let mut list = Vec::new();
        insert(&mut list, &FavoriteInput::new("Austin").with_state("Texas").with_country("US"), 1);
        assert_eq!(list[0].label(), "Austin, Texas, US");
        assert!(remove(&mut list, "austin::texas::us"));
        assert!(!remove(&mut list, "austin::texas::us"));
    }

    #[test]
    fn suggestion_keeps_its_state_for_the_id() {
        let suggestion = CitySuggestion {
            id: "1".into(),
            name: "Springfield".into(),
            state: Some("Illinois".into()),
            country: "US".into(),
            coordinates: crate::model::Coordinates {
                lat: 39.8,
                lon: -89.6,
            },
        };
        let mut list = Vec::new();
        insert(&mut list, &FavoriteInput::from(&suggestion), 1);
        assert_eq!(list[0].id, "springfield::illinois::us");
    }
}
