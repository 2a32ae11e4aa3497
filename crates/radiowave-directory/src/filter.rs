//! Station list filtering and deduplication.
//!
//! Applied to every fetched list, in order:
//!   1. content predicates (icon required, excluded languages, custom)
//!   2. dedup on normalized name OR playable URL, first occurrence wins
//!   3. truncation to the caller's limit

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use radiowave_proto::config::FilterConfig;
use radiowave_proto::protocol::Station;

pub type StationPredicate = Arc<dyn Fn(&Station) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct StationFilter {
    predicates: Vec<(String, StationPredicate)>,
}

impl fmt::Debug for StationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.predicates.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("StationFilter").field("predicates", &names).finish()
    }
}

impl StationFilter {
    /// No content predicates; dedup and truncation still apply.
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        let mut filter = Self::permissive();
        if config.require_icon {
            filter = filter.with_predicate("require-icon", Station::has_icon);
        }
        let markers: Vec<String> = config
            .excluded_languages
            .iter()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        if !markers.is_empty() {
            filter = filter.with_predicate("excluded-language", move |station: &Station| {
                let language = station.language.to_lowercase();
                !markers.iter().any(|marker| language.contains(marker.as_str()))
            });
        }
        filter
    }

    /// Append a named predicate; a station must satisfy every predicate.
    pub fn with_predicate<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Station) -> bool + Send + Sync + 'static,
    {
        self.predicates.push((name.into(), Arc::new(predicate)));
        self
    }

    pub fn accepts(&self, station: &Station) -> bool {
        self.predicates.iter().all(|(_, predicate)| predicate(station))
    }

    pub fn apply<I>(&self, stations: I, limit: usize) -> Vec<Station>
    where
        I: IntoIterator<Item = Station>,
    {
        let mut seen_names: HashSet<String> = HashSet::new();
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut result = Vec::new();

        for station in stations {
            if result.len() >= limit {
                break;
            }
            if !self.accepts(&station) {
                continue;
            }

            let name = name_key(&station.name);
            let url = url_key(&station);
            if (!name.is_empty() && seen_names.contains(&name)) || seen_urls.contains(&url) {
                continue;
            }
            if !name.is_empty() {
                seen_names.insert(name);
            }
            seen_urls.insert(url);
            result.push(station);
        }
        result
    }
}

/// Lowercase, alphanumerics only. "Kan 11" and "kan11!!" share a key.
pub fn name_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn url_key(station: &Station) -> String {
    station.playable_url().to_string()
}
