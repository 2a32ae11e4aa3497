//! Favorite stations
//!
//! A set of station identifiers written through to the key-value store after
//! every toggle.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::PersistenceError;
use crate::protocol::Station;
use crate::storage::{load_json_or_default, save_json, KeyValueStore};

pub const FAVORITES_KEY: &str = "radio-favorites";

pub struct FavoritesStore {
    store: Arc<dyn KeyValueStore>,
    ids: BTreeSet<String>,
}

impl FavoritesStore {
    /// Load the persisted set. Missing or malformed data yields an empty set.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let ids: BTreeSet<String> = load_json_or_default::<Vec<String>>(store.as_ref(), FAVORITES_KEY)
            .unwrap_or_default()
            .into_iter()
            .collect();
        info!("favorites: loaded {} entries", ids.len());
        Self { store, ids }
    }

    /// Flip membership of `station_id` and persist the full set.
    ///
    /// Returns the new membership. On a failed write the in-memory change is
    /// undone so memory and storage stay identical.
    pub fn toggle(&mut self, station_id: &str) -> Result<bool, PersistenceError> {
        let now_favorite = if self.ids.remove(station_id) {
            false
        } else {
            self.ids.insert(station_id.to_string());
            true
        };

        if let Err(e) = self.persist() {
            warn!("favorites: write failed, rolling back toggle of {}: {}", station_id, e);
            if now_favorite {
                self.ids.remove(station_id);
            } else {
                self.ids.insert(station_id.to_string());
            }
            return Err(e);
        }
        Ok(now_favorite)
    }

    pub fn is_favorite(&self, station_id: &str) -> bool {
        self.ids.contains(station_id)
    }

    pub fn all(&self) -> &BTreeSet<String> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn persist(&self) -> Result<(), PersistenceError> {
        let ids: Vec<&String> = self.ids.iter().collect();
        save_json(self.store.as_ref(), FAVORITES_KEY, &ids)
    }
}

/// Stable partition: favorites first, otherwise the incoming order.
pub fn favorites_first(stations: &[Station], favorites: &FavoritesStore) -> Vec<Station> {
    let (mut favs, rest): (Vec<Station>, Vec<Station>) = stations
        .iter()
        .cloned()
        .partition(|s| favorites.is_favorite(&s.id));
    favs.extend(rest);
    favs
}
