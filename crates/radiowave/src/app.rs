//! The assembled application a hosting shell talks to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use radiowave_directory::{CachedDirectory, DirectoryClient, DirectoryError, StationSource};
use radiowave_player::{
    AudioBackend, HostCommand, MediaControlBridge, MediaControlSurface, NavigationCallback, PlaybackSession,
    PlayerError, SessionHandle,
};
use radiowave_proto::config::Config;
use radiowave_proto::error::PersistenceError;
use radiowave_proto::favorites::{favorites_first, FavoritesStore};
use radiowave_proto::protocol::{Country, Station, StationQuery, Tag};
use radiowave_proto::storage::{FileStore, KeyValueStore};
use radiowave_proto::theme::{ThemeColors, ThemeStore, ThemeUpdate};

use crate::navigation::{neighbour, Step};

/// A station plus the view state the UI decorates it with.
#[derive(Debug, Clone, PartialEq)]
pub struct StationView {
    pub station: Station,
    pub is_favorite: bool,
    pub is_current: bool,
}

type Shared<T> = Arc<Mutex<T>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// The station list of the most recently issued search.
#[derive(Clone)]
struct Listing {
    stations: Arc<RwLock<Vec<Station>>>,
    /// Ticket of the newest search; older results are not applied.
    latest: Arc<AtomicU64>,
    favorites: Shared<FavoritesStore>,
}

impl Listing {
    fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns false when a newer search was issued after `ticket`.
    fn replace(&self, ticket: u64, stations: Vec<Station>) -> bool {
        let mut current = self.stations.write().unwrap_or_else(|e| e.into_inner());
        if self.latest.load(Ordering::SeqCst) != ticket {
            return false;
        }
        *current = stations;
        true
    }

    fn ordered(&self) -> Vec<Station> {
        let stations = self.stations.read().unwrap_or_else(|e| e.into_inner());
        favorites_first(&stations, &lock(&self.favorites))
    }

    fn navigator(&self, session: &SessionHandle, step: Step) -> NavigationCallback {
        let listing = self.clone();
        let session = session.clone();
        Arc::new(move || {
            let state = session.snapshot();
            // Restarting the current station would toggle it to paused.
            neighbour(&listing.ordered(), state.current_station_id(), step).filter(|s| !state.is_current(&s.id))
        })
    }
}

pub struct Radiowave<S = CachedDirectory<DirectoryClient>> {
    config: Config,
    directory: Arc<S>,
    listing: Listing,
    theme: Mutex<ThemeStore>,
    session: SessionHandle,
    bridge: Arc<MediaControlBridge>,
    mirror: JoinHandle<()>,
}

impl Radiowave {
    /// Build against the configured directory mirrors, persisting into
    /// `config.paths.state_dir`. Must be called inside a tokio runtime.
    pub fn start<B: AudioBackend>(
        config: Config,
        backend: B,
        surface: Option<Arc<dyn MediaControlSurface>>,
    ) -> Result<Self, DirectoryError> {
        let client = DirectoryClient::new(&config.directory, &config.filter)?;
        let directory = CachedDirectory::new(client, &config.cache);
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.paths.state_dir.clone()));
        Ok(Self::with_source(config, directory, store, backend, surface))
    }

    /// Drop cached directory results.
    pub fn refresh(&self) {
        self.directory.invalidate_all();
    }
}

impl<S: StationSource + 'static> Radiowave<S> {
    pub fn with_source<B: AudioBackend>(
        config: Config,
        source: S,
        store: Arc<dyn KeyValueStore>,
        backend: B,
        surface: Option<Arc<dyn MediaControlSurface>>,
    ) -> Self {
        let favorites = FavoritesStore::load(store.clone());
        let theme = ThemeStore::load(store);
        info!("radiowave: {} favorites loaded", favorites.len());

        let session = PlaybackSession::spawn(backend, config.player.default_volume);
        let bridge = Arc::new(MediaControlBridge::new(session.clone(), surface, &config.player));

        let listing = Listing {
            stations: Arc::default(),
            latest: Arc::default(),
            favorites: Arc::new(Mutex::new(favorites)),
        };
        bridge.set_navigation_handlers(
            listing.navigator(&session, Step::Next),
            listing.navigator(&session, Step::Previous),
        );
        let mirror = bridge.start();

        Self {
            config,
            directory: Arc::new(source),
            listing,
            theme: Mutex::new(theme),
            session,
            bridge,
            mirror,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn bridge(&self) -> &MediaControlBridge {
        &self.bridge
    }

    // ── directory ─────────────────────────────────────────────────────────────

    /// Unfiltered listing at the configured default size.
    pub fn default_query(&self) -> StationQuery {
        StationQuery {
            limit: self.config.directory.default_limit,
            ..StationQuery::default()
        }
    }

    /// Fetch a station list and make it the current listing.
    ///
    /// On error the previous listing is kept and the error returned, so the
    /// UI can tell a failed fetch from an empty result. A search overtaken by
    /// a newer one still returns its own stations but leaves the listing to
    /// the newer search.
    pub async fn search(&self, query: &StationQuery) -> Result<Vec<StationView>, DirectoryError> {
        let ticket = self.listing.issue();
        let stations = self.directory.search(query).await?;
        if !self.listing.replace(ticket, stations.clone()) {
            debug!("radiowave: search {} superseded, listing kept", ticket);
            let ordered = favorites_first(&stations, &lock(&self.listing.favorites));
            return Ok(self.decorate(ordered));
        }
        debug!("radiowave: listing {} stations", stations.len());
        Ok(self.views())
    }

    pub async fn countries(&self) -> Result<Vec<Country>, DirectoryError> {
        self.directory.list_countries().await
    }

    pub async fn tags(&self) -> Result<Vec<Tag>, DirectoryError> {
        self.directory.list_tags().await
    }

    /// Current listing, favorites first, decorated with view state.
    pub fn views(&self) -> Vec<StationView> {
        self.decorate(self.listing.ordered())
    }

    fn decorate(&self, ordered: Vec<Station>) -> Vec<StationView> {
        let state = self.session.snapshot();
        let favorites = lock(&self.listing.favorites);
        ordered
            .into_iter()
            .map(|station| StationView {
                is_favorite: favorites.is_favorite(&station.id),
                is_current: state.is_current(&station.id),
                station,
            })
            .collect()
    }

    // ── playback ──────────────────────────────────────────────────────────────

    /// Play `station` (or pause it if it is already playing) and report the
    /// click to the directory in the background.
    pub async fn play(&self, station: Station) -> Result<(), PlayerError> {
        let state = self.session.snapshot();
        let toggling = state.is_current(&station.id) && state.is_playing();
        let id = station.id.clone();
        self.session.play_station(station).await?;

        if !toggling {
            let directory = self.directory.clone();
            tokio::spawn(async move {
                if let Err(e) = directory.report_click(&id).await {
                    warn!("radiowave: click report for {} failed: {}", id, e);
                }
            });
        }
        Ok(())
    }

    pub async fn next(&self) -> Result<(), PlayerError> {
        self.bridge.handle_command(HostCommand::NextTrack).await
    }

    pub async fn previous(&self) -> Result<(), PlayerError> {
        self.bridge.handle_command(HostCommand::PreviousTrack).await
    }

    // ── favorites & theme ─────────────────────────────────────────────────────

    /// Returns the new membership of `station_id`.
    pub fn toggle_favorite(&self, station_id: &str) -> Result<bool, PersistenceError> {
        lock(&self.listing.favorites).toggle(station_id)
    }

    pub fn is_favorite(&self, station_id: &str) -> bool {
        lock(&self.listing.favorites).is_favorite(station_id)
    }

    pub fn favorites(&self) -> Vec<String> {
        lock(&self.listing.favorites).all().iter().cloned().collect()
    }

    pub fn theme(&self) -> ThemeColors {
        lock(&self.theme).colors().clone()
    }

    pub fn update_theme(&self, update: ThemeUpdate) -> Result<ThemeColors, PersistenceError> {
        lock(&self.theme).update(update).cloned()
    }
}

impl<S> Drop for Radiowave<S> {
    fn drop(&mut self) {
        // The mirror task holds the bridge, which holds a session handle.
        self.mirror.abort();
    }
}
