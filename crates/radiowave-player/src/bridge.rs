//! Media control bridge.
//!
//! Mirrors session state onto the host's system media controls and relays
//! host transport commands back into the session. Hosts without such a
//! surface get [`NoopSurface`].

use std::sync::{Arc, RwLock};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use radiowave_proto::config::PlayerConfig;
use radiowave_proto::protocol::{SessionChange, SessionState, Station};

use crate::error::PlayerError;
use crate::session::SessionHandle;

const ARTWORK_MIME: &str = "image/png";
const FALLBACK_ARTIST: &str = "Radio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlaybackState {
    Playing,
    Paused,
}

impl HostPlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Play,
    Pause,
    PreviousTrack,
    NextTrack,
}

impl HostCommand {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "play" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "previoustrack" => Some(Self::PreviousTrack),
            "nexttrack" => Some(Self::NextTrack),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::PreviousTrack => "previoustrack",
            Self::NextTrack => "nexttrack",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArtwork {
    pub src: String,
    pub sizes: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork: Vec<MediaArtwork>,
}

impl MediaMetadata {
    pub fn for_station(station: &Station, album: &str, artwork_sizes: &[String]) -> Self {
        let artist = if station.country.trim().is_empty() {
            FALLBACK_ARTIST.to_string()
        } else {
            station.country.clone()
        };
        let artwork = match station.icon_url.as_deref().map(str::trim) {
            Some(icon) if !icon.is_empty() => artwork_sizes
                .iter()
                .map(|sizes| MediaArtwork {
                    src: icon.to_string(),
                    sizes: sizes.clone(),
                    mime_type: ARTWORK_MIME.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };
        Self {
            title: station.name.clone(),
            artist,
            album: album.to_string(),
            artwork,
        }
    }
}

/// The host's system-level now-playing surface.
pub trait MediaControlSurface: Send + Sync {
    /// `None` clears the now-playing entry.
    fn set_metadata(&self, metadata: Option<&MediaMetadata>);
    fn set_playback_state(&self, state: HostPlaybackState);
}

/// Surface for hosts without system media controls.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSurface;

impl MediaControlSurface for NoopSurface {
    fn set_metadata(&self, _metadata: Option<&MediaMetadata>) {}
    fn set_playback_state(&self, _state: HostPlaybackState) {}
}

/// Picks the station to switch to; `None` leaves playback alone.
pub type NavigationCallback = Arc<dyn Fn() -> Option<Station> + Send + Sync>;

#[derive(Default, Clone)]
struct Navigation {
    next: Option<NavigationCallback>,
    previous: Option<NavigationCallback>,
}

pub struct MediaControlBridge {
    session: SessionHandle,
    surface: Arc<dyn MediaControlSurface>,
    navigation: RwLock<Navigation>,
    album: String,
    artwork_sizes: Vec<String>,
}

impl MediaControlBridge {
    pub fn new(
        session: SessionHandle,
        surface: Option<Arc<dyn MediaControlSurface>>,
        config: &PlayerConfig,
    ) -> Self {
        let surface = surface.unwrap_or_else(|| {
            debug!("bridge: no host media controls, using no-op surface");
            Arc::new(NoopSurface)
        });
        Self {
            session,
            surface,
            navigation: RwLock::new(Navigation::default()),
            album: config.album.clone(),
            artwork_sizes: config.artwork_sizes.clone(),
        }
    }

    /// Install or replace the next / previous callbacks.
    pub fn set_navigation_handlers(&self, on_next: NavigationCallback, on_previous: NavigationCallback) {
        let mut navigation = self.navigation.write().unwrap_or_else(|e| e.into_inner());
        navigation.next = Some(on_next);
        navigation.previous = Some(on_previous);
    }

    /// Route a host command; unknown names are ignored.
    pub async fn handle_named(&self, name: &str) -> Result<(), PlayerError> {
        match HostCommand::parse(name) {
            Some(command) => self.handle_command(command).await,
            None => {
                debug!("bridge: ignoring unknown host command '{}'", name);
                Ok(())
            }
        }
    }

    pub async fn handle_command(&self, command: HostCommand) -> Result<(), PlayerError> {
        debug!("bridge: host command {}", command.as_str());
        match command {
            HostCommand::Play => self.session.resume().await,
            HostCommand::Pause => self.session.pause().await,
            HostCommand::NextTrack | HostCommand::PreviousTrack => {
                let callback = {
                    let navigation = self.navigation.read().unwrap_or_else(|e| e.into_inner());
                    if command == HostCommand::NextTrack {
                        navigation.next.clone()
                    } else {
                        navigation.previous.clone()
                    }
                };
                let Some(callback) = callback else {
                    debug!("bridge: no handler for {}", command.as_str());
                    return Ok(());
                };
                match callback() {
                    Some(station) => self.session.play_station(station).await,
                    None => Ok(()),
                }
            }
        }
    }

    fn metadata_for(&self, state: &SessionState) -> Option<MediaMetadata> {
        state
            .current_station
            .as_ref()
            .map(|station| MediaMetadata::for_station(station, &self.album, &self.artwork_sizes))
    }

    /// Start mirroring session updates onto the surface.
    ///
    /// Subscribes before returning, so no transition after this call is
    /// missed.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let mut updates = self.session.subscribe();
        let mut mirror = Mirror::new(&self.session.snapshot());
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            info!("bridge: mirroring session to host media controls");
            loop {
                match updates.recv().await {
                    Ok(update) => {
                        let station_changed = update.change == SessionChange::StationChanged;
                        mirror.apply(&bridge, &update.state, station_changed);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("bridge: lagged {} updates, resyncing", skipped);
                        let state = bridge.session.snapshot();
                        mirror.apply(&bridge, &state, true);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("bridge: session closed, mirror stopped");
        })
    }
}

/// What was last pushed to the surface.
struct Mirror {
    playing: bool,
}

impl Mirror {
    fn new(initial: &SessionState) -> Self {
        Self {
            playing: initial.is_playing(),
        }
    }

    fn apply(&mut self, bridge: &MediaControlBridge, state: &SessionState, station_changed: bool) {
        if station_changed {
            let metadata = bridge.metadata_for(state);
            bridge.surface.set_metadata(metadata.as_ref());
        }
        let playing = state.is_playing();
        if playing != self.playing {
            self.playing = playing;
            bridge.surface.set_playback_state(if playing {
                HostPlaybackState::Playing
            } else {
                HostPlaybackState::Paused
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> Station {
        Station {
            id: "glz".into(),
            name: "Galgalatz".into(),
            stream_url: "http://glz.example/live".into(),
            icon_url: Some("https://img.example/glz.png".into()),
            country: "Israel".into(),
            ..Station::default()
        }
    }

    #[test]
    fn test_parse_host_commands() {
        for name in ["play", "pause", "previoustrack", "nexttrack"] {
            assert_eq!(HostCommand::parse(name).unwrap().as_str(), name);
        }
        assert_eq!(HostCommand::parse("seekto"), None);
        assert_eq!(HostCommand::parse("Play"), None);
    }

    #[test]
    fn test_metadata_for_station() {
        let config = PlayerConfig::default();
        let metadata = MediaMetadata::for_station(&station(), &config.album, &config.artwork_sizes);
        assert_eq!(metadata.title, "Galgalatz");
        assert_eq!(metadata.artist, "Israel");
        assert_eq!(metadata.album, "RadioWave");
        let sizes: Vec<&str> = metadata.artwork.iter().map(|a| a.sizes.as_str()).collect();
        assert_eq!(sizes, vec!["96x96", "128x128", "256x256"]);
        assert!(metadata
            .artwork
            .iter()
            .all(|a| a.src == "https://img.example/glz.png" && a.mime_type == "image/png"));
    }

    #[test]
    fn test_metadata_fallbacks() {
        let mut s = station();
        s.country.clear();
        s.icon_url = None;
        let metadata = MediaMetadata::for_station(&s, "RadioWave", &["96x96".to_string()]);
        assert_eq!(metadata.artist, "Radio");
        assert!(metadata.artwork.is_empty());
    }

    #[test]
    fn test_playback_state_names() {
        assert_eq!(HostPlaybackState::Playing.as_str(), "playing");
        assert_eq!(HostPlaybackState::Paused.as_str(), "paused");
    }
}
