//! Playback session, audio backends and the host media control bridge.

pub mod audio;
pub mod bridge;
pub mod error;
pub mod memory;
pub mod mpv;
pub mod session;

pub use audio::{AudioBackend, AudioEvent, AudioNotice, AudioStream, StreamEvents};
pub use bridge::{
    HostCommand, HostPlaybackState, MediaArtwork, MediaControlBridge, MediaControlSurface, MediaMetadata,
    NavigationCallback, NoopSurface,
};
pub use error::PlayerError;
pub use session::{PlaybackSession, SessionHandle};
