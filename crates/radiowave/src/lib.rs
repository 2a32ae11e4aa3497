//! RadioWave: internet radio directory and player, as a library for a
//! hosting shell.
//!
//! [`Radiowave`] wires the cached station directory, the favorites and theme
//! stores, the playback session and the media control bridge together.

mod app;
pub mod navigation;

pub use app::{Radiowave, StationView};

pub use radiowave_directory as directory;
pub use radiowave_player as player;
pub use radiowave_proto as proto;
