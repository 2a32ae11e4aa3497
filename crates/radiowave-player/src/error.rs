use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    /// The audio resource failed to start or stopped producing audio.
    #[error("stream error: {0}")]
    Stream(String),
    #[error("invalid volume {0}")]
    InvalidVolume(f32),
    /// The session task has exited; no further commands are accepted.
    #[error("playback session closed")]
    SessionClosed,
}
