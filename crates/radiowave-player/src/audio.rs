//! Audio resource abstraction.
//!
//! A backend opens one stream per station. The session owns the returned
//! stream exclusively and drops it to release it; asynchronous lifecycle
//! events come back over [`StreamEvents`], tagged with the generation of
//! the stream that produced them.

use tokio::sync::mpsc;

use crate::error::PlayerError;

/// Lifecycle event reported by an open stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// Audio is being rendered.
    Playing,
    /// Rendering stalled waiting for data.
    Buffering,
    /// Rendering was suspended outside the session (device, host).
    Paused,
    Failed(String),
    /// The stream finished; a live station never should.
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioNotice {
    pub generation: u64,
    pub event: AudioEvent,
}

/// Event sink handed to a backend for one stream.
#[derive(Debug, Clone)]
pub struct StreamEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<AudioNotice>,
}

impl StreamEvents {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<AudioNotice>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the session is gone.
    pub fn emit(&self, event: AudioEvent) -> bool {
        self.tx
            .send(AudioNotice {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// One open stream. Dropping it releases the underlying resource.
pub trait AudioStream: Send {
    fn pause(&mut self);
    fn resume(&mut self);
    /// `volume` is already clamped to `0.0..=1.0`.
    fn set_volume(&mut self, volume: f32);
}

pub trait AudioBackend: Send + 'static {
    type Stream: AudioStream + 'static;

    /// Start streaming `url`. Returning `Err` means the attempt failed
    /// outright; later failures are reported through `events`.
    fn open(&mut self, url: &str, volume: f32, events: StreamEvents) -> Result<Self::Stream, PlayerError>;
}
