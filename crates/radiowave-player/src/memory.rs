//! In-memory audio backend and media surface.
//!
//! Neither produces sound or talks to a host. They record what the session
//! and bridge asked for and let the caller inject stream events, which makes
//! them usable for headless hosts and tests alike.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::{AudioBackend, AudioEvent, AudioStream, StreamEvents};
use crate::bridge::{HostPlaybackState, MediaControlSurface, MediaMetadata};
use crate::error::PlayerError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One recorded operation on a [`MemoryStream`], keyed by stream URL.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOp {
    Open { url: String, volume: f32 },
    Pause(String),
    Resume(String),
    Volume(String, f32),
    Release(String),
}

#[derive(Default)]
struct BackendLog {
    ops: Vec<StreamOp>,
    sinks: Vec<StreamEvents>,
    live: usize,
    fail_next: Option<String>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    log: Arc<Mutex<BackendLog>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<StreamOp> {
        lock(&self.log).ops.clone()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.log).sinks.len()
    }

    /// Streams opened and not yet released.
    pub fn live_streams(&self) -> usize {
        lock(&self.log).live
    }

    /// Make the next `open` fail with `message`.
    pub fn fail_next_open(&self, message: impl Into<String>) {
        lock(&self.log).fail_next = Some(message.into());
    }

    /// Report `event` from the most recently opened stream.
    pub fn emit(&self, event: AudioEvent) -> bool {
        let sink = lock(&self.log).sinks.last().cloned();
        sink.map(|s| s.emit(event)).unwrap_or(false)
    }

    /// Report `event` from the `index`-th stream ever opened.
    pub fn emit_on(&self, index: usize, event: AudioEvent) -> bool {
        let sink = lock(&self.log).sinks.get(index).cloned();
        sink.map(|s| s.emit(event)).unwrap_or(false)
    }
}

impl AudioBackend for MemoryBackend {
    type Stream = MemoryStream;

    fn open(&mut self, url: &str, volume: f32, events: StreamEvents) -> Result<MemoryStream, PlayerError> {
        let mut log = lock(&self.log);
        if let Some(message) = log.fail_next.take() {
            return Err(PlayerError::Stream(message));
        }
        log.ops.push(StreamOp::Open {
            url: url.to_string(),
            volume,
        });
        log.sinks.push(events);
        log.live += 1;
        Ok(MemoryStream {
            url: url.to_string(),
            log: self.log.clone(),
        })
    }
}

pub struct MemoryStream {
    url: String,
    log: Arc<Mutex<BackendLog>>,
}

impl MemoryStream {
    fn record(&self, op: StreamOp) {
        lock(&self.log).ops.push(op);
    }
}

impl AudioStream for MemoryStream {
    fn pause(&mut self) {
        self.record(StreamOp::Pause(self.url.clone()));
    }

    fn resume(&mut self) {
        self.record(StreamOp::Resume(self.url.clone()));
    }

    fn set_volume(&mut self, volume: f32) {
        self.record(StreamOp::Volume(self.url.clone(), volume));
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        let mut log = lock(&self.log);
        log.ops.push(StreamOp::Release(self.url.clone()));
        log.live = log.live.saturating_sub(1);
    }
}

// ── surface ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SurfaceLog {
    metadata: Option<MediaMetadata>,
    metadata_writes: usize,
    playback: Vec<HostPlaybackState>,
}

/// Records what the bridge published.
#[derive(Clone, Default)]
pub struct MemorySurface {
    log: Arc<Mutex<SurfaceLog>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self) -> Option<MediaMetadata> {
        lock(&self.log).metadata.clone()
    }

    pub fn metadata_writes(&self) -> usize {
        lock(&self.log).metadata_writes
    }

    /// Every playback state published, oldest first.
    pub fn playback_states(&self) -> Vec<HostPlaybackState> {
        lock(&self.log).playback.clone()
    }
}

impl MediaControlSurface for MemorySurface {
    fn set_metadata(&self, metadata: Option<&MediaMetadata>) {
        let mut log = lock(&self.log);
        log.metadata = metadata.cloned();
        log.metadata_writes += 1;
    }

    fn set_playback_state(&self, state: HostPlaybackState) {
        lock(&self.log).playback.push(state);
    }
}
