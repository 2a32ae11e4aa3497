//! Playback session: one station, one stream, one owner.
//!
//! `PlaybackSession` is the synchronous state machine. `spawn` moves it into
//! a task that serializes every command and audio event, and hands out a
//! cloneable [`SessionHandle`]. Every transition is committed to the watch
//! snapshot and broadcast before the command that caused it is answered.

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use radiowave_proto::protocol::{PlaybackPhase, SessionChange, SessionState, SessionUpdate, Station};

use crate::audio::{AudioBackend, AudioEvent, AudioNotice, AudioStream, StreamEvents};
use crate::error::PlayerError;

const UPDATE_CHANNEL_CAPACITY: usize = 64;
const COMMAND_CHANNEL_CAPACITY: usize = 32;

pub struct PlaybackSession<B: AudioBackend> {
    backend: B,
    stream: Option<B::Stream>,
    /// Bumped whenever a stream is replaced or released.
    generation: u64,
    state: SessionState,
    notice_tx: mpsc::UnboundedSender<AudioNotice>,
    updates: broadcast::Sender<SessionUpdate>,
    snapshot: watch::Sender<SessionState>,
}

impl<B: AudioBackend> PlaybackSession<B> {
    /// Returns the session and the receiver its streams report into.
    pub fn new(backend: B, volume: f32) -> (Self, mpsc::UnboundedReceiver<AudioNotice>) {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let state = SessionState::new(volume);
        let (snapshot, _) = watch::channel(state.clone());
        let session = Self {
            backend,
            stream: None,
            generation: 0,
            state,
            notice_tx,
            updates,
            snapshot,
        };
        (session, notice_rx)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.snapshot.subscribe()
    }

    // ── operations ────────────────────────────────────────────────────────────

    /// Start `station`, or pause it if it is the one already playing.
    pub fn play_station(&mut self, station: Station) -> Result<(), PlayerError> {
        if self.state.is_current(&station.id) && self.state.is_playing() {
            self.pause();
            return Ok(());
        }
        self.start(station)
    }

    pub fn toggle_play(&mut self) -> Result<(), PlayerError> {
        if self.state.current_station.is_none() {
            return Ok(());
        }
        if self.state.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.resume()
        }
    }

    pub fn pause(&mut self) {
        if !self.state.is_playing() {
            return;
        }
        if let Some(stream) = self.stream.as_mut() {
            stream.pause();
        }
        self.state.rebuffering = false;
        self.set_phase(PlaybackPhase::Paused);
    }

    /// Continue a paused stream. From `Error`, restart the current station.
    pub fn resume(&mut self) -> Result<(), PlayerError> {
        match self.state.phase {
            PlaybackPhase::Paused => {
                if let Some(stream) = self.stream.as_mut() {
                    stream.resume();
                }
                self.set_phase(PlaybackPhase::Loading);
                Ok(())
            }
            PlaybackPhase::Error => match self.state.current_station.clone() {
                Some(station) => {
                    info!("session: retrying '{}'", station.name);
                    self.start(station)
                }
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), PlayerError> {
        if !volume.is_finite() {
            return Err(PlayerError::InvalidVolume(volume));
        }
        let volume = volume.clamp(0.0, 1.0);
        if let Some(stream) = self.stream.as_mut() {
            stream.set_volume(volume);
        }
        if self.state.volume != volume {
            self.state.volume = volume;
            self.publish(SessionChange::VolumeChanged);
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        self.release_stream();
        self.generation += 1;

        let had_station = self.state.current_station.take().is_some();
        let from = self.state.phase;
        self.state.phase = PlaybackPhase::Idle;
        self.state.rebuffering = false;
        self.state.last_error = None;

        if had_station {
            info!("session: stopped");
            self.publish(SessionChange::StationChanged);
        }
        if from != PlaybackPhase::Idle {
            self.publish(SessionChange::PhaseChanged {
                from,
                to: PlaybackPhase::Idle,
            });
        }
    }

    /// Apply an event reported by a stream.
    pub fn handle_audio(&mut self, notice: AudioNotice) {
        if notice.generation != self.generation || self.stream.is_none() {
            debug!(
                "session: dropping {:?} from gen {} (current {})",
                notice.event, notice.generation, self.generation
            );
            return;
        }

        match notice.event {
            AudioEvent::Playing => {
                if self.state.phase == PlaybackPhase::Loading {
                    self.state.rebuffering = false;
                    self.state.last_error = None;
                    self.set_phase(PlaybackPhase::Playing);
                }
            }
            AudioEvent::Buffering => {
                if self.state.phase == PlaybackPhase::Playing {
                    self.state.rebuffering = true;
                    self.set_phase(PlaybackPhase::Loading);
                }
            }
            AudioEvent::Paused => {
                if self.state.is_playing() {
                    self.state.rebuffering = false;
                    self.set_phase(PlaybackPhase::Paused);
                }
            }
            AudioEvent::Failed(message) => {
                self.fail(message);
            }
            AudioEvent::Ended => {
                self.fail("stream ended".to_string());
            }
        }
    }

    // ── internals ─────────────────────────────────────────────────────────────

    fn start(&mut self, station: Station) -> Result<(), PlayerError> {
        self.release_stream();
        self.generation += 1;

        let url = station.playable_url().to_string();
        info!("session: loading '{}' gen={}", station.name, self.generation);

        let station_changed = !self.state.is_current(&station.id);
        let from = self.state.phase;
        self.state.current_station = Some(station);
        self.state.phase = PlaybackPhase::Loading;
        self.state.rebuffering = false;
        self.state.last_error = None;

        if station_changed {
            self.publish(SessionChange::StationChanged);
        }
        if from != PlaybackPhase::Loading {
            self.publish(SessionChange::PhaseChanged {
                from,
                to: PlaybackPhase::Loading,
            });
        }

        if url.is_empty() {
            return Err(self.fail("station has no stream url".to_string()));
        }

        let events = StreamEvents::new(self.generation, self.notice_tx.clone());
        match self.backend.open(&url, self.state.volume, events) {
            Ok(stream) => {
                self.stream = Some(stream);
                Ok(())
            }
            Err(err) => {
                self.fail(err.to_string());
                Err(err)
            }
        }
    }

    fn fail(&mut self, message: String) -> PlayerError {
        warn!("session: stream failed: {}", message);
        self.release_stream();
        self.state.rebuffering = false;
        self.state.last_error = Some(message.clone());
        self.set_phase(PlaybackPhase::Error);
        PlayerError::Stream(message)
    }

    fn release_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("session: releasing stream gen={}", self.generation);
            drop(stream);
        }
    }

    fn set_phase(&mut self, to: PlaybackPhase) {
        let from = self.state.phase;
        if from == to {
            return;
        }
        self.state.phase = to;
        debug!("session: {:?} → {:?}", from, to);
        self.publish(SessionChange::PhaseChanged { from, to });
    }

    fn publish(&mut self, change: SessionChange) {
        self.state.rev += 1;
        self.snapshot.send_replace(self.state.clone());
        // No subscribers is fine.
        let _ = self.updates.send(SessionUpdate {
            change,
            state: self.state.clone(),
        });
    }
}

// ── actor ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum SessionCommand {
    Play(Station),
    TogglePlay,
    Pause,
    Resume,
    SetVolume(f32),
    Stop,
}

struct SessionRequest {
    command: SessionCommand,
    reply: oneshot::Sender<Result<(), PlayerError>>,
}

impl<B: AudioBackend> PlaybackSession<B> {
    /// Move a new session into its own task.
    pub fn spawn(backend: B, volume: f32) -> SessionHandle {
        let (session, notices) = Self::new(backend, volume);
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = SessionHandle {
            tx,
            updates: session.updates.clone(),
            snapshot: session.watch(),
        };
        tokio::spawn(session.run(rx, notices));
        handle
    }

    fn apply(&mut self, command: SessionCommand) -> Result<(), PlayerError> {
        match command {
            SessionCommand::Play(station) => self.play_station(station),
            SessionCommand::TogglePlay => self.toggle_play(),
            SessionCommand::Pause => {
                self.pause();
                Ok(())
            }
            SessionCommand::Resume => self.resume(),
            SessionCommand::SetVolume(volume) => self.set_volume(volume),
            SessionCommand::Stop => {
                self.stop();
                Ok(())
            }
        }
    }

    async fn run(
        mut self,
        mut requests: mpsc::Receiver<SessionRequest>,
        mut notices: mpsc::UnboundedReceiver<AudioNotice>,
    ) {
        debug!("session: task started");
        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(SessionRequest { command, reply }) = request else {
                        break;
                    };
                    debug!("session: command {:?}", command);
                    let _ = reply.send(self.apply(command));
                }
                Some(notice) = notices.recv() => self.handle_audio(notice),
            }
        }
        self.stop();
        info!("session: all handles dropped, exiting");
    }
}

/// Cloneable async front of a spawned session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
    updates: broadcast::Sender<SessionUpdate>,
    snapshot: watch::Receiver<SessionState>,
}

impl SessionHandle {
    async fn request(&self, command: SessionCommand) -> Result<(), PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionRequest { command, reply })
            .await
            .map_err(|_| PlayerError::SessionClosed)?;
        rx.await.map_err(|_| PlayerError::SessionClosed)?
    }

    pub async fn play_station(&self, station: Station) -> Result<(), PlayerError> {
        self.request(SessionCommand::Play(station)).await
    }

    pub async fn toggle_play(&self) -> Result<(), PlayerError> {
        self.request(SessionCommand::TogglePlay).await
    }

    pub async fn pause(&self) -> Result<(), PlayerError> {
        self.request(SessionCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), PlayerError> {
        self.request(SessionCommand::Resume).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<(), PlayerError> {
        self.request(SessionCommand::SetVolume(volume)).await
    }

    pub async fn stop(&self) -> Result<(), PlayerError> {
        self.request(SessionCommand::Stop).await
    }

    /// Latest committed state.
    pub fn snapshot(&self) -> SessionState {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.snapshot.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
