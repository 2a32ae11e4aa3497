//! mpv audio backend.
//!
//! One long-lived mpv process in idle mode, driven over its JSON IPC socket.
//!
//! ```text
//!   MpvBackend::launch()
//!         │
//!         ├── writer task  ← IpcRequest via mpsc, serialised → socket
//!         ├── reader task  ← JSON lines from socket
//!         │                     ├── reply (has request_id) → matching oneshot
//!         │                     └── event / property-change → pump task
//!         ├── poster task  ← fire-and-forget commands, awaited one at a time
//!         └── pump task    → AudioEvent for the stream that loaded the file
//! ```
//!
//! Streams are cheap: opening one is a `loadfile` on the shared process and
//! releasing it is a `stop`. Both go through the poster so they reach mpv in
//! the order the session issued them.
//!
//! Platform notes:
//! - Unix:    Unix domain socket
//! - Windows: named pipe `\\.\pipe\<name>`

use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use radiowave_proto::config::PlayerConfig;
use radiowave_proto::platform;

use crate::audio::{AudioBackend, AudioEvent, AudioStream, StreamEvents};
use crate::error::PlayerError;

// ── observation property IDs ──────────────────────────────────────────────────

const OBS_CORE_IDLE: u64 = 1;
const OBS_PAUSE: u64 = 2;
const OBS_PAUSED_FOR_CACHE: u64 = 3;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_ATTEMPTS: u32 = 50;
const CONNECT_INTERVAL: Duration = Duration::from_millis(100);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

type ReplySender = oneshot::Sender<anyhow::Result<Value>>;
type PendingReplies = Arc<Mutex<HashMap<u64, ReplySender>>>;
/// Streams whose `loadfile` has been posted but whose `start-file` has not
/// been seen yet, oldest first.
type LoadQueue = Arc<std::sync::Mutex<VecDeque<StreamEvents>>>;

fn lock_loads(loads: &LoadQueue) -> std::sync::MutexGuard<'_, VecDeque<StreamEvents>> {
    loads.lock().unwrap_or_else(|e| e.into_inner())
}

struct IpcRequest {
    id: u64,
    line: String, // serialised JSON, newline-terminated
    reply: ReplySender,
}

// ── IPC handle ────────────────────────────────────────────────────────────────

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct MpvIpc {
    tx: mpsc::Sender<IpcRequest>,
}

impl MpvIpc {
    /// Send one command and wait for mpv's reply.
    pub async fn command(&self, command: Value) -> anyhow::Result<Value> {
        let id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&json!({ "command": command, "request_id": id }))?;
        line.push('\n');

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(IpcRequest { id, line, reply })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(REPLY_TIMEOUT, rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", id))?
    }

    async fn observe_playback(&self) {
        let props = [
            (OBS_CORE_IDLE, "core-idle"),
            (OBS_PAUSE, "pause"),
            (OBS_PAUSED_FOR_CACHE, "paused-for-cache"),
        ];
        for (id, name) in props {
            match self.command(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observing {} as {}", name, id),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

fn start_io<S>(stream: S, events: mpsc::Sender<Value>) -> MpvIpc
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
    let (tx, rx) = mpsc::channel::<IpcRequest>(64);

    tokio::spawn(writer_task(write_half, rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, events));

    MpvIpc { tx }
}

#[cfg(unix)]
async fn connect(socket_name: &str, events: mpsc::Sender<Value>) -> anyhow::Result<MpvIpc> {
    let socket_path = std::path::Path::new(socket_name);
    for _ in 0..CONNECT_ATTEMPTS {
        if socket_path.exists() {
            break;
        }
        tokio::time::sleep(CONNECT_INTERVAL).await;
    }
    if !socket_path.exists() {
        anyhow::bail!("mpv IPC socket did not appear at {}", socket_name);
    }
    let stream = tokio::net::UnixStream::connect(socket_path).await?;
    info!("mpv: connected to {}", socket_name);
    Ok(start_io(stream, events))
}

#[cfg(windows)]
async fn connect(socket_name: &str, events: mpsc::Sender<Value>) -> anyhow::Result<MpvIpc> {
    use tokio::net::windows::named_pipe::ClientOptions;

    let pipe_path = format!(r"\\.\pipe\{}", socket_name);
    for _ in 0..CONNECT_ATTEMPTS {
        tokio::time::sleep(CONNECT_INTERVAL).await;
        if let Ok(client) = ClientOptions::new().open(&pipe_path) {
            info!("mpv: connected to {}", pipe_path);
            return Ok(start_io(client, events));
        }
    }
    anyhow::bail!("mpv named pipe {} did not appear", pipe_path)
}

// ── reader / writer tasks ─────────────────────────────────────────────────────

async fn fail_pending(pending: &PendingReplies, reason: &str) {
    let mut map = pending.lock().await;
    for (_, reply) in map.drain() {
        let _ = reply.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingReplies, events: mpsc::Sender<Value>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let value: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                let Some(id) = value.get("request_id").and_then(Value::as_u64) else {
                    let _ = events.send(value).await;
                    continue;
                };
                let Some(reply) = pending.lock().await.remove(&id) else {
                    debug!("mpv reader: reply for unknown req={}", id);
                    continue;
                };
                let result = match value.get("error").and_then(Value::as_str) {
                    Some("success") => Ok(value),
                    other => Err(anyhow::anyhow!("mpv error: {}", other.unwrap_or("unknown error"))),
                };
                let _ = reply.send(result);
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<IpcRequest>, pending: PendingReplies)
where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = rx.recv().await {
        // Registered before writing so the reader can always match the reply.
        pending.lock().await.insert(request.id, request.reply);
        debug!("mpv writer: req={} {}", request.id, request.line.trim());
        if let Err(e) = writer.write_all(request.line.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(reply) = pending.lock().await.remove(&request.id) {
                let _ = reply.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── event mapping ─────────────────────────────────────────────────────────────

/// Translate one unsolicited mpv message into a stream event.
fn audio_event(raw: &Value) -> Option<AudioEvent> {
    match raw.get("event")?.as_str()? {
        "property-change" => {
            let flag = raw.get("data").and_then(Value::as_bool);
            match (raw.get("id")?.as_u64()?, flag) {
                (OBS_CORE_IDLE, Some(false)) => Some(AudioEvent::Playing),
                (OBS_PAUSED_FOR_CACHE, Some(true)) => Some(AudioEvent::Buffering),
                (OBS_PAUSE, Some(true)) => Some(AudioEvent::Paused),
                _ => None,
            }
        }
        // "stop" follows our own loadfile/stop calls.
        "end-file" => match raw.get("reason").and_then(Value::as_str)? {
            "eof" => Some(AudioEvent::Ended),
            "error" => Some(AudioEvent::Failed(
                raw.get("file_error")
                    .and_then(Value::as_str)
                    .unwrap_or("playback error")
                    .to_string(),
            )),
            _ => None,
        },
        _ => None,
    }
}

/// Attributes mpv events to the stream that caused them.
///
/// mpv handles commands in order and answers every `loadfile` with exactly
/// one `start-file`, so start-files pop the load queue in order. Later
/// events belong to that entry until its `end-file`. A `redirect` end
/// (playlist URLs) hands the same stream over to the next `start-file`.
struct EventRouter {
    loads: LoadQueue,
    bound: Option<(Option<u64>, StreamEvents)>,
    redirecting: bool,
}

impl EventRouter {
    fn new(loads: LoadQueue) -> Self {
        Self {
            loads,
            bound: None,
            redirecting: false,
        }
    }

    fn route(&mut self, raw: &Value) -> Option<(StreamEvents, AudioEvent)> {
        let entry = raw.get("playlist_entry_id").and_then(Value::as_u64);
        match raw.get("event")?.as_str()? {
            "start-file" => {
                let events = if self.redirecting {
                    self.bound.take().map(|(_, events)| events)
                } else {
                    lock_loads(&self.loads).pop_front()
                };
                self.redirecting = false;
                self.bound = events.map(|events| (entry, events));
                None
            }
            "end-file" => {
                match &self.bound {
                    Some((bound_entry, _)) if *bound_entry == entry => {}
                    _ => {
                        debug!("mpv: end-file for unbound entry {:?}", entry);
                        return None;
                    }
                }
                if raw.get("reason").and_then(Value::as_str) == Some("redirect") {
                    self.redirecting = true;
                    return None;
                }
                let (_, events) = self.bound.take()?;
                audio_event(raw).map(|event| (events, event))
            }
            _ => {
                let event = audio_event(raw)?;
                let (_, events) = self.bound.as_ref()?;
                Some((events.clone(), event))
            }
        }
    }

    /// Stream to blame when the connection drops.
    fn newest(&mut self) -> Option<StreamEvents> {
        let queued = lock_loads(&self.loads).pop_back();
        queued.or_else(|| self.bound.take().map(|(_, events)| events))
    }
}

async fn pump_task(mut rx: mpsc::Receiver<Value>, mut router: EventRouter, alive: Arc<AtomicBool>) {
    while let Some(raw) = rx.recv().await {
        if let Some((sink, event)) = router.route(&raw) {
            debug!("mpv: gen={} {:?}", sink.generation(), event);
            sink.emit(event);
        }
    }
    alive.store(false, Ordering::SeqCst);
    warn!("mpv: IPC connection lost");
    if let Some(sink) = router.newest() {
        sink.emit(AudioEvent::Failed("mpv exited".to_string()));
    }
}

enum Post {
    Command(Value),
    /// `loadfile` for the stream with this generation.
    Load { url: String, generation: u64 },
}

async fn poster_task(ipc: MpvIpc, mut rx: mpsc::UnboundedReceiver<Post>, loads: LoadQueue) {
    while let Some(post) = rx.recv().await {
        match post {
            Post::Command(command) => {
                if let Err(e) = ipc.command(command.clone()).await {
                    warn!("mpv: {} failed: {}", command, e);
                }
            }
            Post::Load { url, generation } => {
                if let Err(e) = ipc.command(json!(["loadfile", url.as_str()])).await {
                    // No start-file will follow.
                    warn!("mpv: loadfile {} failed: {}", url, e);
                    lock_loads(&loads).retain(|events| events.generation() != generation);
                }
            }
        }
    }
}

fn volume_percent(volume: f32) -> f64 {
    (volume as f64 * 100.0).clamp(0.0, 100.0).round()
}

// ── backend ───────────────────────────────────────────────────────────────────

pub struct MpvBackend {
    // Held for kill_on_drop.
    _process: tokio::process::Child,
    posts: mpsc::UnboundedSender<Post>,
    loads: LoadQueue,
    alive: Arc<AtomicBool>,
}

impl MpvBackend {
    /// Spawn mpv, connect to its IPC endpoint and register observers.
    pub async fn launch(config: &PlayerConfig) -> anyhow::Result<Self> {
        let volume = config.default_volume.clamp(0.0, 1.0);
        let socket_name = platform::mpv_socket_name();
        let binary = platform::find_mpv_binary(config.use_system_mpv)
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&socket_name).await;

        info!("mpv: spawning {:?}", binary);
        let process = tokio::process::Command::new(binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--quiet")
            .arg(platform::mpv_socket_arg(&socket_name))
            .arg(format!("--volume={}", volume_percent(volume)))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let (event_tx, event_rx) = mpsc::channel(64);
        let ipc = connect(&socket_name, event_tx).await?;
        ipc.observe_playback().await;

        let loads: LoadQueue = Arc::default();
        let alive = Arc::new(AtomicBool::new(true));
        let (posts, posts_rx) = mpsc::unbounded_channel();
        tokio::spawn(poster_task(ipc, posts_rx, loads.clone()));
        tokio::spawn(pump_task(event_rx, EventRouter::new(loads.clone()), alive.clone()));

        Ok(Self {
            _process: process,
            posts,
            loads,
            alive,
        })
    }

    fn post(&self, post: Post) -> Result<(), PlayerError> {
        self.posts
            .send(post)
            .map_err(|_| PlayerError::Stream("mpv is not running".to_string()))
    }
}

impl AudioBackend for MpvBackend {
    type Stream = MpvStream;

    fn open(&mut self, url: &str, volume: f32, events: StreamEvents) -> Result<MpvStream, PlayerError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(PlayerError::Stream("mpv is not running".to_string()));
        }
        let generation = events.generation();
        lock_loads(&self.loads).push_back(events);

        self.post(Post::Load {
            url: url.to_string(),
            generation,
        })?;
        self.post(Post::Command(json!(["set_property", "volume", volume_percent(volume)])))?;
        self.post(Post::Command(json!(["set_property", "pause", false])))?;
        info!("mpv: loading {} gen={}", url, generation);

        Ok(MpvStream {
            posts: self.posts.clone(),
        })
    }
}

pub struct MpvStream {
    posts: mpsc::UnboundedSender<Post>,
}

impl MpvStream {
    fn post(&self, command: Value) {
        if self.posts.send(Post::Command(command)).is_err() {
            debug!("mpv: poster gone, dropping command");
        }
    }
}

impl AudioStream for MpvStream {
    fn pause(&mut self) {
        self.post(json!(["set_property", "pause", true]));
    }

    fn resume(&mut self) {
        self.post(json!(["set_property", "pause", false]));
    }

    fn set_volume(&mut self, volume: f32) {
        self.post(json!(["set_property", "volume", volume_percent(volume)]));
    }
}

impl Drop for MpvStream {
    fn drop(&mut self) {
        // Its end-file still routes to it; the session drops that as stale.
        self.post(json!(["stop"]));
    }
}
