use serde::{Deserialize, Serialize};

/// A radio station as published by the directory service.
///
/// Stations are built once from a directory response and then only read.
/// UI-side state (favorite, currently playing) lives in wrapper types.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Station {
    /// Stable identifier assigned by the directory (`stationuuid`).
    pub id: String,
    pub name: String,
    pub stream_url: String,
    /// Directory-resolved playable URL; preferred over `stream_url` when set.
    #[serde(default)]
    pub resolved_stream_url: String,
    #[serde(default)]
    pub homepage_url: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub language: String,
    /// Comma-delimited genre / category labels.
    #[serde(default)]
    pub tags: String,
    /// 0 = unknown
    #[serde(default)]
    pub bitrate_kbps: u32,
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub votes: u64,
    #[serde(default)]
    pub click_count: u64,
    #[serde(default)]
    pub click_trend: i64,
}

impl Station {
    /// The URL the audio resource should open.
    pub fn playable_url(&self) -> &str {
        let resolved = self.resolved_stream_url.trim();
        if resolved.is_empty() {
            self.stream_url.trim()
        } else {
            resolved
        }
    }

    pub fn has_icon(&self) -> bool {
        self.icon_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .collect()
    }

    /// First `n` tags, as shown on a station card.
    pub fn display_tags(&self, n: usize) -> Vec<&str> {
        let mut tags = self.tag_list();
        tags.truncate(n);
        tags
    }
}

/// Search / filter parameters for a station listing.
///
/// The whole tuple is the cache identity: two queries that differ in any
/// field are cached separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationQuery {
    #[serde(default)]
    pub search_text: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for StationQuery {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            tag: None,
            country: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl StationQuery {
    pub fn search(text: impl Into<String>, limit: usize) -> Self {
        Self {
            search_text: text.into(),
            limit,
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Trimmed tag, `None` when absent or blank.
    pub fn tag_filter(&self) -> Option<&str> {
        non_blank(self.tag.as_deref())
    }

    /// Trimmed country, `None` when absent or blank.
    pub fn country_filter(&self) -> Option<&str> {
        non_blank(self.country.as_deref())
    }

    pub fn text_filter(&self) -> Option<&str> {
        non_blank(Some(self.search_text.as_str()))
    }

    /// True when any of text / tag / country narrows the listing.
    pub fn is_filtered(&self) -> bool {
        self.text_filter().is_some() || self.tag_filter().is_some() || self.country_filter().is_some()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    #[serde(default)]
    pub iso_3166_1: String,
    #[serde(default)]
    pub stationcount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub stationcount: u64,
}

/// Discrete state of the playback session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle, // nothing loaded / explicitly stopped
    Loading, // stream requested or rebuffering, no audio rendering
    Playing, // audio flowing
    Paused,  // loaded, suspended by the user
    Error,   // failed to start or failed mid-stream
}

/// Snapshot of the single process-wide playback session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Monotonic revision counter, incremented on every change.
    #[serde(default)]
    pub rev: u64,
    pub current_station: Option<Station>,
    pub phase: PlaybackPhase,
    pub volume: f32,
    /// `Loading` was entered from `Playing` (buffer underrun).
    #[serde(default)]
    pub rebuffering: bool,
    /// Message of the most recent stream failure.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn new(volume: f32) -> Self {
        Self {
            rev: 0,
            current_station: None,
            phase: PlaybackPhase::Idle,
            volume: volume.clamp(0.0, 1.0),
            rebuffering: false,
            last_error: None,
        }
    }

    /// "Playing" from the listener's point of view: audio is flowing, or it
    /// was flowing and the stream is rebuffering.
    pub fn is_playing(&self) -> bool {
        match self.phase {
            PlaybackPhase::Playing => true,
            PlaybackPhase::Loading => self.rebuffering,
            _ => false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == PlaybackPhase::Loading
    }

    pub fn current_station_id(&self) -> Option<&str> {
        self.current_station.as_ref().map(|s| s.id.as_str())
    }

    pub fn is_current(&self, station_id: &str) -> bool {
        self.current_station_id() == Some(station_id)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(0.7)
    }
}

/// What changed in a [`SessionUpdate`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    StationChanged,
    PhaseChanged {
        from: PlaybackPhase,
        to: PlaybackPhase,
    },
    VolumeChanged,
}

/// Broadcast to subscribers after every session transition.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub change: SessionChange,
    pub state: SessionState,
}
