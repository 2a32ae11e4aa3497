//! Raw directory records and their conversion into the shared model.
//!
//! The directory is loose about nulls and missing fields, so everything is
//! optional here and defaulted during conversion.

use radiowave_proto::protocol::{Country, Station, Tag};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawStation {
    pub stationuuid: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub url_resolved: Option<String>,
    pub homepage: Option<String>,
    pub favicon: Option<String>,
    pub tags: Option<String>,
    pub country: Option<String>,
    pub countrycode: Option<String>,
    pub state: Option<String>,
    pub language: Option<String>,
    pub votes: Option<i64>,
    pub codec: Option<String>,
    pub bitrate: Option<i64>,
    pub clickcount: Option<i64>,
    pub clicktrend: Option<i64>,
}

fn text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn count(value: Option<i64>) -> u64 {
    value.unwrap_or_default().max(0) as u64
}

impl RawStation {
    /// `None` for records that cannot be identified or played.
    pub fn into_station(self) -> Option<Station> {
        let id = optional_text(self.stationuuid)?;
        let stream_url = text(self.url);
        let resolved_stream_url = text(self.url_resolved);
        if stream_url.is_empty() && resolved_stream_url.is_empty() {
            return None;
        }

        Some(Station {
            id,
            name: text(self.name),
            stream_url,
            resolved_stream_url,
            homepage_url: optional_text(self.homepage),
            icon_url: optional_text(self.favicon),
            country: text(self.country),
            country_code: text(self.countrycode).to_ascii_uppercase(),
            region: text(self.state),
            language: text(self.language),
            tags: text(self.tags),
            bitrate_kbps: self.bitrate.unwrap_or_default().clamp(0, u32::MAX as i64) as u32,
            codec: text(self.codec),
            votes: count(self.votes),
            click_count: count(self.clickcount),
            click_trend: self.clicktrend.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCountry {
    pub name: Option<String>,
    pub iso_3166_1: Option<String>,
    pub stationcount: Option<i64>,
}

impl RawCountry {
    pub fn into_country(self) -> Option<Country> {
        Some(Country {
            name: optional_text(self.name)?,
            iso_3166_1: text(self.iso_3166_1),
            stationcount: count(self.stationcount),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawTag {
    pub name: Option<String>,
    pub stationcount: Option<i64>,
}

impl RawTag {
    pub fn into_tag(self) -> Option<Tag> {
        Some(Tag {
            name: optional_text(self.name)?,
            stationcount: count(self.stationcount),
        })
    }
}
