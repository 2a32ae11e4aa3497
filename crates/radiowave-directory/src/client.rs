use std::future::Future;
use std::sync::Arc;

use rand::seq::SliceRandom;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use radiowave_proto::config::{DirectoryConfig, FilterConfig};
use radiowave_proto::protocol::{Country, Station, StationQuery, Tag};

use crate::error::DirectoryError;
use crate::filter::StationFilter;
use crate::records::{RawCountry, RawStation, RawTag};

const STATIONS_SEARCH_PATH: &str = "json/stations/search";
const COUNTRIES_PATH: &str = "json/countries";
const TAGS_PATH: &str = "json/tags";
const CLICK_PATH: &str = "json/url";

/// A source of station listings and lookup lists.
pub trait StationSource: Send + Sync {
    fn search(
        &self,
        query: &StationQuery,
    ) -> impl Future<Output = Result<Vec<Station>, DirectoryError>> + Send;

    fn list_countries(&self) -> impl Future<Output = Result<Vec<Country>, DirectoryError>> + Send;

    fn list_tags(&self) -> impl Future<Output = Result<Vec<Tag>, DirectoryError>> + Send;

    /// Best-effort popularity ping for a station that started playing.
    fn report_click(&self, station_id: &str) -> impl Future<Output = Result<(), DirectoryError>> + Send {
        let _ = station_id;
        async { Ok(()) }
    }
}

/// Limits applied to the auxiliary lookup lists.
#[derive(Debug, Clone)]
struct LookupLimits {
    min_country_stations: u64,
    max_countries: usize,
    max_tags: usize,
}

/// HTTP client for the station directory.
///
/// Every call picks one mirror uniformly at random; a failing mirror fails
/// that call and nothing is retried here.
#[derive(Clone)]
pub struct DirectoryClient {
    client: Client,
    mirrors: Vec<String>,
    over_fetch: usize,
    pinned_country: Option<String>,
    filter: Arc<StationFilter>,
    limits: LookupLimits,
}

impl DirectoryClient {
    pub fn new(
        config: &DirectoryConfig,
        filter_config: &FilterConfig,
    ) -> Result<Self, DirectoryError> {
        Self::with_filter(config, filter_config, StationFilter::from_config(filter_config))
    }

    pub fn with_filter(
        config: &DirectoryConfig,
        filter_config: &FilterConfig,
        filter: StationFilter,
    ) -> Result<Self, DirectoryError> {
        let mut mirrors: Vec<String> = Vec::new();
        for candidate in &config.mirrors {
            let normalized = candidate.trim().trim_end_matches('/');
            if normalized.is_empty() {
                continue;
            }
            Url::parse(normalized).map_err(|_| DirectoryError::InvalidMirror(normalized.to_string()))?;
            if !mirrors.iter().any(|m| m.eq_ignore_ascii_case(normalized)) {
                mirrors.push(normalized.to_string());
            }
        }
        if mirrors.is_empty() {
            return Err(DirectoryError::NoMirrors);
        }

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()
            .map_err(|source| DirectoryError::Network {
                mirror: mirrors[0].clone(),
                source,
            })?;

        Ok(Self {
            client,
            mirrors,
            over_fetch: config.over_fetch.max(1),
            pinned_country: config
                .pinned_country
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            filter: Arc::new(filter),
            limits: LookupLimits {
                min_country_stations: filter_config.min_country_stations,
                max_countries: filter_config.max_countries,
                max_tags: filter_config.max_tags,
            },
        })
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    fn pick_mirror(&self) -> &str {
        self.mirrors
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(self.mirrors[0].as_str())
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, DirectoryError> {
        let mirror = self.pick_mirror().to_string();
        let url = format!("{}/{}", mirror, path);
        debug!("directory: GET {} {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|source| DirectoryError::Network {
                mirror: mirror.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("directory: {} returned {}", url, status);
            return Err(DirectoryError::Service { mirror, status });
        }

        response.json::<T>().await.map_err(|source| {
            if source.is_decode() {
                DirectoryError::InvalidResponse { mirror, source }
            } else {
                DirectoryError::Network { mirror, source }
            }
        })
    }

    /// Query string for a station search.
    ///
    /// Filtered searches pass text / tag / country; the default listing only
    /// asks for the click-count ordering. Both over-fetch so that filtering
    /// still leaves `limit` stations.
    fn search_params(&self, query: &StationQuery) -> Vec<(&'static str, String)> {
        let window = self.over_fetch.max(query.limit);
        let mut params = vec![
            ("limit", window.to_string()),
            ("offset", query.offset.to_string()),
            ("order", "clickcount".to_string()),
            ("reverse", "true".to_string()),
            ("hidebroken", "true".to_string()),
        ];
        if let Some(text) = query.text_filter() {
            params.push(("name", text.to_string()));
        }
        if let Some(tag) = query.tag_filter() {
            params.push(("tag", tag.to_string()));
        }
        if let Some(country) = query.country_filter().or(self.pinned_country.as_deref()) {
            params.push(("country", country.to_string()));
        }
        params
    }
}

impl StationSource for DirectoryClient {
    async fn search(&self, query: &StationQuery) -> Result<Vec<Station>, DirectoryError> {
        let params = self.search_params(query);
        let raw: Vec<RawStation> = self.fetch_json(STATIONS_SEARCH_PATH, &params).await?;
        let fetched = raw.len();
        let stations = self
            .filter
            .apply(raw.into_iter().filter_map(RawStation::into_station), query.limit);
        info!(
            "directory: {} query → {} raw, {} kept",
            if query.is_filtered() { "filtered" } else { "default" },
            fetched,
            stations.len()
        );
        Ok(stations)
    }

    async fn list_countries(&self) -> Result<Vec<Country>, DirectoryError> {
        let params = [
            ("order", "name".to_string()),
            ("hidebroken", "true".to_string()),
        ];
        let raw: Vec<RawCountry> = self.fetch_json(COUNTRIES_PATH, &params).await?;
        Ok(raw
            .into_iter()
            .filter_map(RawCountry::into_country)
            .filter(|c| c.stationcount > self.limits.min_country_stations)
            .take(self.limits.max_countries)
            .collect())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, DirectoryError> {
        let params = [
            ("order", "stationcount".to_string()),
            ("reverse", "true".to_string()),
            ("limit", self.limits.max_tags.to_string()),
            ("hidebroken", "true".to_string()),
        ];
        let raw: Vec<RawTag> = self.fetch_json(TAGS_PATH, &params).await?;
        Ok(raw
            .into_iter()
            .filter_map(RawTag::into_tag)
            .filter(|t| t.stationcount > 0)
            .take(self.limits.max_tags)
            .collect())
    }

    async fn report_click(&self, station_id: &str) -> Result<(), DirectoryError> {
        let path = format!("{}/{}", CLICK_PATH, station_id);
        let _: serde_json::Value = self.fetch_json(&path, &[]).await?;
        debug!("directory: reported click for {}", station_id);
        Ok(())
    }
}
