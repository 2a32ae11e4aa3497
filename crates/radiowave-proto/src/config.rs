use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Directory service endpoints and request shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Interchangeable mirror base URLs; one is picked at random per call.
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Raw records requested per call, leaving headroom for post-filtering.
    #[serde(default = "default_over_fetch")]
    pub over_fetch: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Restricts every station query to one country when set.
    #[serde(default)]
    pub pinned_country: Option<String>,
}

/// Content policy applied to every fetched station list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_require_icon")]
    pub require_icon: bool,
    /// Case-insensitive markers matched against the station language field.
    #[serde(default = "default_excluded_languages")]
    pub excluded_languages: Vec<String>,
    /// Countries need strictly more stations than this to be listed.
    #[serde(default = "default_min_country_stations")]
    pub min_country_stations: u64,
    #[serde(default = "default_max_countries")]
    pub max_countries: usize,
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_search_ttl_secs")]
    pub search_ttl_secs: u64,
    #[serde(default = "default_lookup_ttl_secs")]
    pub lookup_ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// Album label published to the host media controls.
    #[serde(default = "default_album")]
    pub album: String,
    #[serde(default = "default_artwork_sizes")]
    pub artwork_sizes: Vec<String>,
    /// Only look for mpv on PATH, never beside the executable.
    #[serde(default)]
    pub use_system_mpv: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding persisted key-value entries (favorites, theme).
    #[serde(default = "platform::state_dir")]
    pub state_dir: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            mirrors: default_mirrors(),
            user_agent: default_user_agent(),
            over_fetch: default_over_fetch(),
            default_limit: default_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            pinned_country: None,
        }
    }
}

impl DirectoryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            require_icon: default_require_icon(),
            excluded_languages: default_excluded_languages(),
            min_country_stations: default_min_country_stations(),
            max_countries: default_max_countries(),
            max_tags: default_max_tags(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            search_ttl_secs: default_search_ttl_secs(),
            lookup_ttl_secs: default_lookup_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }

    pub fn lookup_ttl(&self) -> Duration {
        Duration::from_secs(self.lookup_ttl_secs)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            album: default_album(),
            artwork_sizes: default_artwork_sizes(),
            use_system_mpv: false,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: platform::state_dir(),
        }
    }
}

fn default_mirrors() -> Vec<String> {
    [
        "https://de1.api.radio-browser.info",
        "https://nl1.api.radio-browser.info",
        "https://at1.api.radio-browser.info",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_user_agent() -> String {
    "RadioWave/1.0".to_string()
}

fn default_over_fetch() -> usize {
    200
}

fn default_limit() -> usize {
    100
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_require_icon() -> bool {
    true
}

fn default_excluded_languages() -> Vec<String> {
    vec!["arabic".to_string()]
}

fn default_min_country_stations() -> u64 {
    10
}

fn default_max_countries() -> usize {
    50
}

fn default_max_tags() -> usize {
    30
}

fn default_search_ttl_secs() -> u64 {
    5 * 60
}

fn default_lookup_ttl_secs() -> u64 {
    30 * 60
}

fn default_max_entries() -> usize {
    256
}

fn default_volume() -> f32 {
    0.7
}

fn default_album() -> String {
    "RadioWave".to_string()
}

fn default_artwork_sizes() -> Vec<String> {
    ["96x96", "128x128", "256x256"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// Load from the default location, writing defaults on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("reading config {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing config {}", config_path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config dir {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)
            .with_context(|| format!("writing config {}", config_path.display()))?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.directory.mirrors.len(), 3);
        assert!(config
            .directory
            .mirrors
            .iter()
            .all(|m| m.starts_with("https://")));
        assert_eq!(config.directory.over_fetch, 200);
        assert!(config.filter.require_icon);
        assert_eq!(config.filter.excluded_languages, vec!["arabic"]);
        assert_eq!(config.cache.search_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.lookup_ttl(), Duration::from_secs(1800));
        assert_eq!(config.player.default_volume, 0.7);
        assert!(config.paths.state_dir.ends_with("radiowave/state"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [filter]
            require_icon = false

            [directory]
            pinned_country = "Israel"
            "#,
        )
        .unwrap();
        assert!(!config.filter.require_icon);
        assert_eq!(config.filter.max_tags, 30);
        assert_eq!(config.directory.pinned_country.as_deref(), Some("Israel"));
        assert_eq!(config.directory.user_agent, "RadioWave/1.0");
        assert!(!config.player.use_system_mpv);

        let player: Config = toml::from_str("[player]\nuse_system_mpv = true").unwrap();
        assert!(player.player.use_system_mpv);
        assert_eq!(player.player.album, "RadioWave");
    }

    #[test]
    fn test_malformed_config_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache\nsearch_ttl_secs = 1").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.starts_with("parsing config"), "{}", message);
        assert!(message.contains(&path.display().to_string()), "{}", message);
    }

    #[test]
    fn test_load_writes_defaults_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.directory.mirrors, config.directory.mirrors);
    }
}
