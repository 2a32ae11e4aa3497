use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use radiowave::directory::{DirectoryError, StationSource};
use radiowave::player::memory::{MemoryBackend, MemorySurface};
use radiowave::player::{AudioEvent, MediaControlSurface};
use radiowave::proto::config::Config;
use radiowave::proto::protocol::{Country, PlaybackPhase, Station, StationQuery, Tag};
use radiowave::proto::storage::{KeyValueStore, MemoryStore};
use radiowave::proto::theme::ThemeUpdate;
use radiowave::Radiowave;

#[derive(Default)]
struct FakeDirectory {
    searches: AtomicUsize,
    clicks: Arc<Mutex<Vec<String>>>,
}

fn station(id: &str) -> Station {
    Station {
        id: id.into(),
        name: format!("Station {id}"),
        stream_url: format!("http://{id}.example/live"),
        icon_url: Some(format!("https://img.example/{id}.png")),
        ..Station::default()
    }
}

impl StationSource for FakeDirectory {
    async fn search(&self, query: &StationQuery) -> Result<Vec<Station>, DirectoryError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        match query.search_text.as_str() {
            "" => Ok(vec![station("a"), station("b"), station("c")]),
            "offline" => Err(DirectoryError::NoMirrors),
            text => {
                if text.starts_with("slow-") {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok(vec![station(text)])
            }
        }
    }

    async fn list_countries(&self) -> Result<Vec<Country>, DirectoryError> {
        Ok(vec![Country {
            name: "Israel".into(),
            iso_3166_1: "IL".into(),
            stationcount: 180,
        }])
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, DirectoryError> {
        Ok(vec![Tag {
            name: "jazz".into(),
            stationcount: 900,
        }])
    }

    async fn report_click(&self, station_id: &str) -> Result<(), DirectoryError> {
        self.clicks.lock().unwrap().push(station_id.to_string());
        Ok(())
    }
}

struct App {
    app: Radiowave<FakeDirectory>,
    backend: MemoryBackend,
    surface: MemorySurface,
    store: Arc<MemoryStore>,
    clicks: Arc<Mutex<Vec<String>>>,
}

fn app_with_store(store: Arc<MemoryStore>) -> App {
    let backend = MemoryBackend::new();
    let surface = MemorySurface::new();
    let directory = FakeDirectory::default();
    let clicks = directory.clicks.clone();
    let host: Arc<dyn MediaControlSurface> = Arc::new(surface.clone());
    let app = Radiowave::with_source(
        Config::default(),
        directory,
        store.clone(),
        backend.clone(),
        Some(host),
    );
    App {
        app,
        backend,
        surface,
        store,
        clicks,
    }
}

fn app() -> App {
    app_with_store(Arc::new(MemoryStore::new()))
}

fn ids(views: &[radiowave::StationView]) -> Vec<&str> {
    views.iter().map(|v| v.station.id.as_str()).collect()
}

async fn eventually(f: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !f() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_views_mark_favorites_first_and_current() {
    let t = app();
    let query = t.app.default_query();
    assert_eq!(query.limit, 100);
    t.app.search(&query).await.unwrap();

    assert!(t.app.toggle_favorite("c").unwrap());
    t.app.play(station("b")).await.unwrap();

    let views = t.app.views();
    assert_eq!(ids(&views), vec!["c", "a", "b"]);
    assert!(views[0].is_favorite && !views[0].is_current);
    assert!(!views[2].is_favorite && views[2].is_current);
}

#[tokio::test]
async fn test_failed_search_is_an_error_not_an_empty_list() {
    let t = app();
    t.app.search(&t.app.default_query()).await.unwrap();
    let err = t.app.search(&StationQuery::search("offline", 10)).await;
    assert!(err.is_err());
    assert_eq!(t.app.views().len(), 3);
}

#[tokio::test]
async fn test_slow_older_search_does_not_replace_newer_listing() {
    let t = app();
    let slow = StationQuery::search("slow-old", 10);
    let fast = StationQuery::search("new", 10);
    let (older, newer) = tokio::join!(t.app.search(&slow), t.app.search(&fast));
    assert_eq!(ids(&newer.unwrap()), vec!["new"]);
    assert_eq!(ids(&older.unwrap()), vec!["slow-old"]);
    assert_eq!(ids(&t.app.views()), vec!["new"]);
}

#[tokio::test]
async fn test_lookups_pass_through() {
    let t = app();
    assert_eq!(t.app.countries().await.unwrap()[0].name, "Israel");
    assert_eq!(t.app.tags().await.unwrap()[0].name, "jazz");
}

#[tokio::test]
async fn test_next_and_previous_wrap_in_display_order() {
    let t = app();
    t.app.search(&t.app.default_query()).await.unwrap();
    t.app.toggle_favorite("c").unwrap();

    // Display order is c, a, b.
    t.app.next().await.unwrap();
    assert_eq!(t.app.session().snapshot().current_station_id(), Some("c"));
    t.app.next().await.unwrap();
    assert_eq!(t.app.session().snapshot().current_station_id(), Some("a"));
    t.app.previous().await.unwrap();
    t.app.previous().await.unwrap();
    assert_eq!(t.app.session().snapshot().current_station_id(), Some("b"));

    t.app.bridge().handle_named("nexttrack").await.unwrap();
    assert_eq!(t.app.session().snapshot().current_station_id(), Some("c"));
}

#[tokio::test]
async fn test_navigation_on_single_station_keeps_playing() {
    let t = app();
    t.app.search(&StationQuery::search("solo", 10)).await.unwrap();
    t.app.play(station("solo")).await.unwrap();
    t.backend.emit(AudioEvent::Playing);
    let mut watch = t.app.session().watch();
    tokio::time::timeout(Duration::from_secs(2), watch.wait_for(|s| s.phase == PlaybackPhase::Playing))
        .await
        .unwrap()
        .unwrap();

    t.app.next().await.unwrap();
    t.app.bridge().handle_named("previoustrack").await.unwrap();

    let state = t.app.session().snapshot();
    assert_eq!(state.phase, PlaybackPhase::Playing);
    assert_eq!(state.current_station_id(), Some("solo"));
    assert_eq!(t.backend.open_count(), 1);
}

#[tokio::test]
async fn test_navigation_on_empty_listing_is_noop() {
    let t = app();
    t.app.next().await.unwrap();
    assert_eq!(t.app.session().snapshot().phase, PlaybackPhase::Idle);
    assert_eq!(t.backend.open_count(), 0);
}

#[tokio::test]
async fn test_play_reports_click_once_per_start() {
    let t = app();
    t.app.play(station("a")).await.unwrap();
    t.backend.emit(AudioEvent::Playing);
    let mut watch = t.app.session().watch();
    tokio::time::timeout(Duration::from_secs(2), watch.wait_for(|s| s.phase == PlaybackPhase::Playing))
        .await
        .unwrap()
        .unwrap();

    // Second press pauses; no new click.
    t.app.play(station("a")).await.unwrap();
    assert_eq!(t.app.session().snapshot().phase, PlaybackPhase::Paused);

    let clicks = t.clicks.clone();
    eventually(move || clicks.lock().unwrap().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(t.clicks.lock().unwrap().as_slice(), ["a".to_string()]);
}

#[tokio::test]
async fn test_host_surface_sees_current_station() {
    let t = app();
    t.app.play(station("a")).await.unwrap();
    let surface = t.surface.clone();
    eventually(move || surface.metadata().map(|m| m.title) == Some("Station a".to_string())).await;
    assert_eq!(t.surface.metadata().unwrap().artist, "Radio");
}

#[tokio::test]
async fn test_favorites_and_theme_survive_restart() {
    let store = Arc::new(MemoryStore::new());
    {
        let t = app_with_store(store.clone());
        t.app.toggle_favorite("a").unwrap();
        t.app.toggle_favorite("b").unwrap();
        t.app.toggle_favorite("a").unwrap();
        t.app
            .update_theme(ThemeUpdate {
                background: Some("#121212".into()),
                ..ThemeUpdate::default()
            })
            .unwrap();
        assert_eq!(t.store.get("radio-favorites").unwrap().as_deref(), Some(r#"["b"]"#));
    }

    let t = app_with_store(store);
    assert_eq!(t.app.favorites(), vec!["b".to_string()]);
    assert!(t.app.is_favorite("b"));
    assert!(!t.app.is_favorite("a"));
    let theme = t.app.theme();
    assert_eq!(theme.background, "#121212");
    assert_eq!(theme.primary, "#5A618E");
    assert!(!theme.background_is_light());
}

#[tokio::test]
async fn test_start_persists_to_state_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.paths.state_dir = dir.path().join("state");
    config.player.default_volume = 0.4;

    let app = Radiowave::start(config, MemoryBackend::new(), None).unwrap();
    assert_eq!(app.session().snapshot().volume, 0.4);
    app.toggle_favorite("9617a958").unwrap();
    app.refresh();

    let written = std::fs::read_to_string(dir.path().join("state").join("radio-favorites.json")).unwrap();
    assert_eq!(written, r#"["9617a958"]"#);
}
