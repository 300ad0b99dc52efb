use crate::error::{SceneError, StateError};
use crate::model::{Condition, ExpectedValue, PersistedState, PlaylistDefinition, Trigger};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "scenetune";
const STATE_FILE: &str = "state.json";
const BASELINE_FILE: &str = "baseline.json";
const SETTINGS_FILE: &str = "settings.json";
pub const TEXT_TAG_PATH: &str = "virtual.music_tag";

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var("SCENETUNE_CONFIG_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let home = env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u64,
    #[serde(default = "default_crossfade_ms")]
    pub crossfade_ms: u64,
    #[serde(default = "default_fade_step_ms")]
    pub fade_step_ms: u64,
    #[serde(default = "default_scan_window")]
    pub scan_window: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_volume")]
    pub default_volume: f32,
}

fn default_fade_ms() -> u64 {
    400
}

fn default_crossfade_ms() -> u64 {
    500
}

fn default_fade_step_ms() -> u64 {
    50
}

fn default_scan_window() -> usize {
    20
}

fn default_event_capacity() -> usize {
    64
}

fn default_volume() -> f32 {
    crate::model::default_volume()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fade_ms: default_fade_ms(),
            crossfade_ms: default_crossfade_ms(),
            fade_step_ms: default_fade_step_ms(),
            scan_window: default_scan_window(),
            event_capacity: default_event_capacity(),
            default_volume: default_volume(),
        }
    }
}

pub fn load_settings(root: &Path) -> Result<Settings> {
    let path = root.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(Settings::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    Ok(settings)
}

pub trait StateStore {
    fn read(&self) -> Result<Option<PersistedState>, StateError>;
    fn write(&self, state: &PersistedState) -> Result<(), StateError>;
    fn read_baseline(&self) -> Result<Option<Value>, StateError>;
    fn write_baseline(&self, snapshot: &Value) -> Result<(), StateError>;
}

#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(config_root()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> Result<(), StateError> {
        fs::create_dir_all(&self.root).map_err(|source| StateError::Io {
            path: self.root.clone(),
            source,
        })
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, file: &str) -> Result<Option<T>, StateError> {
        let path = self.root.join(file);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| StateError::Invalid {
                path,
                reason: err.to_string(),
            })
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), StateError> {
        self.ensure_root()?;
        let path = self.root.join(file);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|source| StateError::Io { path, source })
    }
}

impl StateStore for FileStateStore {
    fn read(&self) -> Result<Option<PersistedState>, StateError> {
        let Some(state) = self.read_json::<PersistedState>(STATE_FILE)? else {
            return Ok(None);
        };
        if !state.is_valid() {
            return Err(StateError::Invalid {
                path: self.root.join(STATE_FILE),
                reason: format!("volume {} is outside 0..=1", state.volume),
            });
        }
        Ok(Some(state))
    }

    fn write(&self, state: &PersistedState) -> Result<(), StateError> {
        self.write_json(STATE_FILE, state)
    }

    fn read_baseline(&self) -> Result<Option<Value>, StateError> {
        self.read_json(BASELINE_FILE)
    }

    fn write_baseline(&self, snapshot: &Value) -> Result<(), StateError> {
        self.write_json(BASELINE_FILE, snapshot)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RefCell<Option<PersistedState>>,
    baseline: RefCell<Option<Value>>,
    writes: Cell<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        let store = Self::default();
        store.state.replace(Some(state));
        store
    }

    pub fn snapshot(&self) -> Option<PersistedState> {
        self.state.borrow().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl StateStore for MemoryStateStore {
    fn read(&self) -> Result<Option<PersistedState>, StateError> {
        match self.state.borrow().as_ref() {
            Some(state) if !state.is_valid() => Err(StateError::Invalid {
                path: PathBuf::from("<memory>"),
                reason: format!("volume {} is outside 0..=1", state.volume),
            }),
            other => Ok(other.cloned()),
        }
    }

    fn write(&self, state: &PersistedState) -> Result<(), StateError> {
        self.state.replace(Some(state.clone()));
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn read_baseline(&self) -> Result<Option<Value>, StateError> {
        Ok(self.baseline.borrow().clone())
    }

    fn write_baseline(&self, snapshot: &Value) -> Result<(), StateError> {
        self.baseline.replace(Some(snapshot.clone()));
        Ok(())
    }
}

pub trait PlaylistSource {
    fn resolve(&self, playlist_id: &str) -> Option<&PlaylistDefinition>;
}

#[derive(Debug, Clone, Default)]
pub struct SceneCatalog {
    playlists: IndexMap<String, PlaylistDefinition>,
}

impl SceneCatalog {
    pub fn new(playlists: impl IntoIterator<Item = PlaylistDefinition>) -> Self {
        Self {
            playlists: playlists
                .into_iter()
                .map(|playlist| (playlist.id.clone(), playlist))
                .collect(),
        }
    }

    pub fn contains(&self, playlist_id: &str) -> bool {
        self.playlists.contains_key(playlist_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.playlists.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }
}

impl PlaylistSource for SceneCatalog {
    fn resolve(&self, playlist_id: &str) -> Option<&PlaylistDefinition> {
        self.playlists.get(playlist_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationMode {
    #[default]
    Variables,
    TextTags,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub default_playlist_id: Option<String>,
    pub playlists: Vec<PlaylistDefinition>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub text_tags: bool,
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub catalog: SceneCatalog,
    pub triggers: Vec<Trigger>,
    pub default_playlist_id: Option<String>,
    pub mode: IntegrationMode,
}

impl Scene {
    pub fn base_playlist_for(&self, requested: Option<&str>) -> Option<String> {
        if let Some(id) = requested {
            if self.catalog.contains(id) {
                return Some(id.to_string());
            }
            warn!("requested base playlist {id:?} is unknown, using the scene default");
        }
        self.default_playlist_id.clone()
    }
}

fn fallback_title(url: &str) -> String {
    url.rsplit('/')
        .next()
        .and_then(|name| name.split('?').next())
        .filter(|name| !name.is_empty())
        .map_or_else(|| String::from("Unknown track"), str::to_string)
}

impl SceneConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let raw = fs::read_to_string(path).map_err(|source| SceneError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SceneError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn into_scene(self) -> Result<Scene, SceneError> {
        if self.playlists.is_empty() {
            return Err(SceneError::Empty);
        }
        if let Some(playlist) = self.playlists.iter().find(|playlist| playlist.tracks.is_empty()) {
            return Err(SceneError::EmptyPlaylist {
                id: playlist.id.clone(),
            });
        }

        let playlists = self.playlists.into_iter().map(|mut playlist| {
            for track in &mut playlist.tracks {
                if track.title.trim().is_empty() {
                    track.title = fallback_title(&track.url);
                }
            }
            playlist
        });
        let catalog = SceneCatalog::new(playlists);

        let (mode, triggers) = if self.text_tags {
            let implicit = catalog
                .ids()
                .map(|id| {
                    Trigger::new(
                        id,
                        0.0,
                        vec![Condition::new(TEXT_TAG_PATH).equals(ExpectedValue::Text(id.to_lowercase()))],
                    )
                })
                .collect();
            (IntegrationMode::TextTags, implicit)
        } else {
            let known = self
                .triggers
                .into_iter()
                .filter(|trigger| {
                    let exists = catalog.contains(&trigger.playlist_id);
                    if !exists {
                        warn!("dropping trigger for unknown playlist {:?}", trigger.playlist_id);
                    }
                    exists
                })
                .collect();
            (IntegrationMode::Variables, known)
        };

        let default_playlist_id = self.default_playlist_id.filter(|id| {
            let exists = catalog.contains(id);
            if !exists {
                warn!("default playlist {id:?} is not defined");
            }
            exists
        });

        Ok(Scene {
            catalog,
            triggers,
            default_playlist_id,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FinishRule, PlaybackMode};
    use tempfile::tempdir;

    const SCENE: &str = r#"{
        "default_playlist_id": "calm",
        "playlists": [
            {"id": "calm", "tracks": [{"url": "https://cdn.test/music/river.mp3?v=2", "title": ""}]},
            {"id": "Battle", "on_finish_rule": "pop", "tracks": [{"url": "b.mp3", "title": "Drums"}]}
        ],
        "triggers": [
            {"playlist_id": "Battle", "priority": 5, "conditions": [{"variable_path": "fight", "value": true}]},
            {"playlist_id": "ghost", "conditions": [{"variable_path": "x", "value": 1}]}
        ]
    }"#;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().expect("tempdir");
        let store = FileStateStore::new(dir.path().join("nested"));
        assert!(store.read().expect("read").is_none());

        let state = PersistedState {
            mode: PlaybackMode::Shuffle,
            last_active_context_id: Some(3),
            ..PersistedState::default()
        };
        store.write(&state).expect("save");
        let loaded = store.read().expect("load").expect("present");
        assert_eq!(loaded.mode, PlaybackMode::Shuffle);
        assert_eq!(loaded.last_active_context_id, Some(3));

        store
            .write_baseline(&serde_json::json!({"mood": "calm"}))
            .expect("baseline");
        assert_eq!(
            store.read_baseline().expect("read baseline"),
            Some(serde_json::json!({"mood": "calm"}))
        );
    }

    #[test]
    fn invalid_state_file_is_reported() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(STATE_FILE), r#"{"volume": 4.0}"#).expect("write");
        let store = FileStateStore::new(dir.path());
        assert!(matches!(store.read(), Err(StateError::Invalid { .. })));

        fs::write(dir.path().join(STATE_FILE), "not json").expect("write");
        assert!(matches!(store.read(), Err(StateError::Invalid { .. })));
    }

    #[test]
    fn settings_default_when_missing() {
        let dir = tempdir().expect("tempdir");
        assert_eq!(load_settings(dir.path()).expect("settings"), Settings::default());

        fs::write(dir.path().join(SETTINGS_FILE), r#"{"fade_ms": 100}"#).expect("write");
        let settings = load_settings(dir.path()).expect("settings");
        assert_eq!(settings.fade_ms, 100);
        assert_eq!(settings.crossfade_ms, 500);
    }

    #[test]
    fn scene_normalises_titles_and_drops_orphan_triggers() {
        let scene = SceneConfig::from_json(SCENE)
            .expect("parse")
            .into_scene()
            .expect("scene");
        let calm = scene.catalog.resolve("calm").expect("calm");
        assert_eq!(calm.tracks[0].title, "river.mp3");
        assert_eq!(calm.on_finish, FinishRule::Loop);
        assert_eq!(scene.triggers.len(), 1);
        assert_eq!(scene.mode, IntegrationMode::Variables);
        assert_eq!(scene.base_playlist_for(Some("nope")), Some(String::from("calm")));
        assert_eq!(scene.base_playlist_for(Some("Battle")), Some(String::from("Battle")));
    }

    #[test]
    fn text_tag_scenes_get_implicit_triggers() {
        let mut config = SceneConfig::from_json(SCENE).expect("parse");
        config.text_tags = true;
        let scene = config.into_scene().expect("scene");
        assert_eq!(scene.mode, IntegrationMode::TextTags);
        assert_eq!(scene.triggers.len(), 2);
        let battle = &scene.triggers[1];
        assert_eq!(battle.playlist_id, "Battle");
        assert_eq!(battle.priority, 0.0);
        assert_eq!(battle.conditions[0].variable_path, TEXT_TAG_PATH);
        assert_eq!(
            battle.conditions[0].value,
            Some(ExpectedValue::Text(String::from("battle")))
        );
    }

    #[test]
    fn empty_scene_is_rejected() {
        let config = SceneConfig::from_json(r#"{"playlists": []}"#).expect("parse");
        assert!(matches!(config.into_scene(), Err(SceneError::Empty)));
    }

    #[test]
    fn playlist_without_tracks_is_rejected() {
        let config = SceneConfig::from_json(
            r#"{"default_playlist_id": "void", "playlists": [
                {"id": "calm", "tracks": [{"url": "c.mp3", "title": "c"}]},
                {"id": "void", "tracks": []}
            ]}"#,
        )
        .expect("parse");
        match config.into_scene() {
            Err(SceneError::EmptyPlaylist { id }) => assert_eq!(id, "void"),
            other => panic!("expected EmptyPlaylist, got {other:?}"),
        }
    }

    #[test]
    fn memory_store_counts_writes() {
        let store = MemoryStateStore::new();
        store.write(&PersistedState::default()).expect("write");
        store.write(&PersistedState::default()).expect("write");
        assert_eq!(store.writes(), 2);
        assert!(store.snapshot().is_some());
    }
}
