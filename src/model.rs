use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl Track {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            artist: None,
            cover: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FinishRule {
    #[default]
    Loop,
    Pop,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistDefinition {
    pub id: String,
    pub tracks: Vec<Track>,
    #[serde(default, rename = "on_finish_rule")]
    pub on_finish: FinishRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    #[default]
    #[serde(alias = "list")]
    Sequential,
    Single,
    #[serde(alias = "random")]
    Shuffle,
}

impl PlaybackMode {
    pub fn next(self) -> Self {
        match self {
            Self::Sequential => Self::Single,
            Self::Single => Self::Shuffle,
            Self::Shuffle => Self::Sequential,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Single => "single",
            Self::Shuffle => "shuffle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for ExpectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pub variable_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ExpectedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greater_than: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greater_than_or_equal_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub less_than: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub less_than_or_equal_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_range: Option<String>,
}

impl Condition {
    pub fn new(variable_path: impl Into<String>) -> Self {
        Self {
            variable_path: variable_path.into(),
            ..Self::default()
        }
    }

    pub fn equals(mut self, value: ExpectedValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn contains(mut self, needle: impl Into<String>) -> Self {
        self.value_contains = Some(needle.into());
        self
    }

    pub fn greater_than(mut self, bound: f64) -> Self {
        self.greater_than = Some(bound);
        self
    }

    pub fn at_least(mut self, bound: f64) -> Self {
        self.greater_than_or_equal_to = Some(bound);
        self
    }

    pub fn less_than(mut self, bound: f64) -> Self {
        self.less_than = Some(bound);
        self
    }

    pub fn at_most(mut self, bound: f64) -> Self {
        self.less_than_or_equal_to = Some(bound);
        self
    }

    pub fn within(mut self, range: impl Into<String>) -> Self {
        self.time_in_range = Some(range.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub playlist_id: String,
    #[serde(default)]
    pub priority: f64,
    pub conditions: Vec<Condition>,
}

impl Trigger {
    pub fn new(playlist_id: impl Into<String>, priority: f64, conditions: Vec<Condition>) -> Self {
        Self {
            playlist_id: playlist_id.into(),
            priority,
            conditions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub playlist_id: String,
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub played_indices: Vec<usize>,
    #[serde(default)]
    pub was_ever_played: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_source: Option<Trigger>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub active_queue: Vec<PersistedEntry>,
    #[serde(default)]
    pub mode: PlaybackMode,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub last_active_context_id: Option<u64>,
    #[serde(default)]
    pub finished_base_playlists: Vec<String>,
}

pub(crate) fn default_volume() -> f32 {
    0.5
}

impl PersistedState {
    pub fn is_valid(&self) -> bool {
        self.volume.is_finite() && (0.0..=1.0).contains(&self.volume)
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            active_queue: Vec::new(),
            mode: PlaybackMode::Sequential,
            volume: default_volume(),
            last_active_context_id: None,
            finished_base_playlists: Vec::new(),
        }
    }
}
