use crate::model::{PlaybackMode, PlaybackState, Track};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            cover: track.cover.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullState {
    pub current_track: Option<TrackSummary>,
    pub is_playing: bool,
    pub playback_state: PlaybackState,
    pub mode: PlaybackMode,
    pub volume: f32,
    pub playlist: Vec<TrackSummary>,
    pub is_transitioning: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeUpdate {
    pub current_time: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Busy,
    EmptyPlaylist,
    AtFirstTrack,
    AtLastTrack,
    TrackFailed { title: String },
    PlaylistFailed { playlist_id: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("Please wait, a transition is in progress"),
            Self::EmptyPlaylist => f.write_str("Playlist is empty"),
            Self::AtFirstTrack => f.write_str("Already at the first track"),
            Self::AtLastTrack => f.write_str("Already at the last track"),
            Self::TrackFailed { title } => write!(f, "Could not play \"{title}\", skipping"),
            Self::PlaylistFailed { playlist_id } => {
                write!(f, "Every track in \"{playlist_id}\" failed, playback stopped")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PlayerEvent {
    State(FullState),
    Time(TimeUpdate),
    Notice(Notice),
}
