use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transition to {url} failed: {reason}")]
    Transition { url: String, reason: String },
    #[error("fade failed: {0}")]
    Fade(String),
    #[error("transport is unavailable")]
    Unavailable,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode state")]
    Encode(#[from] serde_json::Error),
    #[error("persisted state at {path} is invalid: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to read scene file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scene file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("scene has no playlists")]
    Empty,
    #[error("playlist {id} has no tracks")]
    EmptyPlaylist { id: String },
}
