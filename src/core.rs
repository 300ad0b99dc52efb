use crate::events::{FullState, TrackSummary};
use crate::model::{PersistedState, PlaybackMode, PlaybackState, Track};
use crate::queue::QueueStore;
use crate::strategy::StrategyRouter;
use indexmap::IndexSet;
use log::info;
use serde_json::{Map, Value};

#[derive(Debug)]
pub struct PlayerCore {
    pub queue: QueueStore,
    pub router: StrategyRouter,
    pub playback: PlaybackState,
    pub volume: f32,
    pub finished_base: IndexSet<String>,
    pub last_context_id: Option<u64>,
    pub is_transitioning: bool,
    pub baseline: Value,
}

impl PlayerCore {
    pub fn new(router: StrategyRouter, volume: f32) -> Self {
        Self {
            queue: QueueStore::new(),
            router,
            playback: PlaybackState::Stopped,
            volume: volume.clamp(0.0, 1.0),
            finished_base: IndexSet::new(),
            last_context_id: None,
            is_transitioning: false,
            baseline: Value::Object(Map::new()),
        }
    }

    pub fn restore_from(&mut self, state: &PersistedState) {
        self.router.set_mode(state.mode);
        self.volume = state.volume.clamp(0.0, 1.0);
        self.finished_base = state.finished_base_playlists.iter().cloned().collect();
        self.last_context_id = state.last_active_context_id;
    }

    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            active_queue: self
                .queue
                .entries()
                .iter()
                .map(|entry| entry.to_persisted())
                .collect(),
            mode: self.router.mode(),
            volume: self.volume,
            last_active_context_id: self.last_context_id,
            finished_base_playlists: self.finished_base.iter().cloned().collect(),
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.router.mode()
    }

    pub fn set_playback(&mut self, next: PlaybackState) {
        if self.playback != next {
            info!("playback {:?} -> {:?}", self.playback, next);
        }
        self.playback = next;
    }

    pub fn notify_queue_changed(&mut self) {
        self.router.notify_queue_changed(&mut self.queue);
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.queue.head().and_then(|head| head.current_track())
    }

    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.queue.head().and_then(|head| head.tracks.get(index))
    }

    pub fn following_track(&self) -> Option<&Track> {
        let head = self.queue.head()?;
        head.tracks.get(head.current_index + 1)
    }

    pub fn full_state(&self) -> FullState {
        FullState {
            current_track: self.current_track().map(TrackSummary::from),
            is_playing: self.playback == PlaybackState::Playing,
            playback_state: self.playback,
            mode: self.mode(),
            volume: self.volume,
            playlist: self
                .queue
                .head()
                .map(|head| head.tracks.iter().map(TrackSummary::from).collect())
                .unwrap_or_default(),
            is_transitioning: self.is_transitioning,
        }
    }
}
