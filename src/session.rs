use crate::config::{PlaylistSource, Scene};
use crate::model::{FinishRule, PersistedEntry, PlaybackState};
use crate::player::{Player, TransitionStyle};
use crate::queue::{EntryOrigin, QueueEntry};
use crate::trigger;
use indexmap::IndexSet;
use log::{debug, info, warn};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    pub context_id: Option<u64>,
    pub genesis_snapshot: Option<Value>,
    pub anchored_at_genesis: bool,
    pub base_playlist_id: Option<String>,
    pub autoplay: bool,
}

pub fn build_initial_queue(
    persisted: &[PersistedEntry],
    scene: &Scene,
    base: Option<&str>,
    finished_base: &IndexSet<String>,
    session: &SessionContext,
) -> Vec<QueueEntry> {
    let snapshot = session.genesis_snapshot.as_ref();
    let mut entries: Vec<QueueEntry> = Vec::new();

    for saved in persisted {
        let Some(definition) = scene.catalog.resolve(&saved.playlist_id) else {
            warn!("saved playlist {:?} no longer exists, dropping", saved.playlist_id);
            continue;
        };
        let origin = match &saved.trigger_source {
            None => {
                let current_base = base == Some(saved.playlist_id.as_str());
                if !current_base || entries.iter().any(QueueEntry::is_base) {
                    debug!("dropping stale base entry {:?}", saved.playlist_id);
                    continue;
                }
                EntryOrigin::Base
            }
            Some(source) => {
                if definition.on_finish == FinishRule::Pop {
                    debug!("dropping one-shot entry {:?}", saved.playlist_id);
                    continue;
                }
                let current = scene
                    .triggers
                    .iter()
                    .find(|candidate| trigger::functionally_equal(candidate, source))
                    .or_else(|| {
                        scene
                            .triggers
                            .iter()
                            .find(|candidate| candidate.playlist_id == saved.playlist_id)
                    });
                let Some(current) = current else {
                    debug!("no trigger targets {:?} anymore, dropping", saved.playlist_id);
                    continue;
                };
                if !trigger::evaluate(current, snapshot) {
                    debug!("trigger for {:?} no longer holds, dropping", saved.playlist_id);
                    continue;
                }
                EntryOrigin::Trigger(current.clone())
            }
        };
        entries.push(QueueEntry::restore(definition, saved, origin));
    }

    for candidate in &scene.triggers {
        let queued = entries.iter().any(|entry| {
            entry
                .trigger()
                .is_some_and(|source| trigger::functionally_equal(source, candidate))
        });
        if queued || !trigger::evaluate(candidate, snapshot) {
            continue;
        }
        let Some(definition) = scene.catalog.resolve(&candidate.playlist_id) else {
            continue;
        };
        if definition.on_finish == FinishRule::Pop && !session.anchored_at_genesis {
            debug!("one-shot {:?} only starts with a fresh conversation", candidate.playlist_id);
            continue;
        }
        entries.push(QueueEntry::triggered(definition, candidate.clone()));
    }

    if let Some(base_id) = base
        && !entries.iter().any(QueueEntry::is_base)
    {
        match scene.catalog.resolve(base_id) {
            Some(_) if finished_base.contains(base_id) => {
                info!("base playlist {base_id:?} already finished in this context");
            }
            Some(definition) => entries.push(QueueEntry::base(definition)),
            None => warn!("base playlist {base_id:?} is not in the catalog"),
        }
    }
    entries
}

impl Player {
    pub async fn start_session(&self, session: SessionContext) {
        let saved = match self.store.read() {
            Ok(saved) => saved.unwrap_or_default(),
            Err(err) => {
                warn!("ignoring unreadable player state: {err}");
                Default::default()
            }
        };
        let base = self.scene.base_playlist_for(session.base_playlist_id.as_deref());

        let (volume, url) = {
            let mut core = self.core.borrow_mut();
            core.restore_from(&saved);
            if core.last_context_id.is_some() && core.last_context_id != session.context_id {
                info!("new conversation, forgetting finished base playlists");
                core.finished_base.clear();
            }
            core.last_context_id = session.context_id;

            let entries = build_initial_queue(
                &saved.active_queue,
                &self.scene,
                base.as_deref(),
                &core.finished_base,
                &session,
            );
            core.queue.replace(entries);
            core.notify_queue_changed();
            info!(
                "session started with {} queued playlists in {} mode",
                core.queue.len(),
                core.mode().label()
            );
            (core.volume, core.current_track().map(|track| track.url.clone()))
        };

        self.transport.set_volume(volume);
        if let Some(url) = &url
            && let Err(err) = self.transport.load_silently(url).await
        {
            warn!("failed to load {url}: {err}");
        }

        let baseline = session
            .genesis_snapshot
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        self.core.borrow_mut().baseline = baseline.clone();
        if let Err(err) = self.store.write_baseline(&baseline) {
            warn!("failed to persist baseline snapshot: {err}");
        }
        self.persist();
        self.broadcast_state();

        if session.autoplay && url.is_some() {
            let _guard = self.acquire();
            self.genesis_play().await;
        }
    }

    async fn genesis_play(&self) {
        let index = self
            .core
            .borrow()
            .queue
            .head()
            .map_or(0, |head| head.current_index);
        self.set_playback(PlaybackState::Playing);
        self.broadcast_state();
        if let Err(err) = self.execute_transition(index, TransitionStyle::Smooth).await {
            warn!("autoplay failed, staying stopped: {err}");
            self.set_playback(PlaybackState::Stopped);
        }
    }
}
