use crate::config::{IntegrationMode, PlaylistSource};
use crate::model::PlaybackState;
use crate::player::{Player, TransitionStyle};
use crate::queue::QueueEntry;
use crate::trigger::{self, EdgeReport};
use log::{debug, info, warn};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileEvent {
    pub snapshot: Option<Value>,
    pub style: TransitionStyle,
}

impl ReconcileEvent {
    pub fn with_snapshot(snapshot: Value) -> Self {
        Self {
            snapshot: Some(snapshot),
            style: TransitionStyle::Smooth,
        }
    }

    pub fn hard(mut self) -> Self {
        self.style = TransitionStyle::Hard;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Dropped,
    Unchanged,
    Switched { from: Option<String>, to: String },
    Drained,
}

pub fn apply_edges(
    mut entries: Vec<QueueEntry>,
    report: &EdgeReport,
    catalog: &dyn PlaylistSource,
) -> Vec<QueueEntry> {
    entries.retain(|entry| {
        let Some(source) = entry.trigger() else {
            return true;
        };
        let gone = report
            .newly_inactive
            .iter()
            .any(|inactive| trigger::functionally_equal(source, inactive));
        if gone {
            info!("trigger for {:?} went inactive, dequeuing", entry.playlist_id);
        }
        !gone
    });

    for active in &report.newly_active {
        let queued = entries.iter().any(|entry| {
            entry
                .trigger()
                .is_some_and(|source| trigger::functionally_equal(source, active))
        });
        if queued {
            continue;
        }
        let Some(definition) = catalog.resolve(&active.playlist_id) else {
            warn!("trigger targets unknown playlist {:?}, skipping", active.playlist_id);
            continue;
        };
        info!(
            "trigger for {:?} became active at priority {}",
            active.playlist_id, active.priority
        );
        entries.push(QueueEntry::triggered(definition, active.clone()));
    }
    entries
}

struct ReconcileFlight<'a> {
    player: &'a Player,
}

impl Drop for ReconcileFlight<'_> {
    fn drop(&mut self) {
        self.player.reconciling.set(false);
    }
}

impl Player {
    pub async fn reconcile(&self, event: ReconcileEvent) -> ReconcileOutcome {
        if self.reconciling.replace(true) {
            warn!("reconcile already running, dropping event");
            return ReconcileOutcome::Dropped;
        }
        let _flight = ReconcileFlight { player: self };
        let _effect = self.acquire();

        let snapshot = self.current_snapshot(event.snapshot).await;
        let baseline = std::mem::replace(&mut self.core.borrow_mut().baseline, snapshot.clone());
        let report = trigger::diff(Some(&baseline), Some(&snapshot), &self.scene.triggers);
        debug!(
            "{} triggers activated, {} deactivated",
            report.newly_active.len(),
            report.newly_inactive.len()
        );

        let (old_head, new_head) = {
            let mut core = self.core.borrow_mut();
            let old_head = core.queue.head().map(|head| head.playlist_id.clone());
            let entries = apply_edges(core.queue.to_vec(), &report, &self.scene.catalog);
            core.queue.replace(entries);
            (old_head, core.queue.head().map(|head| head.playlist_id.clone()))
        };

        let outcome = match new_head {
            Some(to) if old_head.as_deref() != Some(to.as_str()) => {
                info!("head changed {old_head:?} -> {to:?}");
                self.enter_new_head(event.style, old_head.is_none()).await;
                ReconcileOutcome::Switched { from: old_head, to }
            }
            Some(_) => ReconcileOutcome::Unchanged,
            None if old_head.is_some() => {
                info!("queue drained by reconcile");
                if let Err(err) = self.transport.fade_out_and_pause().await {
                    warn!("failed to silence transport: {err}");
                }
                let mut core = self.core.borrow_mut();
                core.set_playback(PlaybackState::Stopped);
                core.notify_queue_changed();
                ReconcileOutcome::Drained
            }
            None => ReconcileOutcome::Unchanged,
        };

        if let Err(err) = self.store.write_baseline(&snapshot) {
            warn!("failed to persist baseline snapshot: {err}");
        }
        outcome
    }

    async fn current_snapshot(&self, supplied: Option<Value>) -> Value {
        let snapshot = match self.scene.mode {
            IntegrationMode::TextTags => self.snapshots.fetch().await,
            IntegrationMode::Variables => match supplied {
                Some(snapshot) => Some(snapshot),
                None => self.snapshots.fetch().await,
            },
        };
        snapshot.unwrap_or_else(|| Value::Object(Map::new()))
    }

    async fn enter_new_head(&self, style: TransitionStyle, from_empty: bool) {
        let (target, playback, url) = {
            let mut core = self.core.borrow_mut();
            core.notify_queue_changed();
            core.queue.mark_played();
            let target = core.queue.head().map_or(0, |head| head.current_index);
            let url = core.track_at(target).map(|track| track.url.clone());
            (target, core.playback, url)
        };

        let result = match playback {
            PlaybackState::Playing => self.execute_transition(target, style).await,
            PlaybackState::Stopped if from_empty => {
                info!("first playlist arrived, starting playback");
                self.set_playback(PlaybackState::Playing);
                self.broadcast_state();
                self.execute_transition(target, TransitionStyle::Smooth).await
            }
            _ => {
                if let Some(url) = url
                    && let Err(err) = self.transport.load_silently(&url).await
                {
                    warn!("failed to load {url} silently: {err}");
                }
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!("switch to new head failed: {err}");
            self.self_heal().await;
        }
    }
}
