use crate::config::{Scene, Settings, StateStore};
use crate::core::PlayerCore;
use crate::error::TransportError;
use crate::events::{FullState, Notice, PlayerEvent, TimeUpdate};
use crate::model::{PlaybackMode, PlaybackState};
use crate::narrative::SnapshotSource;
use crate::navigation::{self, Directive};
use crate::strategy::{Decision, Direction, StrategyRouter};
use crate::transport::PlaybackTransport;
use log::{debug, info, warn};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    Rejected,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionStyle {
    #[default]
    Smooth,
    Hard,
}

#[derive(Clone)]
pub struct Collaborators {
    pub transport: Rc<dyn PlaybackTransport>,
    pub store: Rc<dyn StateStore>,
    pub snapshots: Rc<dyn SnapshotSource>,
}

pub struct Player {
    pub(crate) core: RefCell<PlayerCore>,
    pub(crate) scene: Scene,
    pub(crate) transport: Rc<dyn PlaybackTransport>,
    pub(crate) store: Rc<dyn StateStore>,
    pub(crate) snapshots: Rc<dyn SnapshotSource>,
    events: broadcast::Sender<PlayerEvent>,
    effect_depth: Cell<usize>,
    pub(crate) reconciling: Cell<bool>,
}

pub struct EffectGuard<'a> {
    player: &'a Player,
}

impl Drop for EffectGuard<'_> {
    fn drop(&mut self) {
        let depth = self.player.effect_depth.get().saturating_sub(1);
        self.player.effect_depth.set(depth);
        if depth > 0 {
            return;
        }
        if let Ok(mut core) = self.player.core.try_borrow_mut() {
            core.is_transitioning = false;
        }
        debug!("effect lock released");
        self.player.broadcast_state();
        self.player.persist();
    }
}

impl Player {
    pub fn new(scene: Scene, settings: &Settings, parts: Collaborators) -> Self {
        let router = StrategyRouter::new(PlaybackMode::Sequential);
        Self::with_router(scene, settings, parts, router)
    }

    pub fn with_router(
        scene: Scene,
        settings: &Settings,
        parts: Collaborators,
        router: StrategyRouter,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        Self {
            core: RefCell::new(PlayerCore::new(router, settings.default_volume)),
            scene,
            transport: parts.transport,
            store: parts.store,
            snapshots: parts.snapshots,
            events,
            effect_depth: Cell::new(0),
            reconciling: Cell::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn state(&self) -> FullState {
        self.core.borrow().full_state()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.core.borrow().playback
    }

    pub fn inspect<R>(&self, f: impl FnOnce(&PlayerCore) -> R) -> R {
        f(&self.core.borrow())
    }

    pub fn is_busy(&self) -> bool {
        self.effect_depth.get() > 0
    }

    pub(crate) fn acquire(&self) -> EffectGuard<'_> {
        self.effect_depth.set(self.effect_depth.get() + 1);
        self.core.borrow_mut().is_transitioning = true;
        self.broadcast_state();
        EffectGuard { player: self }
    }

    fn try_acquire(&self) -> Option<EffectGuard<'_>> {
        if self.is_busy() {
            warn!("command rejected, an effect is in progress");
            self.notify(Notice::Busy);
            return None;
        }
        Some(self.acquire())
    }

    fn begin(&self) -> Result<EffectGuard<'_>, CommandOutcome> {
        if !self.is_busy() && self.core.borrow().queue.is_empty() {
            debug!("command ignored, queue is empty");
            return Err(CommandOutcome::Ignored);
        }
        self.try_acquire().ok_or(CommandOutcome::Rejected)
    }

    pub(crate) fn broadcast_state(&self) {
        let state = self.core.borrow().full_state();
        let _ = self.events.send(PlayerEvent::State(state));
    }

    pub(crate) fn notify(&self, notice: Notice) {
        info!("{notice}");
        let _ = self.events.send(PlayerEvent::Notice(notice));
    }

    pub(crate) fn persist(&self) {
        let Ok(core) = self.core.try_borrow() else {
            warn!("state busy, skipping persistence");
            return;
        };
        if let Err(err) = self.store.write(&core.persisted_state()) {
            warn!("failed to persist player state: {err}");
        }
    }

    pub(crate) fn set_playback(&self, state: PlaybackState) {
        self.core.borrow_mut().set_playback(state);
    }

    pub(crate) async fn execute_transition(
        &self,
        index: usize,
        style: TransitionStyle,
    ) -> Result<(), TransportError> {
        let (url, volume) = {
            let core = self.core.borrow();
            if core.queue.head().is_none() {
                warn!("transition to {index} skipped, queue is empty");
                return Ok(());
            }
            let Some(track) = core.track_at(index) else {
                return Err(TransportError::Transition {
                    url: String::new(),
                    reason: format!("no track at index {index}"),
                });
            };
            (track.url.clone(), core.volume)
        };

        match style {
            TransitionStyle::Smooth => self.transport.transition(&url, volume).await?,
            TransitionStyle::Hard => self.transport.hard_cut(&url, volume).await?,
        }

        let upcoming = {
            let mut core = self.core.borrow_mut();
            core.set_playback(PlaybackState::Playing);
            core.following_track().map(|track| track.url.clone())
        };
        if let Some(next_url) = upcoming {
            self.transport.preload(&next_url);
        }
        Ok(())
    }

    pub(crate) async fn apply_decision(&self, decision: Decision) -> Directive {
        let directive = navigation::apply(&mut self.core.borrow_mut(), decision);
        if directive == Directive::Silence
            && let Err(err) = self.transport.fade_out_and_pause().await
        {
            warn!("failed to silence transport: {err}");
        }
        self.broadcast_state();
        directive
    }

    async fn recover(&self, result: Result<(), TransportError>) {
        if let Err(err) = result {
            warn!("playback failed: {err}");
            self.self_heal().await;
        }
    }

    pub async fn toggle_play_pause(&self) -> CommandOutcome {
        if !self.is_busy() && self.core.borrow().queue.is_empty() {
            self.notify(Notice::EmptyPlaylist);
            return CommandOutcome::Ignored;
        }
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(outcome) => return outcome,
        };

        let (playback, index, volume) = {
            let core = self.core.borrow();
            let index = core.queue.head().map_or(0, |head| head.current_index);
            (core.playback, index, core.volume)
        };
        info!("toggle from {playback:?}");

        let result = match playback {
            PlaybackState::Stopped => {
                self.set_playback(PlaybackState::Playing);
                self.broadcast_state();
                self.execute_transition(index, TransitionStyle::Smooth).await
            }
            PlaybackState::Playing => {
                self.set_playback(PlaybackState::Paused);
                self.broadcast_state();
                self.transport.fade_out_and_pause().await
            }
            PlaybackState::Paused => {
                self.set_playback(PlaybackState::Playing);
                self.broadcast_state();
                self.transport.resume_fade_in(volume).await
            }
        };
        self.recover(result).await;
        CommandOutcome::Applied
    }

    pub async fn play_next(&self) -> CommandOutcome {
        self.navigate(Direction::Next).await
    }

    pub async fn play_prev(&self) -> CommandOutcome {
        self.navigate(Direction::Prev).await
    }

    async fn navigate(&self, direction: Direction) -> CommandOutcome {
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(outcome) => return outcome,
        };

        let Some(decision) = self.decide(|core, head| core.router.active().advance(head, direction)) else {
            return CommandOutcome::Ignored;
        };
        let directive = self.apply_decision(decision).await;

        let result = match (decision, directive.target_index()) {
            (Decision::Restart, _) => {
                self.restart_in_place().await;
                if self.core.borrow().mode() != PlaybackMode::Single {
                    self.notify(Notice::AtFirstTrack);
                }
                Ok(())
            }
            (_, Some(index)) => self.execute_transition(index, TransitionStyle::Smooth).await,
            (Decision::DoNothing, None) => {
                self.notify(match direction {
                    Direction::Next => Notice::AtLastTrack,
                    Direction::Prev => Notice::AtFirstTrack,
                });
                Ok(())
            }
            (_, None) => Ok(()),
        };
        self.recover(result).await;
        CommandOutcome::Applied
    }

    pub async fn track_ended(&self) -> CommandOutcome {
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(outcome) => return outcome,
        };

        let Some(decision) = self.decide(|core, head| core.router.active().on_track_end(head)) else {
            return CommandOutcome::Ignored;
        };
        let directive = self.apply_decision(decision).await;
        if let Some(index) = directive.target_index() {
            let result = self.execute_transition(index, TransitionStyle::Smooth).await;
            self.recover(result).await;
        }
        CommandOutcome::Applied
    }

    pub async fn play_at(&self, index: usize) -> CommandOutcome {
        let in_range = self
            .core
            .borrow()
            .queue
            .head()
            .is_some_and(|head| index < head.len());
        if !in_range && !self.is_busy() {
            debug!("play_at({index}) ignored, out of range");
            return CommandOutcome::Ignored;
        }
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(outcome) => return outcome,
        };

        let (current, mode) = {
            let core = self.core.borrow();
            (core.queue.head().map_or(0, |head| head.current_index), core.mode())
        };
        if index == current {
            self.restart_in_place().await;
            return CommandOutcome::Applied;
        }

        {
            let mut core = self.core.borrow_mut();
            if mode == PlaybackMode::Shuffle {
                core.queue.user_jump(index);
            } else {
                core.queue.set_current_index(index);
            }
        }
        self.broadcast_state();
        let result = self.execute_transition(index, TransitionStyle::Smooth).await;
        self.recover(result).await;
        CommandOutcome::Applied
    }

    pub fn set_mode(&self, mode: PlaybackMode) -> CommandOutcome {
        {
            let mut core = self.core.borrow_mut();
            let previous = core.mode();
            if previous == mode {
                return CommandOutcome::Ignored;
            }
            core.router.set_mode(mode);
            if previous == PlaybackMode::Shuffle {
                core.queue.clear_navigation_plan();
            }
            if mode == PlaybackMode::Shuffle {
                core.notify_queue_changed();
            }
            info!("mode {} -> {}", previous.label(), mode.label());
        }
        self.persist();
        self.broadcast_state();
        CommandOutcome::Applied
    }

    pub fn cycle_mode(&self) -> CommandOutcome {
        let next = self.core.borrow().mode().next();
        self.set_mode(next)
    }

    pub fn set_volume(&self, volume: f32) -> CommandOutcome {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.core.borrow_mut().volume = volume;
        if !self.is_busy() {
            self.transport.set_volume(volume);
        }
        self.persist();
        self.broadcast_state();
        CommandOutcome::Applied
    }

    pub fn report_progress(&self, current_time: f64, duration: f64) {
        if self.playback_state() != PlaybackState::Playing {
            return;
        }
        let _ = self.events.send(PlayerEvent::Time(TimeUpdate {
            current_time,
            duration,
        }));
    }

    fn decide(
        &self,
        choose: impl FnOnce(&PlayerCore, &crate::queue::QueueEntry) -> Decision,
    ) -> Option<Decision> {
        let core = self.core.borrow();
        let head = core.queue.head()?;
        Some(choose(&core, head))
    }

    async fn restart_in_place(&self) {
        if let Err(err) = self.transport.restart_current().await {
            warn!("failed to restart current track: {err}");
        }
    }
}
