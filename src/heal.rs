use crate::events::Notice;
use crate::model::PlaybackState;
use crate::player::{Player, TransitionStyle};
use log::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealOutcome {
    Recovered,
    Settled,
    Drained,
    CircuitOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreaker {
    failures: usize,
    threshold: usize,
}

impl CircuitBreaker {
    pub fn tripped(threshold: usize) -> Self {
        Self {
            failures: 1,
            threshold,
        }
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn is_open(&self) -> bool {
        self.threshold > 0 && self.failures >= self.threshold
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}

impl Player {
    pub(crate) async fn self_heal(&self) -> HealOutcome {
        let (threshold, failed_title) = {
            let core = self.core.borrow();
            (
                core.queue.head().map_or(0, |head| head.len()),
                core.current_track().map(|track| track.title.clone()),
            )
        };
        if let Some(title) = failed_title {
            self.notify(Notice::TrackFailed { title });
        }

        let mut breaker = CircuitBreaker::tripped(threshold);
        loop {
            if breaker.is_open() {
                let playlist_id = self
                    .core
                    .borrow()
                    .queue
                    .head()
                    .map(|head| head.playlist_id.clone())
                    .unwrap_or_default();
                error!(
                    "{} consecutive failures in {playlist_id:?}, stopping playback",
                    breaker.failures()
                );
                self.set_playback(PlaybackState::Stopped);
                self.notify(Notice::PlaylistFailed { playlist_id });
                self.broadcast_state();
                return HealOutcome::CircuitOpen;
            }

            let decision = {
                let core = self.core.borrow();
                core.queue
                    .head()
                    .filter(|head| !head.is_empty())
                    .map(|head| core.router.active().on_playback_error(head))
            };
            let Some(decision) = decision else {
                info!("nothing left to heal, no playable head");
                self.set_playback(PlaybackState::Stopped);
                self.broadcast_state();
                return HealOutcome::Drained;
            };

            let directive = self.apply_decision(decision).await;
            let Some(target) = directive.target_index() else {
                return HealOutcome::Settled;
            };

            match self.execute_transition(target, TransitionStyle::Smooth).await {
                Ok(()) => {
                    info!("recovered after {} failures", breaker.failures());
                    self.broadcast_state();
                    return HealOutcome::Recovered;
                }
                Err(err) => {
                    breaker.record_failure();
                    warn!("healing attempt {} failed: {err}", breaker.failures());
                    let title = self
                        .core
                        .borrow()
                        .current_track()
                        .map(|track| track.title.clone())
                        .unwrap_or_else(|| String::from("Unknown track"));
                    self.notify(Notice::TrackFailed { title });
                }
            }
        }
    }
}
