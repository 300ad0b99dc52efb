use crate::core::PlayerCore;
use crate::model::{FinishRule, PlaybackState};
use crate::strategy::Decision;
use log::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Transition(usize),
    Silence,
    Settled,
}

impl Directive {
    pub fn needs_transition(self) -> bool {
        matches!(self, Self::Transition(_))
    }

    pub fn target_index(self) -> Option<usize> {
        match self {
            Self::Transition(index) => Some(index),
            Self::Silence | Self::Settled => None,
        }
    }
}

pub fn apply(core: &mut PlayerCore, decision: Decision) -> Directive {
    let directive = match decision {
        Decision::GoTo(index) => go_to(core, index),
        Decision::Restart => core
            .queue
            .head()
            .map_or(Directive::Settled, |head| Directive::Transition(head.current_index)),
        Decision::RemoveHeadAndAdvance => remove_head(core),
        Decision::LoopReset => loop_reset(core),
        Decision::Stop => {
            core.set_playback(PlaybackState::Stopped);
            Directive::Settled
        }
        Decision::DoNothing => Directive::Settled,
    };
    debug!("applied {decision:?} -> {directive:?}");
    directive
}

fn go_to(core: &mut PlayerCore, index: usize) -> Directive {
    let in_range = core.queue.head().is_some_and(|head| index < head.len());
    if !in_range {
        error!("GoTo({index}) is outside the head playlist, ignoring");
        return Directive::Settled;
    }
    core.queue.commit_navigation_step(index);
    Directive::Transition(index)
}

fn remove_head(core: &mut PlayerCore) -> Directive {
    let Some(departed) = core.queue.pop_head() else {
        core.set_playback(PlaybackState::Stopped);
        return Directive::Silence;
    };
    info!("playlist {:?} finished, removing it", departed.playlist_id);
    if departed.is_base() && departed.on_finish == FinishRule::Pop {
        core.finished_base.insert(departed.playlist_id);
    }
    core.notify_queue_changed();

    match core.queue.head() {
        Some(head) => Directive::Transition(head.current_index),
        None => {
            info!("queue drained");
            core.set_playback(PlaybackState::Stopped);
            Directive::Silence
        }
    }
}

fn loop_reset(core: &mut PlayerCore) -> Directive {
    if core.queue.head().is_none_or(|head| head.is_empty()) {
        error!("loop reset on a head without tracks, ignoring");
        return Directive::Settled;
    }
    core.queue.reset_for_loop();
    if let Some(head) = core.queue.head()
        && let Some(genesis) = core.router.active_mut().prepare_genesis(head)
    {
        core.queue.commit_genesis(genesis.current_index, genesis.plan);
    }
    core.queue
        .head()
        .map_or(Directive::Settled, |head| Directive::Transition(head.current_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Condition, PlaybackMode, PlaylistDefinition, Track, Trigger};
    use crate::queue::QueueEntry;
    use crate::strategy::StrategyRouter;
    use proptest::prop_assert;

    fn definition(id: &str, len: usize, on_finish: FinishRule) -> PlaylistDefinition {
        PlaylistDefinition {
            id: id.to_string(),
            tracks: (0..len)
                .map(|n| Track::new(format!("{id}/{n}.mp3"), format!("{id} {n}")))
                .collect(),
            on_finish,
        }
    }

    fn core(mode: PlaybackMode, entries: Vec<QueueEntry>) -> PlayerCore {
        let mut core = PlayerCore::new(StrategyRouter::seeded(mode, 11), 0.5);
        core.queue.replace(entries);
        core.notify_queue_changed();
        core
    }

    #[test]
    fn go_to_commits_and_records_history() {
        let mut core = core(
            PlaybackMode::Sequential,
            vec![QueueEntry::base(&definition("a", 3, FinishRule::Loop))],
        );
        assert_eq!(apply(&mut core, Decision::GoTo(2)), Directive::Transition(2));
        let head = core.queue.head().expect("head");
        assert_eq!(head.current_index, 2);
        assert!(head.played.contains(&0));
    }

    #[test]
    fn trackless_head_never_requests_a_transition() {
        let mut core = core(
            PlaybackMode::Sequential,
            vec![QueueEntry::base(&definition("void", 0, FinishRule::Loop))],
        );
        assert_eq!(apply(&mut core, Decision::LoopReset), Directive::Settled);
        assert_eq!(apply(&mut core, Decision::GoTo(0)), Directive::Settled);
    }

    #[test]
    fn go_to_out_of_range_is_ignored() {
        let mut core = core(
            PlaybackMode::Sequential,
            vec![QueueEntry::base(&definition("a", 3, FinishRule::Loop))],
        );
        assert_eq!(apply(&mut core, Decision::GoTo(3)), Directive::Settled);
        assert_eq!(core.queue.head().map(|h| h.current_index), Some(0));
    }

    #[test]
    fn restart_targets_current_index() {
        let mut core = core(
            PlaybackMode::Single,
            vec![QueueEntry::base(&definition("a", 3, FinishRule::Loop))],
        );
        core.queue.set_current_index(1);
        assert_eq!(apply(&mut core, Decision::Restart), Directive::Transition(1));
    }

    #[test]
    fn popping_base_playlist_marks_it_finished() {
        let trigger = Trigger::new("battle", 4.0, vec![Condition::new("fight").contains("on")]);
        let mut core = core(
            PlaybackMode::Sequential,
            vec![
                QueueEntry::base(&definition("intro", 2, FinishRule::Pop)),
                QueueEntry::triggered(&definition("battle", 2, FinishRule::Pop), trigger),
            ],
        );
        assert_eq!(
            apply(&mut core, Decision::RemoveHeadAndAdvance),
            Directive::Transition(0)
        );
        assert!(core.finished_base.is_empty());
        assert_eq!(core.queue.head().map(|h| h.playlist_id.as_str()), Some("intro"));

        core.set_playback(PlaybackState::Playing);
        assert_eq!(apply(&mut core, Decision::RemoveHeadAndAdvance), Directive::Silence);
        assert!(core.finished_base.contains("intro"));
        assert_eq!(core.playback, PlaybackState::Stopped);
        assert!(core.queue.is_empty());
    }

    #[test]
    fn loop_reset_in_shuffle_reshuffles() {
        let mut core = core(
            PlaybackMode::Shuffle,
            vec![QueueEntry::base(&definition("a", 4, FinishRule::Loop))],
        );
        core.queue.commit_navigation_step(3);
        let directive = apply(&mut core, Decision::LoopReset);
        let head = core.queue.head().expect("head");
        assert_eq!(directive, Directive::Transition(head.current_index));
        assert!(head.played.is_empty());
        let plan = head.plan.as_ref().expect("plan");
        assert_eq!(plan.cursor, 0);
        assert!(plan.is_permutation_of(4));
    }

    #[test]
    fn loop_reset_in_sequential_starts_over() {
        let mut core = core(
            PlaybackMode::Sequential,
            vec![QueueEntry::base(&definition("a", 4, FinishRule::Loop))],
        );
        core.queue.set_current_index(3);
        assert_eq!(apply(&mut core, Decision::LoopReset), Directive::Transition(0));
    }

    #[test]
    fn stop_and_nothing_settle() {
        let mut core = core(
            PlaybackMode::Sequential,
            vec![QueueEntry::base(&definition("a", 2, FinishRule::Loop))],
        );
        core.set_playback(PlaybackState::Playing);
        assert_eq!(apply(&mut core, Decision::DoNothing), Directive::Settled);
        assert_eq!(core.playback, PlaybackState::Playing);
        assert_eq!(apply(&mut core, Decision::Stop), Directive::Settled);
        assert_eq!(core.playback, PlaybackState::Stopped);
    }

    proptest::proptest! {
        #[test]
        fn queue_invariants_hold_after_random_navigation(ops in proptest::collection::vec(0u8..9, 1..200)) {
            let mut core = core(
                PlaybackMode::Shuffle,
                vec![
                    QueueEntry::base(&definition("base", 5, FinishRule::Loop)),
                    QueueEntry::triggered(
                        &definition("scene", 3, FinishRule::Pop),
                        Trigger::new("scene", 1.0, vec![Condition::new("s").contains("x")]),
                    ),
                ],
            );

            for op in ops {
                let Some(head) = core.queue.head() else {
                    break;
                };
                let decision = match op {
                    0 => core.router.active().advance(head, crate::strategy::Direction::Next),
                    1 => core.router.active().advance(head, crate::strategy::Direction::Prev),
                    2 => core.router.active().on_track_end(head),
                    3 => core.router.active().on_playback_error(head),
                    4 => {
                        core.router.set_mode(PlaybackMode::Sequential);
                        core.queue.clear_navigation_plan();
                        Decision::DoNothing
                    }
                    5 => {
                        core.router.set_mode(PlaybackMode::Shuffle);
                        core.notify_queue_changed();
                        Decision::DoNothing
                    }
                    6 => {
                        core.router.set_mode(PlaybackMode::Single);
                        core.queue.clear_navigation_plan();
                        Decision::DoNothing
                    }
                    7 => Decision::LoopReset,
                    _ => Decision::GoTo(usize::from(op)),
                };
                let directive = apply(&mut core, decision);

                if let Some(head) = core.queue.head() {
                    prop_assert!(head.current_index < head.len());
                    if let Some(target) = directive.target_index() {
                        prop_assert!(target < head.len());
                    }
                    if let Some(plan) = &head.plan {
                        prop_assert!(plan.is_permutation_of(head.len()));
                        prop_assert!(plan.current() == Some(head.current_index));
                    }
                }
            }
        }
    }
}
