#![no_main]

use libfuzzer_sys::fuzz_target;
use scenetune::core::PlayerCore;
use scenetune::model::{FinishRule, PlaybackMode, PlaylistDefinition, Track};
use scenetune::navigation;
use scenetune::queue::QueueEntry;
use scenetune::strategy::{Direction, StrategyRouter};

fuzz_target!(|data: &[u8]| {
    let Some((&shape, ops)) = data.split_first() else {
        return;
    };
    let len = usize::from(shape % 16) + 1;
    let on_finish = if shape & 0x80 == 0 {
        FinishRule::Loop
    } else {
        FinishRule::Pop
    };
    let playlist = PlaylistDefinition {
        id: String::from("fuzz"),
        tracks: (0..len)
            .map(|idx| Track::new(format!("track_{idx}.mp3"), format!("track {idx}")))
            .collect(),
        on_finish,
    };

    let mut core = PlayerCore::new(StrategyRouter::seeded(PlaybackMode::Sequential, 0), 0.5);
    core.queue.replace(vec![QueueEntry::base(&playlist)]);

    for byte in ops {
        match byte % 8 {
            0 => core.router.set_mode(PlaybackMode::Sequential),
            1 => {
                core.router.set_mode(PlaybackMode::Shuffle);
                core.notify_queue_changed();
            }
            2 => core.router.set_mode(PlaybackMode::Single),
            3 | 4 | 5 => {
                let Some(head) = core.queue.head() else {
                    break;
                };
                let direction = if byte % 8 == 5 {
                    Direction::Prev
                } else {
                    Direction::Next
                };
                let decision = core.router.active().advance(head, direction);
                navigation::apply(&mut core, decision);
            }
            6 => {
                let Some(head) = core.queue.head() else {
                    break;
                };
                let decision = core.router.active().on_track_end(head);
                navigation::apply(&mut core, decision);
            }
            _ => {
                core.queue.user_jump(usize::from(*byte) % len);
            }
        }

        if let Some(head) = core.queue.head() {
            assert!(head.current_index < head.len());
            assert!(head.played.iter().all(|index| *index < head.len()));
            if let Some(plan) = &head.plan {
                assert!(plan.is_permutation_of(head.len()));
            }
        }
    }
});
