use crate::model::{FinishRule, PlaybackMode};
use crate::queue::{NavigationPlan, QueueEntry, QueueStore};
use log::{debug, error};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    GoTo(usize),
    Restart,
    RemoveHeadAndAdvance,
    LoopReset,
    Stop,
    DoNothing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisPlan {
    pub current_index: usize,
    pub plan: NavigationPlan,
}

#[derive(Debug)]
pub struct ShuffleStrategy {
    rng: SmallRng,
}

impl ShuffleStrategy {
    pub fn from_os_rng() -> Self {
        Self {
            rng: rand::make_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn continuity_plan(&mut self, entry: &QueueEntry) -> Option<NavigationPlan> {
        let total = entry.len();
        if entry.current_index >= total {
            return None;
        }

        let mut known: Vec<usize> = Vec::with_capacity(total);
        for index in entry
            .played
            .iter()
            .copied()
            .chain(std::iter::once(entry.current_index))
        {
            if index < total && !known.contains(&index) {
                known.push(index);
            }
        }

        let mut pool: Vec<usize> = (0..total).filter(|index| !known.contains(index)).collect();
        pool.shuffle(&mut self.rng);

        let cursor = known.iter().position(|index| *index == entry.current_index)?;
        known.extend(pool);
        Some(NavigationPlan::new(known, cursor))
    }

    pub fn genesis(&mut self, entry: &QueueEntry) -> Option<GenesisPlan> {
        let mut order: Vec<usize> = (0..entry.len()).collect();
        order.shuffle(&mut self.rng);
        let current_index = *order.first()?;
        Some(GenesisPlan {
            current_index,
            plan: NavigationPlan::new(order, 0),
        })
    }
}

#[derive(Debug)]
pub enum Strategy {
    Sequential,
    Single,
    Shuffle(ShuffleStrategy),
}

impl Strategy {
    pub fn for_mode(mode: PlaybackMode) -> Self {
        match mode {
            PlaybackMode::Sequential => Self::Sequential,
            PlaybackMode::Single => Self::Single,
            PlaybackMode::Shuffle => Self::Shuffle(ShuffleStrategy::from_os_rng()),
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        match self {
            Self::Sequential => PlaybackMode::Sequential,
            Self::Single => PlaybackMode::Single,
            Self::Shuffle(_) => PlaybackMode::Shuffle,
        }
    }

    pub fn advance(&self, entry: &QueueEntry, direction: Direction) -> Decision {
        let decision = match self {
            Self::Sequential => match direction {
                Direction::Next => sequential_track_end(entry),
                Direction::Prev => sequential_prev(entry),
            },
            Self::Single => Decision::Restart,
            Self::Shuffle(_) => match entry.plan.as_ref() {
                Some(plan) => shuffle_step(entry, plan, direction),
                None => {
                    error!(
                        "shuffle asked to advance {:?} without a plan",
                        entry.playlist_id
                    );
                    Decision::DoNothing
                }
            },
        };
        debug!(
            "{} advance {direction:?} on {:?}@{} -> {decision:?}",
            self.mode().label(),
            entry.playlist_id,
            entry.current_index
        );
        decision
    }

    pub fn on_track_end(&self, entry: &QueueEntry) -> Decision {
        let decision = match self {
            Self::Sequential => sequential_track_end(entry),
            Self::Single => Decision::Restart,
            Self::Shuffle(_) => match entry.plan.as_ref() {
                Some(plan) => shuffle_step(entry, plan, Direction::Next),
                None => {
                    error!(
                        "shuffle reached track end on {:?} without a plan",
                        entry.playlist_id
                    );
                    Decision::Stop
                }
            },
        };
        debug!(
            "{} track end on {:?}@{} -> {decision:?}",
            self.mode().label(),
            entry.playlist_id,
            entry.current_index
        );
        decision
    }

    pub fn on_playback_error(&self, entry: &QueueEntry) -> Decision {
        match self {
            Self::Single => Decision::Stop,
            Self::Sequential | Self::Shuffle(_) => self.advance(entry, Direction::Next),
        }
    }

    pub fn on_queue_changed(&mut self, entry: &QueueEntry) -> Option<NavigationPlan> {
        match self {
            Self::Shuffle(shuffle) => shuffle.continuity_plan(entry),
            Self::Sequential | Self::Single => None,
        }
    }

    pub fn prepare_genesis(&mut self, entry: &QueueEntry) -> Option<GenesisPlan> {
        match self {
            Self::Shuffle(shuffle) => shuffle.genesis(entry),
            Self::Sequential | Self::Single => None,
        }
    }
}

fn sequential_prev(entry: &QueueEntry) -> Decision {
    if entry.current_index > 0 {
        return Decision::GoTo(entry.current_index - 1);
    }
    match (entry.on_finish, entry.last_index()) {
        (FinishRule::Loop, Some(last)) => Decision::GoTo(last),
        _ => Decision::Restart,
    }
}

fn sequential_track_end(entry: &QueueEntry) -> Decision {
    let total = entry.len();
    if entry.current_index + 1 < total {
        return Decision::GoTo(entry.current_index + 1);
    }
    match entry.on_finish {
        FinishRule::Pop => Decision::RemoveHeadAndAdvance,
        FinishRule::Loop if entry.played.len() + 1 >= total => Decision::LoopReset,
        FinishRule::Loop => Decision::GoTo(0),
    }
}

fn shuffle_step(entry: &QueueEntry, plan: &NavigationPlan, direction: Direction) -> Decision {
    match direction {
        Direction::Next => match plan.order.get(plan.cursor + 1) {
            Some(index) => Decision::GoTo(*index),
            None => match entry.on_finish {
                FinishRule::Pop => Decision::RemoveHeadAndAdvance,
                FinishRule::Loop => Decision::LoopReset,
            },
        },
        Direction::Prev => plan
            .cursor
            .checked_sub(1)
            .and_then(|cursor| plan.order.get(cursor))
            .map_or(Decision::DoNothing, |index| Decision::GoTo(*index)),
    }
}

#[derive(Debug)]
pub struct StrategyRouter {
    active: Strategy,
    seed: Option<u64>,
}

impl StrategyRouter {
    pub fn new(mode: PlaybackMode) -> Self {
        Self {
            active: Strategy::for_mode(mode),
            seed: None,
        }
    }

    pub fn seeded(mode: PlaybackMode, seed: u64) -> Self {
        let mut router = Self {
            active: Strategy::Sequential,
            seed: Some(seed),
        };
        router.active = router.build(mode);
        router
    }

    fn build(&self, mode: PlaybackMode) -> Strategy {
        match (mode, self.seed) {
            (PlaybackMode::Shuffle, Some(seed)) => Strategy::Shuffle(ShuffleStrategy::seeded(seed)),
            _ => Strategy::for_mode(mode),
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.active.mode()
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        if self.active.mode() == mode {
            return;
        }
        debug!("strategy switched to {}", mode.label());
        self.active = self.build(mode);
    }

    pub fn active(&self) -> &Strategy {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut Strategy {
        &mut self.active
    }

    pub fn notify_queue_changed(&mut self, queue: &mut QueueStore) {
        let Some(head) = queue.head() else {
            return;
        };
        if let Some(plan) = self.active.on_queue_changed(head) {
            debug!(
                "regenerated plan for {:?}: {:?} at {}",
                head.playlist_id, plan.order, plan.cursor
            );
            queue.apply_navigation_plan(plan);
        }
    }
}
