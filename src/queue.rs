use crate::model::{FinishRule, PersistedEntry, PlaylistDefinition, Track, Trigger};
use indexmap::IndexSet;
use log::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum EntryOrigin {
    Base,
    Trigger(Trigger),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationPlan {
    pub order: Vec<usize>,
    pub cursor: usize,
}

impl NavigationPlan {
    pub fn new(order: Vec<usize>, cursor: usize) -> Self {
        Self { order, cursor }
    }

    pub fn current(&self) -> Option<usize> {
        self.order.get(self.cursor).copied()
    }

    pub fn position_of(&self, index: usize) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == index)
    }

    pub fn is_permutation_of(&self, total: usize) -> bool {
        if self.order.len() != total {
            return false;
        }
        let mut seen = vec![false; total];
        for index in &self.order {
            match seen.get_mut(*index) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub playlist_id: String,
    pub priority: f64,
    pub tracks: Vec<Track>,
    pub on_finish: FinishRule,
    pub current_index: usize,
    pub played: IndexSet<usize>,
    pub plan: Option<NavigationPlan>,
    pub was_ever_played: bool,
    pub origin: EntryOrigin,
}

impl QueueEntry {
    fn from_definition(definition: &PlaylistDefinition, priority: f64, origin: EntryOrigin) -> Self {
        Self {
            playlist_id: definition.id.clone(),
            priority,
            tracks: definition.tracks.clone(),
            on_finish: definition.on_finish,
            current_index: 0,
            played: IndexSet::new(),
            plan: None,
            was_ever_played: false,
            origin,
        }
    }

    pub fn base(definition: &PlaylistDefinition) -> Self {
        Self::from_definition(definition, f64::NEG_INFINITY, EntryOrigin::Base)
    }

    pub fn triggered(definition: &PlaylistDefinition, trigger: Trigger) -> Self {
        Self::from_definition(definition, trigger.priority, EntryOrigin::Trigger(trigger))
    }

    pub fn restore(definition: &PlaylistDefinition, persisted: &PersistedEntry, origin: EntryOrigin) -> Self {
        let priority = match &origin {
            EntryOrigin::Base => f64::NEG_INFINITY,
            EntryOrigin::Trigger(trigger) => trigger.priority,
        };
        let mut entry = Self::from_definition(definition, priority, origin);
        let total = entry.tracks.len();
        entry.current_index = if persisted.current_index < total {
            persisted.current_index
        } else {
            0
        };
        entry.played = persisted
            .played_indices
            .iter()
            .copied()
            .filter(|index| *index < total)
            .collect();
        entry.was_ever_played = persisted.was_ever_played;
        entry
    }

    pub fn to_persisted(&self) -> PersistedEntry {
        PersistedEntry {
            playlist_id: self.playlist_id.clone(),
            current_index: self.current_index,
            played_indices: self.played.iter().copied().collect(),
            was_ever_played: self.was_ever_played,
            trigger_source: self.trigger().cloned(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.tracks.len().checked_sub(1)
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.tracks.get(self.current_index)
    }

    pub fn is_base(&self) -> bool {
        matches!(self.origin, EntryOrigin::Base)
    }

    pub fn trigger(&self) -> Option<&Trigger> {
        match &self.origin {
            EntryOrigin::Base => None,
            EntryOrigin::Trigger(trigger) => Some(trigger),
        }
    }

    fn depart_to(&mut self, index: usize) {
        if index != self.current_index {
            self.played.insert(self.current_index);
        }
        self.current_index = index;
    }
}

#[derive(Debug, Default, Clone)]
pub struct QueueStore {
    entries: Vec<QueueEntry>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, mut entries: Vec<QueueEntry>) {
        entries.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        match entries.first() {
            Some(head) => debug!(
                "queue replaced ({} entries), head {:?} at priority {}",
                entries.len(),
                head.playlist_id,
                head.priority
            ),
            None => debug!("queue replaced, now empty"),
        }
        self.entries = entries;
    }

    pub fn head(&self) -> Option<&QueueEntry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn to_vec(&self) -> Vec<QueueEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pop_head(&mut self) -> Option<QueueEntry> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.entries.remove(0))
    }

    fn head_mut(&mut self) -> Option<&mut QueueEntry> {
        self.entries.first_mut()
    }

    pub fn set_current_index(&mut self, index: usize) -> bool {
        let Some(head) = self.head_mut().filter(|head| index < head.len()) else {
            return false;
        };
        head.depart_to(index);
        true
    }

    pub fn commit_navigation_step(&mut self, index: usize) -> bool {
        let Some(head) = self.head_mut().filter(|head| index < head.len()) else {
            return false;
        };
        head.depart_to(index);
        if let Some(plan) = head.plan.as_mut()
            && let Some(position) = plan.position_of(index)
        {
            plan.cursor = position;
        }
        true
    }

    pub fn user_jump(&mut self, index: usize) -> bool {
        let Some(head) = self.head_mut() else {
            return false;
        };
        if index == head.current_index || index >= head.len() {
            return false;
        }
        head.depart_to(index);
        if let Some(plan) = head.plan.as_mut()
            && let Some(position) = plan.position_of(index)
        {
            plan.cursor = position;
        }
        true
    }

    pub fn reset_for_loop(&mut self) {
        if let Some(head) = self.head_mut() {
            head.played.clear();
            head.current_index = 0;
        }
    }

    pub fn commit_genesis(&mut self, current_index: usize, plan: NavigationPlan) {
        if let Some(head) = self.head_mut() {
            head.current_index = current_index;
            head.plan = Some(plan);
        }
    }

    pub fn apply_navigation_plan(&mut self, plan: NavigationPlan) {
        if let Some(head) = self.head_mut() {
            head.plan = Some(plan);
        }
    }

    pub fn clear_navigation_plan(&mut self) {
        if let Some(head) = self.head_mut() {
            head.plan = None;
        }
    }

    pub fn clear_history(&mut self) {
        if let Some(head) = self.head_mut() {
            head.played.clear();
        }
    }

    pub fn mark_played(&mut self) {
        if let Some(head) = self.head_mut() {
            head.was_ever_played = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Condition;
    use proptest::prop_assert;

    fn playlist(id: &str, len: usize, on_finish: FinishRule) -> PlaylistDefinition {
        PlaylistDefinition {
            id: id.to_string(),
            tracks: (0..len)
                .map(|n| Track::new(format!("{id}/{n}.mp3"), format!("{id} {n}")))
                .collect(),
            on_finish,
        }
    }

    fn triggered(id: &str, priority: f64) -> QueueEntry {
        let trigger = Trigger::new(id, priority, vec![Condition::new("scene").contains(id)]);
        QueueEntry::triggered(&playlist(id, 3, FinishRule::Loop), trigger)
    }

    #[test]
    fn base_entry_sinks_below_triggers() {
        let mut store = QueueStore::new();
        store.replace(vec![
            QueueEntry::base(&playlist("base", 2, FinishRule::Loop)),
            triggered("battle", -50.0),
        ]);
        assert_eq!(store.head().map(|e| e.playlist_id.as_str()), Some("battle"));
    }

    #[test]
    fn equal_priorities_keep_insertion_order() {
        let mut store = QueueStore::new();
        store.replace(vec![triggered("a", 1.0), triggered("b", 2.0), triggered("c", 1.0)]);
        let ids: Vec<&str> = store.entries().iter().map(|e| e.playlist_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn departing_index_becomes_history() {
        let mut store = QueueStore::new();
        store.replace(vec![triggered("a", 1.0)]);
        assert!(store.set_current_index(1));
        assert!(store.set_current_index(1));
        let head = store.head().expect("head");
        assert_eq!(head.current_index, 1);
        assert_eq!(head.played.iter().copied().collect::<Vec<_>>(), vec![0]);
        assert!(!store.set_current_index(7));
    }

    #[test]
    fn navigation_step_moves_plan_cursor() {
        let mut store = QueueStore::new();
        store.replace(vec![triggered("a", 1.0)]);
        store.commit_genesis(2, NavigationPlan::new(vec![2, 0, 1], 0));
        assert!(store.commit_navigation_step(0));
        let head = store.head().expect("head");
        assert_eq!(head.plan.as_ref().map(|p| p.cursor), Some(1));
        assert!(head.played.contains(&2));
    }

    #[test]
    fn user_jump_ignores_current_index() {
        let mut store = QueueStore::new();
        store.replace(vec![triggered("a", 1.0)]);
        assert!(!store.user_jump(0));
        assert!(store.user_jump(2));
        assert_eq!(store.head().map(|e| e.current_index), Some(2));
    }

    #[test]
    fn loop_reset_clears_history() {
        let mut store = QueueStore::new();
        store.replace(vec![triggered("a", 1.0)]);
        store.set_current_index(1);
        store.set_current_index(2);
        store.reset_for_loop();
        let head = store.head().expect("head");
        assert_eq!(head.current_index, 0);
        assert!(head.played.is_empty());
    }

    #[test]
    fn mutators_only_touch_the_head() {
        let mut store = QueueStore::new();
        store.replace(vec![triggered("low", 1.0), triggered("high", 5.0)]);
        store.set_current_index(2);
        store.mark_played();
        assert_eq!(store.entries()[0].current_index, 2);
        assert!(store.entries()[0].was_ever_played);
        assert_eq!(store.entries()[1].current_index, 0);
        assert!(!store.entries()[1].was_ever_played);
    }

    #[test]
    fn restore_clamps_stale_progress() {
        let definition = playlist("a", 2, FinishRule::Loop);
        let persisted = PersistedEntry {
            playlist_id: String::from("a"),
            current_index: 5,
            played_indices: vec![1, 4, 0],
            was_ever_played: true,
            trigger_source: None,
        };
        let entry = QueueEntry::restore(&definition, &persisted, EntryOrigin::Base);
        assert_eq!(entry.current_index, 0);
        assert_eq!(entry.played.iter().copied().collect::<Vec<_>>(), vec![1, 0]);
        assert_eq!(entry.priority, f64::NEG_INFINITY);
        assert_eq!(entry.to_persisted().played_indices, vec![1, 0]);
    }

    #[test]
    fn pop_head_shortens_queue() {
        let mut store = QueueStore::new();
        store.replace(vec![triggered("a", 1.0), triggered("b", 2.0)]);
        let popped = store.pop_head().expect("popped");
        assert_eq!(popped.playlist_id, "b");
        assert_eq!(store.len(), 1);
        store.pop_head();
        assert!(store.pop_head().is_none());
    }

    proptest::proptest! {
        #[test]
        fn replace_sorts_by_priority_descending(priorities in proptest::collection::vec(-100i32..100, 0..40), with_base in proptest::bool::ANY) {
            let mut entries: Vec<QueueEntry> = priorities
                .iter()
                .enumerate()
                .map(|(n, p)| triggered(&format!("p{n}"), f64::from(*p)))
                .collect();
            if with_base {
                entries.insert(0, QueueEntry::base(&playlist("base", 1, FinishRule::Loop)));
            }
            let mut store = QueueStore::new();
            store.replace(entries);
            for pair in store.entries().windows(2) {
                prop_assert!(pair[0].priority >= pair[1].priority);
            }
            if with_base {
                prop_assert!(store.entries().last().is_some_and(QueueEntry::is_base));
            }
        }
    }
}
