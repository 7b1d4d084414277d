//! The speedrun record state machine.
//!
//! ```text
//!            mark_vacant              resume
//!  Running ─────────────► Vacant ─────────────► Running
//!     │
//!     │ last predicate collected
//!     ▼
//!  Finished (collection frozen; kept until archived)
//! ```
//!
//! A record owns its collection stamps; they can only be set through
//! [`SpeedrunRecord::mark_collected`] and never cleared.

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use speedrun_goals::{CompiledGoal, Evidence, Predicate, ResourceId};

use crate::snapshot::RecordSnapshot;
use crate::trust::MateLinks;
use crate::types::{PlayType, PlayerId, RecordId, Tick};

/// Where a record is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Timer running, collecting
    Running,
    /// Timer paused until resumed
    Vacant,
    /// Every predicate collected
    Finished,
}

impl RecordState {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Running => "running",
            RecordState::Vacant => "vacant",
            RecordState::Finished => "finished",
        }
    }
}

/// What one event did to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectOutcome {
    /// Predicate indices stamped by this event, in list order
    pub collected: Vec<usize>,
    /// Whether the event finished the record
    pub finished: bool,
}

impl CollectOutcome {
    /// Whether the event changed anything.
    pub fn is_empty(&self) -> bool {
        self.collected.is_empty() && !self.finished
    }
}

/// One party's attempt at one goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedrunRecord {
    pub(crate) goal_id: ResourceId,
    pub(crate) record_id: RecordId,
    pub(crate) predicates: Arc<[Predicate]>,
    pub(crate) collected: Vec<Option<Tick>>,
    pub(crate) start_time: Tick,
    pub(crate) finish_time: Option<Tick>,
    pub(crate) last_quit_time: Option<Tick>,
    pub(crate) vacant_time: Tick,
    pub(crate) difficulty: ResourceId,
    pub(crate) mates: MateLinks,
}

impl SpeedrunRecord {
    /// Start a fresh record for a compiled goal.
    pub fn new(goal: &CompiledGoal, difficulty: ResourceId, start_time: Tick) -> Self {
        let record = Self {
            goal_id: goal.id.clone(),
            record_id: Uuid::new_v4(),
            predicates: goal.predicates.clone(),
            collected: vec![None; goal.predicates.len()],
            start_time,
            finish_time: None,
            last_quit_time: None,
            vacant_time: 0,
            difficulty,
            mates: MateLinks::new(),
        };
        info!(
            record_id = %record.record_id,
            goal = %record.goal_id,
            difficulty = %record.difficulty,
            required = record.required(),
            "Record created"
        );
        record
    }

    /// A fresh record for the same goal and difficulty, for a PvP mate.
    pub fn companion(&self, start_time: Tick) -> Self {
        let (goal_id, difficulty) = self.as_draft_seed();
        Self {
            goal_id: goal_id.clone(),
            record_id: Uuid::new_v4(),
            predicates: self.predicates.clone(),
            collected: vec![None; self.predicates.len()],
            start_time,
            finish_time: None,
            last_quit_time: None,
            vacant_time: 0,
            difficulty: difficulty.clone(),
            mates: MateLinks::new(),
        }
    }

    /// Goal and difficulty a mate's record is started from.
    pub fn as_draft_seed(&self) -> (&ResourceId, &ResourceId) {
        (&self.goal_id, &self.difficulty)
    }

    /// Summary at `now`.
    pub fn snapshot(&self, now: Tick, play_type: PlayType) -> RecordSnapshot {
        RecordSnapshot::of(self, now, play_type)
    }

    /// Goal identifier.
    pub fn goal_id(&self) -> &ResourceId {
        &self.goal_id
    }

    /// Record identifier.
    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    /// Replace the record identifier with a fresh one.
    pub(crate) fn renew_id(&mut self) {
        self.record_id = Uuid::new_v4();
    }

    /// Ordered predicates.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Number of predicates.
    pub fn required(&self) -> usize {
        self.predicates.len()
    }

    /// Difficulty identifier.
    pub fn difficulty(&self) -> &ResourceId {
        &self.difficulty
    }

    /// Start time.
    pub fn start_time(&self) -> Tick {
        self.start_time
    }

    /// Finish time, if finished.
    pub fn finish_time(&self) -> Option<Tick> {
        self.finish_time
    }

    /// Time the record was left, if vacant.
    pub fn last_quit_time(&self) -> Option<Tick> {
        self.last_quit_time
    }

    /// Accumulated paused time.
    pub fn vacant_time(&self) -> Tick {
        self.vacant_time
    }

    /// Mate links.
    pub fn mates(&self) -> &MateLinks {
        &self.mates
    }

    /// Mutable mate links.
    pub fn mates_mut(&mut self) -> &mut MateLinks {
        &mut self.mates
    }

    /// Collection time of a predicate.
    pub fn collected_at(&self, index: usize) -> Option<Tick> {
        self.collected.get(index).copied().flatten()
    }

    /// Whether a predicate is collected.
    pub fn is_collected(&self, index: usize) -> bool {
        self.collected_at(index).is_some()
    }

    /// Collection times, in predicate order.
    pub fn collected_times(&self) -> impl Iterator<Item = Option<Tick>> + '_ {
        self.collected.iter().copied()
    }

    /// Number of collected predicates.
    pub fn collected_count(&self) -> usize {
        if self.is_finished() {
            return self.required();
        }
        self.collected.iter().filter(|t| t.is_some()).count()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RecordState {
        if self.finish_time.is_some() {
            RecordState::Finished
        } else if self.last_quit_time.is_some() {
            RecordState::Vacant
        } else {
            RecordState::Running
        }
    }

    /// Whether the record is finished.
    pub fn is_finished(&self) -> bool {
        self.finish_time.is_some()
    }

    /// Whether the record is paused.
    pub fn is_vacant(&self) -> bool {
        self.state() == RecordState::Vacant
    }

    /// Whether every predicate has been collected.
    pub fn is_all_requirements_passed(&self) -> bool {
        self.collected.iter().all(Option::is_some)
    }

    /// Stamp a predicate as collected at `time`.
    ///
    /// Returns `false` if nothing changed: the index is out of range or
    /// already stamped, the time is negative, or the record is finished.
    pub fn mark_collected(&mut self, index: usize, time: Tick) -> bool {
        if self.is_finished() || time < 0 {
            return false;
        }
        match self.collected.get_mut(index) {
            Some(slot @ None) => {
                *slot = Some(time);
                true
            }
            _ => false,
        }
    }

    /// Finish the record if every predicate is collected.
    pub fn try_mark_done(&mut self, now: Tick) -> bool {
        if self.is_finished() || !self.is_all_requirements_passed() {
            return false;
        }
        self.finish_time = Some(now);
        info!(
            record_id = %self.record_id,
            goal = %self.goal_id,
            duration = self.elapsed(now),
            "Record finished"
        );
        true
    }

    /// Pause the timer. Only a running record can be paused.
    pub fn mark_vacant(&mut self, now: Tick) -> bool {
        if self.state() != RecordState::Running {
            return false;
        }
        self.last_quit_time = Some(now);
        debug!(record_id = %self.record_id, at = now, "Record vacant");
        true
    }

    /// Resume a paused timer, folding the pause into the vacant total.
    pub fn resume(&mut self, now: Tick) -> bool {
        if self.state() != RecordState::Vacant {
            return false;
        }
        if let Some(quit) = self.last_quit_time.take() {
            self.vacant_time += (now - quit).max(0);
        }
        debug!(record_id = %self.record_id, vacant_time = self.vacant_time, "Record resumed");
        true
    }

    /// Start hook run whenever a player (re)joins the record.
    ///
    /// Folds any pending pause; a running record is left untouched.
    pub fn on_start(&mut self, now: Tick) {
        self.resume(now);
    }

    /// Elapsed time at `now`, excluding paused time.
    pub fn elapsed(&self, now: Tick) -> Tick {
        let end = self.finish_time.or(self.last_quit_time).unwrap_or(now);
        end - self.start_time - self.vacant_time
    }

    /// Test evidence against every uncollected predicate and stamp matches.
    ///
    /// Only running records collect.
    pub fn on_event(&mut self, evidence: &Evidence, now: Tick) -> CollectOutcome {
        let mut outcome = CollectOutcome::default();
        if self.state() != RecordState::Running {
            return outcome;
        }

        for index in 0..self.predicates.len() {
            if self.is_collected(index) {
                continue;
            }
            if self.predicates[index].test(evidence) && self.mark_collected(index, now) {
                outcome.collected.push(index);
            }
        }

        if !outcome.collected.is_empty() {
            debug!(
                record_id = %self.record_id,
                indices = ?outcome.collected,
                collected = self.collected_count(),
                required = self.required(),
                "Predicates collected"
            );
            outcome.finished = self.try_mark_done(now);
        }
        outcome
    }

    /// Trust a viewer unconditionally.
    pub fn add_trust(&mut self, viewer: PlayerId) {
        self.mates.add_wildcard(viewer);
    }

    /// Whether `viewer`, currently running `viewer_record`, may view this record.
    pub fn trusts(&self, viewer: Option<PlayerId>, viewer_record: Option<RecordId>) -> bool {
        self.mates.trusts(viewer, viewer_record)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::trust::link_mates;
    use speedrun_goals::{fingerprint, ItemMatcher, ItemStack};

    pub(crate) fn goal(items: &[&str]) -> CompiledGoal {
        let predicates: Vec<Predicate> = items
            .iter()
            .map(|path| {
                let id = ResourceId::minecraft(path);
                Predicate::item(ItemMatcher::of_items(vec![id.clone()]), ItemStack::of(id))
            })
            .collect();
        CompiledGoal {
            id: ResourceId::new("speedabc", "test"),
            icon: ItemStack::of(ResourceId::minecraft("apple")),
            display: speedrun_goals::Text::literal("Test"),
            fingerprint: fingerprint(&predicates).unwrap(),
            predicates: predicates.into(),
        }
    }

    pub(crate) fn pickup(path: &str) -> Evidence {
        Evidence::Item {
            stack: ItemStack::of(ResourceId::minecraft(path)),
            tags: Vec::new(),
        }
    }

    fn record(items: &[&str]) -> SpeedrunRecord {
        SpeedrunRecord::new(&goal(items), ResourceId::new("speedabc", "empty"), 0)
    }

    #[test]
    fn test_collected_length_matches_predicates() {
        let r = record(&["stone", "dirt", "sand"]);
        assert_eq!(r.collected_times().count(), r.required());
        assert_eq!(r.state(), RecordState::Running);
    }

    #[test]
    fn test_three_item_scenario() {
        let mut r = SpeedrunRecord::new(
            &CompiledGoal {
                predicates: vec![
                    Predicate::item(
                        ItemMatcher::of_items(vec![ResourceId::minecraft("stone"), ResourceId::minecraft("granite")]),
                        ItemStack::of(ResourceId::minecraft("stone")),
                    ),
                    Predicate::item(
                        ItemMatcher::of_items(vec![ResourceId::minecraft("dirt")]),
                        ItemStack::of(ResourceId::minecraft("dirt")),
                    ),
                    Predicate::item(
                        ItemMatcher::of_items(vec![ResourceId::minecraft("granite")]),
                        ItemStack::of(ResourceId::minecraft("granite")),
                    ),
                ]
                .into(),
                ..goal(&[])
            },
            ResourceId::new("speedabc", "empty"),
            0,
        );

        let outcome = r.on_event(&pickup("granite"), 100);
        assert_eq!(outcome.collected, vec![0, 2]);
        assert!(!outcome.finished);
        assert!(!r.is_finished());
        assert_eq!(r.collected_count(), 2);

        let outcome = r.on_event(&pickup("dirt"), 150);
        assert_eq!(outcome.collected, vec![1]);
        assert!(outcome.finished);
        assert!(r.is_finished());
        assert_eq!(r.collected_count(), 3);
        assert_eq!(
            r.collected_times().collect::<Vec<_>>(),
            vec![Some(100), Some(150), Some(100)]
        );
        assert_eq!(r.finish_time(), Some(150));
    }

    #[test]
    fn test_try_mark_done_requires_all() {
        let mut r = record(&["stone", "dirt"]);
        assert!(r.mark_collected(0, 10));
        assert!(!r.try_mark_done(20));
        assert_eq!(r.finish_time(), None);
    }

    #[test]
    fn test_finished_record_is_frozen() {
        let mut r = record(&["stone"]);
        assert!(r.mark_collected(0, 10));
        assert!(r.try_mark_done(10));

        assert!(!r.try_mark_done(50));
        assert_eq!(r.finish_time(), Some(10));
        assert!(!r.mark_collected(0, 60));
        assert!(r.on_event(&pickup("stone"), 70).is_empty());
        assert!(!r.mark_vacant(80));
        assert_eq!(r.collected_at(0), Some(10));
    }

    #[test]
    fn test_mark_collected_never_overwrites() {
        let mut r = record(&["stone", "dirt"]);
        assert!(r.mark_collected(0, 10));
        assert!(!r.mark_collected(0, 20));
        assert!(!r.mark_collected(5, 20));
        assert!(!r.mark_collected(1, -1));
        assert_eq!(r.collected_at(0), Some(10));
    }

    #[test]
    fn test_vacancy_round_trip() {
        let mut r = SpeedrunRecord::new(&goal(&["stone"]), ResourceId::new("speedabc", "empty"), 100);
        assert!(r.mark_vacant(300));
        assert_eq!(r.state(), RecordState::Vacant);
        assert!(!r.mark_vacant(350));
        assert_eq!(r.elapsed(900), 200);

        assert!(r.resume(1000));
        assert!(!r.resume(1100));
        assert_eq!(r.vacant_time(), 700);
        assert_eq!(r.elapsed(1500), 1500 - 100 - 700);
    }

    #[test]
    fn test_vacant_record_ignores_events() {
        let mut r = record(&["stone"]);
        r.mark_vacant(10);
        assert!(r.on_event(&pickup("stone"), 20).is_empty());
        r.on_start(30);
        assert_eq!(r.on_event(&pickup("stone"), 40).collected, vec![0]);
    }

    #[test]
    fn test_finished_elapsed_excludes_pause() {
        let mut r = record(&["stone"]);
        r.mark_vacant(100);
        r.resume(400);
        r.on_event(&pickup("stone"), 500);
        assert_eq!(r.elapsed(10_000), 200);
    }

    #[test]
    fn test_mates_follow_live_record() {
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let mut a = record(&["stone"]);
        let mut b = a.companion(0);
        link_mates(x, &mut a, y, &mut b);

        assert!(a.trusts(Some(y), Some(b.record_id())));
        assert!(b.trusts(Some(x), Some(a.record_id())));

        let c = record(&["dirt"]);
        assert!(!a.trusts(Some(y), Some(c.record_id())));
    }

    #[test]
    fn test_companion_shares_goal() {
        let a = record(&["stone", "dirt"]);
        let b = a.companion(50);
        assert_ne!(a.record_id(), b.record_id());
        assert_eq!(a.predicates(), b.predicates());
        assert_eq!(b.start_time(), 50);
        assert_eq!(a.as_draft_seed(), b.as_draft_seed());

        let snapshot = b.snapshot(80, PlayType::Pvp);
        assert_eq!(snapshot.duration, 30);
        assert_eq!(snapshot.required, 2);
        assert_eq!(snapshot.record_id, b.record_id());
    }
}
