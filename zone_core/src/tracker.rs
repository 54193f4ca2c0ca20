//! Per-entity zone membership and transition detection.
//!
//! Each polled entity is in one of three states: untracked (no record yet),
//! outside every zone, or inside exactly one zone. A crossing produces
//! `Exit(old)` before `Enter(new)` and stamps the transition time. The
//! tracker does not apply cooldowns itself; it reports how long ago the
//! previous transition happened and lets the effect layer decide.

use std::collections::{BTreeMap, HashMap, HashSet};

use bevy::prelude::Resource;
use zone_runtime::{EntityId, Position, WorldAccess, ZoneId};

use crate::registry::ZoneView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Outside,
    InZone(ZoneId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityZoneState {
    pub membership: Membership,
    pub previous_zone: Option<ZoneId>,
    pub last_transition_at: Option<f64>,
    /// Set by an administrative override: the zone the entity's position
    /// resolved to when it was forced. Polling leaves the membership alone
    /// until the position resolves somewhere else.
    pub forced_anchor: Option<Option<ZoneId>>,
}

impl EntityZoneState {
    fn new() -> Self {
        Self {
            membership: Membership::Outside,
            previous_zone: None,
            last_transition_at: None,
            forced_anchor: None,
        }
    }

    pub fn current_zone(&self) -> Option<&ZoneId> {
        match &self.membership {
            Membership::InZone(zone) => Some(zone),
            Membership::Outside => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Enter,
    Exit,
}

impl TransitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionKind::Enter => "enter",
            TransitionKind::Exit => "exit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneTransition {
    pub entity: EntityId,
    pub kind: TransitionKind,
    pub zone: ZoneId,
    pub at: f64,
    /// Seconds since this entity's previous transition, if any.
    pub since_previous: Option<f64>,
}

impl ZoneTransition {
    pub fn within(&self, window: f64) -> bool {
        self.since_previous.is_some_and(|elapsed| elapsed < window)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedEntity {
    pub entity: EntityId,
    pub last_zone: Option<ZoneId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollOutcome {
    pub sampled: usize,
    pub transitions: Vec<ZoneTransition>,
    pub dropped: Vec<DroppedEntity>,
}

#[derive(Resource, Debug, Default)]
pub struct TransitionTracker {
    states: HashMap<EntityId, EntityZoneState>,
}

impl TransitionTracker {
    /// Samples every entity the world reports and resolves its zone.
    ///
    /// Entities that are no longer listed, or whose position can no longer
    /// be read, are removed and reported in [`PollOutcome::dropped`].
    pub fn poll(&mut self, view: &ZoneView, world: &dyn WorldAccess, now: f64) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        let mut seen = HashSet::new();

        for entity in world.tracked_entities() {
            let Some(position) = world.position(entity) else {
                continue;
            };
            if !seen.insert(entity) {
                continue;
            }
            outcome.sampled += 1;
            outcome
                .transitions
                .extend(self.observe(entity, &position, view, now));
        }

        let mut vanished: Vec<EntityId> = self
            .states
            .keys()
            .filter(|entity| !seen.contains(entity))
            .copied()
            .collect();
        vanished.sort_unstable();
        for entity in vanished {
            if let Some(state) = self.states.remove(&entity) {
                tracing::debug!(
                    target: "zones::tracker",
                    %entity,
                    last_zone = ?state.current_zone().map(ZoneId::as_str),
                    "entity.dropped"
                );
                outcome.dropped.push(DroppedEntity {
                    entity,
                    last_zone: state.current_zone().cloned(),
                });
            }
        }

        outcome
    }

    /// Resolves one entity at `position`, checking its current zone before
    /// scanning the view in priority order.
    pub fn observe(
        &mut self,
        entity: EntityId,
        position: &Position,
        view: &ZoneView,
        now: f64,
    ) -> Vec<ZoneTransition> {
        let state = self
            .states
            .entry(entity)
            .or_insert_with(EntityZoneState::new);

        let current_live = match &state.membership {
            Membership::InZone(current) => view.get(current),
            Membership::Outside => None,
        };
        // An override into a zone that was since disabled or removed lapses.
        if state.current_zone().is_some() && current_live.is_none() {
            state.forced_anchor = None;
        }

        if let Some(anchor) = &state.forced_anchor {
            let resolved = view.resolve(position).map(|zone| zone.id().clone());
            if &resolved == anchor {
                return Vec::new();
            }
            state.forced_anchor = None;
            return apply_transition(entity, state, resolved, now);
        }

        if current_live.is_some_and(|zone| zone.contains(position)) {
            return Vec::new();
        }

        let resolved = view.resolve(position).map(|zone| zone.id().clone());
        apply_transition(entity, state, resolved, now)
    }

    /// Moves an entity to `zone` (or outside) regardless of its position.
    ///
    /// `anchor` is the zone the entity's position currently resolves to;
    /// the override holds until that changes. Nothing is pinned when the
    /// entity already has the requested membership.
    pub fn force_membership(
        &mut self,
        entity: EntityId,
        zone: Option<ZoneId>,
        anchor: Option<ZoneId>,
        now: f64,
    ) -> Vec<ZoneTransition> {
        let state = self
            .states
            .entry(entity)
            .or_insert_with(EntityZoneState::new);
        let transitions = apply_transition(entity, state, zone, now);
        if !transitions.is_empty() {
            state.forced_anchor = Some(anchor);
        }
        transitions
    }

    pub fn clear(&mut self) -> usize {
        let count = self.states.len();
        self.states.clear();
        count
    }

    pub fn forget(&mut self, entity: EntityId) -> Option<EntityZoneState> {
        self.states.remove(&entity)
    }

    pub fn state(&self, entity: EntityId) -> Option<&EntityZoneState> {
        self.states.get(&entity)
    }

    pub fn is_in_zone(&self, entity: EntityId) -> Option<&ZoneId> {
        self.states.get(&entity).and_then(EntityZoneState::current_zone)
    }

    pub fn players_in_zone(&self, zone: &ZoneId) -> usize {
        self.states
            .values()
            .filter(|state| state.current_zone() == Some(zone))
            .count()
    }

    /// True when the entity's last transition happened less than `window`
    /// seconds before `now`.
    pub fn is_in_cooldown(&self, entity: EntityId, window: f64, now: f64) -> bool {
        self.states
            .get(&entity)
            .and_then(|state| state.last_transition_at)
            .is_some_and(|at| now - at < window)
    }

    pub fn occupancy(&self) -> BTreeMap<ZoneId, usize> {
        let mut counts = BTreeMap::new();
        for zone in self.states.values().filter_map(EntityZoneState::current_zone) {
            *counts.entry(zone.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Entities currently inside a zone, ordered by entity id.
    pub fn occupants(&self) -> Vec<(EntityId, ZoneId)> {
        let mut occupants: Vec<(EntityId, ZoneId)> = self
            .states
            .iter()
            .filter_map(|(entity, state)| state.current_zone().map(|zone| (*entity, zone.clone())))
            .collect();
        occupants.sort_by_key(|(entity, _)| *entity);
        occupants
    }

    pub fn tracked(&self) -> usize {
        self.states.len()
    }
}

fn apply_transition(
    entity: EntityId,
    state: &mut EntityZoneState,
    next: Option<ZoneId>,
    now: f64,
) -> Vec<ZoneTransition> {
    let current = state.current_zone().cloned();
    if current == next {
        return Vec::new();
    }

    let since_previous = state.last_transition_at.map(|at| now - at);
    let mut transitions = Vec::with_capacity(2);
    if let Some(zone) = current.clone() {
        transitions.push(ZoneTransition {
            entity,
            kind: TransitionKind::Exit,
            zone,
            at: now,
            since_previous,
        });
    }
    if let Some(zone) = next.clone() {
        transitions.push(ZoneTransition {
            entity,
            kind: TransitionKind::Enter,
            zone,
            at: now,
            since_previous,
        });
    }

    state.previous_zone = current;
    state.membership = match next {
        Some(zone) => Membership::InZone(zone),
        None => Membership::Outside,
    };
    state.last_transition_at = Some(now);
    transitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ZoneRegistry;
    use crate::testing::ScriptedWorld;
    use crate::zones::{ZoneDefinition, ZoneShape};

    fn registry() -> ZoneRegistry {
        ZoneRegistry::from_definitions(
            1.0,
            vec![
                ZoneDefinition::new("a", ZoneShape::rectangle(0.0, 10.0, 0.0, 10.0)),
                ZoneDefinition::new("b", ZoneShape::circle(30.0, 5.0, 5.0)),
            ],
        )
    }

    fn summary(transitions: &[ZoneTransition]) -> Vec<String> {
        transitions
            .iter()
            .map(|t| format!("{}({})", t.kind.as_str(), t.zone))
            .collect()
    }

    #[test]
    fn path_through_two_zones_emits_each_edge_once() {
        let view = registry().view();
        let mut tracker = TransitionTracker::default();
        let entity = EntityId(1);
        let path = [
            (-5.0, 5.0),
            (2.0, 5.0),
            (5.0, 5.0),
            (8.0, 5.0),
            (20.0, 5.0),
            (29.0, 5.0),
            (31.0, 6.0),
            (45.0, 5.0),
            (60.0, 5.0),
        ];
        let mut events = Vec::new();
        for (step, (x, z)) in path.iter().enumerate() {
            events.extend(tracker.observe(entity, &Position::new(*x, 0.0, *z), &view, step as f64));
        }
        assert_eq!(
            summary(&events),
            vec!["enter(a)", "exit(a)", "enter(b)", "exit(b)"]
        );
    }

    #[test]
    fn direct_hop_exits_before_entering() {
        let view = registry().view();
        let mut tracker = TransitionTracker::default();
        let entity = EntityId(2);
        tracker.observe(entity, &Position::new(5.0, 0.0, 5.0), &view, 0.0);
        let hop = tracker.observe(entity, &Position::new(30.0, 0.0, 5.0), &view, 1.0);
        assert_eq!(summary(&hop), vec!["exit(a)", "enter(b)"]);
        assert!(hop.iter().all(|t| t.since_previous == Some(1.0)));
        let state = tracker.state(entity).unwrap();
        assert_eq!(state.previous_zone.as_ref().map(ZoneId::as_str), Some("a"));
        assert_eq!(state.last_transition_at, Some(1.0));
    }

    #[test]
    fn disabling_current_zone_exits_on_next_observation() {
        let mut registry = registry();
        let mut tracker = TransitionTracker::default();
        let entity = EntityId(3);
        let inside = Position::new(5.0, 0.0, 5.0);
        tracker.observe(entity, &inside, &registry.view(), 0.0);
        registry.set_enabled(&ZoneId::from("a"), false);
        let events = tracker.observe(entity, &inside, &registry.view(), 1.0);
        assert_eq!(summary(&events), vec!["exit(a)"]);
        assert!(tracker.is_in_zone(entity).is_none());
    }

    #[test]
    fn cooldown_and_queries() {
        let view = registry().view();
        let mut tracker = TransitionTracker::default();
        let a = ZoneId::from("a");
        tracker.observe(EntityId(1), &Position::new(1.0, 0.0, 1.0), &view, 10.0);
        tracker.observe(EntityId(2), &Position::new(2.0, 0.0, 2.0), &view, 10.0);
        tracker.observe(EntityId(3), &Position::new(90.0, 0.0, 2.0), &view, 10.0);
        assert_eq!(tracker.players_in_zone(&a), 2);
        assert_eq!(tracker.is_in_zone(EntityId(1)), Some(&a));
        assert!(tracker.is_in_cooldown(EntityId(1), 2.0, 11.0));
        assert!(!tracker.is_in_cooldown(EntityId(1), 2.0, 12.5));
        assert!(!tracker.is_in_cooldown(EntityId(3), 2.0, 10.0));
        assert_eq!(tracker.occupancy().get(&a), Some(&2));
        assert_eq!(tracker.tracked(), 3);
    }

    #[test]
    fn force_membership_reports_transitions() {
        let mut tracker = TransitionTracker::default();
        let entity = EntityId(8);
        let forced = tracker.force_membership(entity, Some(ZoneId::from("b")), None, 0.0);
        assert_eq!(summary(&forced), vec!["enter(b)"]);
        assert!(tracker
            .force_membership(entity, Some(ZoneId::from("b")), None, 1.0)
            .is_empty());
        let out = tracker.force_membership(entity, None, None, 2.0);
        assert_eq!(summary(&out), vec!["exit(b)"]);
    }

    #[test]
    fn forced_membership_holds_until_position_resolves_elsewhere() {
        let view = registry().view();
        let mut tracker = TransitionTracker::default();
        let entity = EntityId(9);
        let outside = Position::new(50.0, 0.0, 50.0);
        tracker.observe(entity, &outside, &view, 0.0);
        tracker.force_membership(entity, Some(ZoneId::from("a")), None, 1.0);

        // Still outside everything: the override holds.
        assert!(tracker.observe(entity, &outside, &view, 2.0).is_empty());
        assert_eq!(tracker.is_in_zone(entity), Some(&ZoneId::from("a")));

        // Walking into b releases the override.
        let moved = tracker.observe(entity, &Position::new(30.0, 0.0, 5.0), &view, 3.0);
        assert_eq!(summary(&moved), vec!["exit(a)", "enter(b)"]);
        assert!(tracker.state(entity).unwrap().forced_anchor.is_none());
    }

    #[test]
    fn forced_exit_does_not_reenter_in_place() {
        let view = registry().view();
        let mut tracker = TransitionTracker::default();
        let entity = EntityId(10);
        let inside = Position::new(5.0, 0.0, 5.0);
        tracker.observe(entity, &inside, &view, 0.0);
        let out = tracker.force_membership(entity, None, Some(ZoneId::from("a")), 1.0);
        assert_eq!(summary(&out), vec!["exit(a)"]);
        assert!(tracker.observe(entity, &inside, &view, 2.0).is_empty());

        let left = tracker.observe(entity, &Position::new(50.0, 0.0, 50.0), &view, 3.0);
        assert!(left.is_empty());
        let back = tracker.observe(entity, &inside, &view, 4.0);
        assert_eq!(summary(&back), vec!["enter(a)"]);
    }

    #[test]
    fn poll_drops_vanished_entities() {
        let view = registry().view();
        let world = ScriptedWorld::new();
        world.spawn(EntityId(1), Position::new(5.0, 0.0, 5.0));
        world.spawn(EntityId(2), Position::new(50.0, 0.0, 5.0));
        let mut tracker = TransitionTracker::default();

        let first = tracker.poll(&view, &world, 0.0);
        assert_eq!(first.sampled, 2);
        assert_eq!(summary(&first.transitions), vec!["enter(a)"]);

        world.despawn(EntityId(1));
        let second = tracker.poll(&view, &world, 1.0);
        assert_eq!(second.sampled, 1);
        assert!(second.transitions.is_empty());
        assert_eq!(
            second.dropped,
            vec![DroppedEntity {
                entity: EntityId(1),
                last_zone: Some(ZoneId::from("a")),
            }]
        );
        assert_eq!(tracker.tracked(), 1);
    }
}
