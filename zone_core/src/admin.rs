//! Administrative overrides and queries against a running zone app.
//!
//! Overrides go through the same effect pipeline as polled transitions and
//! publish the same events, flagged `forced`.

use bevy::{ecs::system::SystemState, prelude::*};
use zone_runtime::{EntityId, ZoneId};

use crate::{
    pipeline::EffectPipeline,
    registry::{ReloadReport, ZoneRegistry},
    snapshot::SnapshotStore,
    systems::ZoneTickParams,
    tracker::{TransitionKind, TransitionTracker, ZoneTransition},
    zones::ZoneDefinition,
};

/// Moves `entity` into `zone`, or into the default zone when `zone` is
/// `None`. Returns `false` when the zone is unknown or disabled, the
/// entity is not in the world, or it is already there.
pub fn force_enter(world: &mut World, entity: EntityId, zone: Option<&ZoneId>) -> bool {
    let mut state: SystemState<ZoneTickParams> = SystemState::new(world);
    let mut params = state.get_mut(world);
    let view = params.registry.view();

    let target = match zone {
        Some(id) => view.get(id),
        None => view.default_entry(),
    };
    let Some(target) = target.map(|entry| entry.id().clone()) else {
        tracing::warn!(
            target: "zones::admin",
            %entity,
            zone = ?zone.map(ZoneId::as_str),
            "admin.force_enter_unknown_zone"
        );
        return false;
    };
    let Some(position) = params.world.get().position(entity) else {
        tracing::warn!(target: "zones::admin", %entity, "admin.entity_unknown");
        return false;
    };

    let anchor = view.resolve(&position).map(|entry| entry.id().clone());
    let now = params.clock.seconds;
    let transitions = params
        .tracker
        .force_membership(entity, Some(target.clone()), anchor, now);
    if transitions.is_empty() {
        return false;
    }
    params.apply_transitions(&view, &transitions, true);
    tracing::info!(target: "zones::admin", %entity, zone = %target, "admin.force_enter");
    true
}

/// Takes `entity` out of its current zone. Returns `false` when it is not
/// in one.
pub fn force_exit(world: &mut World, entity: EntityId) -> bool {
    let mut state: SystemState<ZoneTickParams> = SystemState::new(world);
    let mut params = state.get_mut(world);
    let view = params.registry.view();

    let Some(current) = params.tracker.is_in_zone(entity).cloned() else {
        return false;
    };
    let anchor = params
        .world
        .get()
        .position(entity)
        .and_then(|position| view.resolve(&position))
        .map(|entry| entry.id().clone());
    let now = params.clock.seconds;
    let transitions = params.tracker.force_membership(entity, None, anchor, now);
    params.apply_transitions(&view, &transitions, true);
    tracing::info!(target: "zones::admin", %entity, zone = %current, "admin.force_exit");
    true
}

pub fn is_in_zone(world: &World, entity: EntityId) -> Option<ZoneId> {
    world
        .resource::<TransitionTracker>()
        .is_in_zone(entity)
        .cloned()
}

pub fn players_in_zone(world: &World, zone: &ZoneId) -> usize {
    world.resource::<TransitionTracker>().players_in_zone(zone)
}

/// Replaces every zone definition. Entities inside a zone that disappeared
/// or became disabled exit on the next tick, with their state restored.
pub fn reload_zones(world: &mut World, definitions: Vec<ZoneDefinition>) -> ReloadReport {
    let report = world.resource_mut::<ZoneRegistry>().reload(definitions);
    tracing::info!(
        target: "zones::admin",
        accepted = report.accepted,
        rejected = report.rejected.len(),
        "admin.reload"
    );
    report
}

/// Runs the exit pipeline for every entity still inside a zone, then drops
/// any snapshot left behind. Returns how many entities were exited.
pub fn shutdown(world: &mut World) -> usize {
    let mut state: SystemState<ZoneTickParams> = SystemState::new(world);
    let mut params = state.get_mut(world);
    let view = params.registry.view();
    let now = params.clock.seconds;

    let mut open = params.pipeline.active_entities();
    for (entity, zone) in params.tracker.occupants() {
        if !open.iter().any(|(active, _)| *active == entity) {
            open.push((entity, zone));
        }
    }
    let transitions: Vec<ZoneTransition> = open
        .into_iter()
        .map(|(entity, zone)| ZoneTransition {
            entity,
            kind: TransitionKind::Exit,
            zone,
            at: now,
            since_previous: None,
        })
        .collect();

    params.apply_transitions(&view, &transitions, true);
    params.tracker.clear();
    let leftover = params.snapshots.clear();
    tracing::info!(
        target: "zones::admin",
        exited = transitions.len(),
        leftover_snapshots = leftover,
        "admin.shutdown"
    );
    transitions.len()
}

/// Entities with an open zone visit, for diagnostics.
pub fn active_visits(world: &World) -> Vec<(EntityId, ZoneId)> {
    world.resource::<EffectPipeline>().active_entities()
}

pub fn live_snapshots(world: &World) -> usize {
    world.resource::<SnapshotStore>().len()
}
