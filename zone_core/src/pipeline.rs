//! Ordered, best-effort zone effects.
//!
//! Enter: backup state, grant unlocks, equip loadout, spawn transients,
//! teleport in, notify. Exit: clean up transients, unequip loadout, restore
//! state, teleport back, notify. Each step may fail on its own; the failure
//! is logged and the next step runs. The only early stop is an entity that
//! no longer exists, in which case everything it still holds is released.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use bevy::prelude::Resource;
use zone_runtime::{
    EffectSink, EntityId, Position, ProgressionCategory, ProgressionSnapshot, TransientHandle,
    WorldAccess, WorldError, ZoneId,
};

use crate::{
    error::ZoneError,
    registry::ZoneEntry,
    snapshot::{RestoreOutcome, SnapshotData, SnapshotProfile, SnapshotStore},
    zones::{DebugEventFlags, ZoneEffects},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectStep {
    BackupState,
    GrantUnlocks,
    EquipLoadout,
    SpawnTransients,
    TeleportIn,
    NotifyEnter,
    CleanupTransients,
    UnequipLoadout,
    RestoreState,
    TeleportBack,
    NotifyExit,
}

impl EffectStep {
    pub const ENTER: [EffectStep; 6] = [
        EffectStep::BackupState,
        EffectStep::GrantUnlocks,
        EffectStep::EquipLoadout,
        EffectStep::SpawnTransients,
        EffectStep::TeleportIn,
        EffectStep::NotifyEnter,
    ];

    pub const EXIT: [EffectStep; 5] = [
        EffectStep::CleanupTransients,
        EffectStep::UnequipLoadout,
        EffectStep::RestoreState,
        EffectStep::TeleportBack,
        EffectStep::NotifyExit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EffectStep::BackupState => "backup_state",
            EffectStep::GrantUnlocks => "grant_unlocks",
            EffectStep::EquipLoadout => "equip_loadout",
            EffectStep::SpawnTransients => "spawn_transients",
            EffectStep::TeleportIn => "teleport_in",
            EffectStep::NotifyEnter => "notify_enter",
            EffectStep::CleanupTransients => "cleanup_transients",
            EffectStep::UnequipLoadout => "unequip_loadout",
            EffectStep::RestoreState => "restore_state",
            EffectStep::TeleportBack => "teleport_back",
            EffectStep::NotifyExit => "notify_exit",
        }
    }
}

impl fmt::Display for EffectStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicitly registered collaborators notified on enter and exit.
#[derive(Resource, Default, Clone)]
pub struct EffectSinks {
    sinks: Vec<(String, Arc<dyn EffectSink>)>,
}

impl fmt::Debug for EffectSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|(name, _)| name))
            .finish()
    }
}

impl EffectSinks {
    pub fn register(&mut self, name: impl Into<String>, sink: Arc<dyn EffectSink>) {
        self.sinks.push((name.into(), sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sinks.iter().map(|(name, _)| name.as_str())
    }

    fn dispatch(
        &self,
        step: EffectStep,
        entity: EntityId,
        zone: &ZoneId,
    ) -> Result<bool, ZoneError> {
        let mut failures = Vec::new();
        for (name, sink) in &self.sinks {
            let result = match step {
                EffectStep::NotifyEnter => sink.on_enter(entity, zone),
                _ => sink.on_exit(entity, zone),
            };
            if let Err(err) = result {
                failures.push(format!("{name}: {err}"));
            }
        }
        if failures.is_empty() {
            Ok(!self.sinks.is_empty())
        } else {
            Err(ZoneError::EffectStepFailed {
                step,
                entity,
                reason: failures.join("; "),
            })
        }
    }
}

/// Everything a pipeline run reads from the outside.
pub struct EffectContext<'a> {
    pub world: &'a dyn WorldAccess,
    pub snapshots: &'a SnapshotStore,
    pub sinks: &'a EffectSinks,
    pub now: f64,
    /// Suppresses player-facing messages for transitions inside the
    /// cooldown window. State steps still run.
    pub quiet: bool,
}

/// Result of one enter or exit run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub entity: EntityId,
    pub zone: ZoneId,
    pub completed: Vec<EffectStep>,
    pub failed: Vec<ZoneError>,
    /// Step at which the run stopped because the entity vanished.
    pub aborted: Option<EffectStep>,
}

impl PipelineReport {
    fn new(entity: EntityId, zone: &ZoneId) -> Self {
        Self {
            entity,
            zone: zone.clone(),
            completed: Vec::new(),
            failed: Vec::new(),
            aborted: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_none()
    }
}

/// What an entity picked up while inside a zone, undone on exit.
#[derive(Debug, Clone)]
struct ActiveVisit {
    zone: ZoneId,
    effects: ZoneEffects,
    debug: DebugEventFlags,
    return_point: Option<Position>,
    transients: Vec<TransientHandle>,
    loadout: Option<String>,
}

impl ActiveVisit {
    fn new(zone: &ZoneEntry) -> Self {
        Self {
            zone: zone.id().clone(),
            effects: zone.effects().clone(),
            debug: zone.definition().debug,
            return_point: None,
            transients: Vec::new(),
            loadout: None,
        }
    }

    fn orphan(zone: &ZoneId) -> Self {
        Self {
            zone: zone.clone(),
            effects: ZoneEffects {
                teleport_back: false,
                ..ZoneEffects::default()
            },
            debug: DebugEventFlags::empty(),
            return_point: None,
            transients: Vec::new(),
            loadout: None,
        }
    }

    fn traced(&self) -> bool {
        self.debug.contains(DebugEventFlags::TRACE_EFFECTS)
    }
}

#[derive(Resource, Debug, Default)]
pub struct EffectPipeline {
    visits: HashMap<EntityId, ActiveVisit>,
}

impl EffectPipeline {
    pub fn run_enter(
        &mut self,
        ctx: &EffectContext<'_>,
        entity: EntityId,
        zone: &ZoneEntry,
    ) -> PipelineReport {
        let mut visit = ActiveVisit::new(zone);
        let mut report = PipelineReport::new(entity, zone.id());

        for step in EffectStep::ENTER {
            let outcome = enter_step(ctx, step, entity, zone, &mut visit);
            if !record(ctx, &mut report, step, outcome, visit.traced()) {
                break;
            }
        }

        self.visits.insert(entity, visit);
        if report.aborted.is_some() {
            self.release_entity(ctx.world, ctx.snapshots, entity);
        }
        report
    }

    /// Undoes the visit recorded for `entity`. Zones removed by a reload
    /// are exited with the effects captured when the entity entered.
    pub fn run_exit(
        &mut self,
        ctx: &EffectContext<'_>,
        entity: EntityId,
        zone: &ZoneId,
    ) -> PipelineReport {
        let mut visit = match self.visits.remove(&entity) {
            Some(visit) if &visit.zone == zone => visit,
            Some(visit) => {
                tracing::warn!(
                    target: "zones::effects",
                    %entity,
                    recorded = %visit.zone,
                    exiting = %zone,
                    "effect.visit_mismatch"
                );
                visit
            }
            None => ActiveVisit::orphan(zone),
        };
        let mut report = PipelineReport::new(entity, zone);

        for step in EffectStep::EXIT {
            let outcome = exit_step(ctx, step, entity, &mut visit);
            if !record(ctx, &mut report, step, outcome, visit.traced()) {
                break;
            }
        }

        if report.aborted.is_some() {
            self.visits.insert(entity, visit);
            self.release_entity(ctx.world, ctx.snapshots, entity);
        }
        report
    }

    /// Drops everything held for `entity` without restoring it: snapshots,
    /// transients and the recorded return point. Returns the number of
    /// snapshots discarded.
    pub fn release_entity(
        &mut self,
        world: &dyn WorldAccess,
        snapshots: &SnapshotStore,
        entity: EntityId,
    ) -> usize {
        if let Some(visit) = self.visits.remove(&entity) {
            for handle in visit.transients {
                if let Err(err) = world.despawn_transient(handle) {
                    tracing::debug!(
                        target: "zones::effects",
                        %entity,
                        handle = handle.0,
                        error = %err,
                        "effect.release_transient_failed"
                    );
                }
            }
        }
        snapshots.discard_all_for(entity)
    }

    pub fn active_zone(&self, entity: EntityId) -> Option<&ZoneId> {
        self.visits.get(&entity).map(|visit| &visit.zone)
    }

    /// Entities with an open visit, ordered by id.
    pub fn active_entities(&self) -> Vec<(EntityId, ZoneId)> {
        let mut active: Vec<(EntityId, ZoneId)> = self
            .visits
            .iter()
            .map(|(entity, visit)| (*entity, visit.zone.clone()))
            .collect();
        active.sort_by_key(|(entity, _)| *entity);
        active
    }

    pub fn live_transients(&self) -> usize {
        self.visits.values().map(|visit| visit.transients.len()).sum()
    }
}

/// Records a step outcome. Returns `false` when the run must stop.
fn record(
    ctx: &EffectContext<'_>,
    report: &mut PipelineReport,
    step: EffectStep,
    outcome: Result<bool, ZoneError>,
    traced: bool,
) -> bool {
    let entity = report.entity;
    match outcome {
        Ok(ran) => {
            if ran {
                report.completed.push(step);
                if traced {
                    tracing::info!(
                        target: "zones::effects",
                        %entity,
                        zone = %report.zone,
                        step = step.as_str(),
                        "effect.step_done"
                    );
                } else {
                    tracing::debug!(
                        target: "zones::effects",
                        %entity,
                        zone = %report.zone,
                        step = step.as_str(),
                        "effect.step_done"
                    );
                }
            }
            true
        }
        Err(err) => {
            if err.is_entity_gone() || !ctx.world.exists(entity) {
                tracing::info!(
                    target: "zones::effects",
                    %entity,
                    zone = %report.zone,
                    step = step.as_str(),
                    "effect.aborted_entity_gone"
                );
                report.aborted = Some(step);
                return false;
            }
            tracing::warn!(
                target: "zones::effects",
                %entity,
                zone = %report.zone,
                step = step.as_str(),
                error = %err,
                "effect.step_failed"
            );
            report.failed.push(err);
            true
        }
    }
}

fn enter_step(
    ctx: &EffectContext<'_>,
    step: EffectStep,
    entity: EntityId,
    zone: &ZoneEntry,
    visit: &mut ActiveVisit,
) -> Result<bool, ZoneError> {
    let world = ctx.world;
    let fail = |err| ZoneError::from_world(step, entity, err);
    match step {
        EffectStep::BackupState => backup_state(ctx, entity, &visit.effects),
        EffectStep::GrantUnlocks => {
            for (category, unlocks) in &visit.effects.unlocks {
                world
                    .apply_progression(entity, *category, unlocks)
                    .map_err(fail)?;
            }
            Ok(!visit.effects.unlocks.is_empty())
        }
        EffectStep::EquipLoadout => {
            let Some(loadout) = visit.effects.loadout.clone() else {
                return Ok(false);
            };
            world.equip_loadout(entity, &loadout).map_err(fail)?;
            visit.loadout = Some(loadout);
            Ok(true)
        }
        EffectStep::SpawnTransients => {
            if visit.effects.transients.is_empty() {
                return Ok(false);
            }
            let at = world.position(entity).ok_or(ZoneError::EntityGone(entity))?;
            let mut last_error = None;
            for prefab in &visit.effects.transients {
                match world.spawn_transient(entity, prefab, at) {
                    Ok(handle) => visit.transients.push(handle),
                    Err(err) => last_error = Some(fail(err)),
                }
            }
            last_error.map_or(Ok(true), Err)
        }
        EffectStep::TeleportIn => {
            let Some(target) = visit.effects.teleport_in else {
                return Ok(false);
            };
            let origin = world.position(entity).ok_or(ZoneError::EntityGone(entity))?;
            world.teleport(entity, target).map_err(fail)?;
            // Returning to a point inside the zone would re-enter it.
            if !zone.contains(&origin) {
                visit.return_point = Some(origin);
            }
            Ok(true)
        }
        EffectStep::NotifyEnter => {
            let mut ran = false;
            if let Some(message) = visit.effects.enter_message.as_deref() {
                if !ctx.quiet {
                    world.notify(entity, message);
                    ran = true;
                }
            }
            let dispatched = ctx.sinks.dispatch(step, entity, &visit.zone)?;
            Ok(ran || dispatched)
        }
        _ => Ok(false),
    }
}

fn exit_step(
    ctx: &EffectContext<'_>,
    step: EffectStep,
    entity: EntityId,
    visit: &mut ActiveVisit,
) -> Result<bool, ZoneError> {
    let world = ctx.world;
    let fail = |err| ZoneError::from_world(step, entity, err);
    match step {
        EffectStep::CleanupTransients => {
            if visit.transients.is_empty() {
                return Ok(false);
            }
            let mut last_error = None;
            for handle in std::mem::take(&mut visit.transients) {
                if let Err(err) = world.despawn_transient(handle) {
                    last_error = Some(fail(err));
                }
            }
            last_error.map_or(Ok(true), Err)
        }
        EffectStep::UnequipLoadout => {
            let Some(loadout) = visit.loadout.take() else {
                return Ok(false);
            };
            world.unequip_loadout(entity, &loadout).map_err(fail)?;
            Ok(true)
        }
        EffectStep::RestoreState => {
            let returning = visit.return_point.is_some() && visit.effects.teleport_back;
            restore_state(ctx, entity, returning)
        }
        EffectStep::TeleportBack => {
            let Some(origin) = visit.return_point.take() else {
                return Ok(false);
            };
            if !visit.effects.teleport_back {
                return Ok(false);
            }
            world.teleport(entity, origin).map_err(fail)?;
            Ok(true)
        }
        EffectStep::NotifyExit => {
            let mut ran = false;
            if let Some(message) = visit.effects.exit_message.as_deref() {
                if !ctx.quiet {
                    world.notify(entity, message);
                    ran = true;
                }
            }
            let dispatched = ctx.sinks.dispatch(step, entity, &visit.zone)?;
            Ok(ran || dispatched)
        }
        _ => Ok(false),
    }
}

fn backup_state(
    ctx: &EffectContext<'_>,
    entity: EntityId,
    effects: &ZoneEffects,
) -> Result<bool, ZoneError> {
    let step = EffectStep::BackupState;
    let world = ctx.world;
    let mut ran = false;
    let mut last_error = None;

    if effects.snapshot_progression {
        let stored = ctx
            .snapshots
            .backup(entity, SnapshotProfile::Progression, ctx.now, || {
                let mut captured = ProgressionSnapshot::new();
                for category in ProgressionCategory::ALL {
                    let unlocks = world
                        .capture_progression(entity, category)
                        .map_err(|err| ZoneError::from_world(step, entity, err))?;
                    captured.insert(category, unlocks);
                }
                Ok(SnapshotData::Progression(captured))
            });
        match stored {
            Ok(_) => ran = true,
            Err(err) if err.is_entity_gone() => return Err(err),
            Err(err) => last_error = Some(err),
        }
    }

    if effects.snapshot_physical {
        let stored = ctx
            .snapshots
            .backup(entity, SnapshotProfile::Physical, ctx.now, || {
                world
                    .capture_physical(entity)
                    .map(SnapshotData::Physical)
                    .map_err(|err| ZoneError::from_world(step, entity, err))
            });
        match stored {
            Ok(_) => ran = true,
            Err(err) => last_error = Some(err),
        }
    }

    last_error.map_or(Ok(ran), Err)
}

/// Restores every live profile for `entity`. A profile with nothing stored
/// is skipped; progression is cleared per category before reapplying.
///
/// The captured position is only written back when the entity is being
/// returned to where it came from; otherwise it keeps its current position.
fn restore_state(
    ctx: &EffectContext<'_>,
    entity: EntityId,
    restore_position: bool,
) -> Result<bool, ZoneError> {
    let step = EffectStep::RestoreState;
    let world = ctx.world;
    let fail = |err| ZoneError::from_world(step, entity, err);
    let mut ran = false;
    let mut last_error = None;

    for profile in SnapshotProfile::ALL {
        let outcome = ctx
            .snapshots
            .restore(entity, profile, |snapshot| match snapshot.data {
                SnapshotData::Physical(mut physical) => {
                    if !restore_position {
                        physical.position = world
                            .position(entity)
                            .ok_or(ZoneError::EntityGone(entity))?;
                    }
                    world.apply_physical(entity, &physical).map_err(fail)
                }
                SnapshotData::Progression(captured) => {
                    restore_progression(world, entity, &captured)
                }
            });
        match outcome {
            Ok(RestoreOutcome::Restored) => ran = true,
            Ok(RestoreOutcome::NotFound) => {
                tracing::debug!(
                    target: "zones::snapshots",
                    %entity,
                    error = %ZoneError::SnapshotNotFound { entity, profile },
                    "snapshot.restore_skipped"
                );
            }
            Err(err) if err.is_entity_gone() => return Err(err),
            Err(err) => last_error = Some(err),
        }
    }

    last_error.map_or(Ok(ran), Err)
}

/// Clears and reapplies every category, even after one of them fails.
/// Failures are folded into a single error once all categories ran.
fn restore_progression(
    world: &dyn WorldAccess,
    entity: EntityId,
    captured: &ProgressionSnapshot,
) -> Result<(), ZoneError> {
    let step = EffectStep::RestoreState;
    let empty = BTreeSet::new();
    let mut failures = Vec::new();
    for category in ProgressionCategory::ALL {
        let unlocks = captured.get(&category).unwrap_or(&empty);
        let result = world.clear_progression(entity, category).and_then(|()| {
            if unlocks.is_empty() {
                Ok(())
            } else {
                world.apply_progression(entity, category, unlocks)
            }
        });
        match result {
            Ok(()) => {}
            Err(WorldError::EntityGone(_)) => return Err(ZoneError::EntityGone(entity)),
            Err(err) => failures.push(format!("{}: {err}", category.as_str())),
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ZoneError::EffectStepFailed {
            step,
            entity,
            reason: failures.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use parking_lot::Mutex;
    use zone_runtime::{CapabilityId, SinkError};

    use super::*;
    use crate::testing::ScriptedWorld;
    use crate::zones::{ZoneDefinition, ZoneShape};

    const TECH: ProgressionCategory = ProgressionCategory::TechUnlocks;

    fn arena(effects: ZoneEffects) -> ZoneEntry {
        ZoneEntry::build(
            ZoneDefinition::new("arena", ZoneShape::rectangle(0.0, 10.0, 0.0, 10.0))
                .with_effects(effects),
            1.0,
        )
        .unwrap()
    }

    fn unlocks(ids: &[u32]) -> BTreeMap<ProgressionCategory, BTreeSet<CapabilityId>> {
        let mut map = BTreeMap::new();
        map.insert(TECH, ids.iter().copied().map(CapabilityId).collect());
        map
    }

    fn ctx<'a>(
        world: &'a ScriptedWorld,
        store: &'a SnapshotStore,
        sinks: &'a EffectSinks,
    ) -> EffectContext<'a> {
        EffectContext {
            world,
            snapshots: store,
            sinks,
            now: 1.0,
            quiet: false,
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    impl EffectSink for RecordingSink {
        fn on_enter(&self, entity: EntityId, zone: &ZoneId) -> Result<(), SinkError> {
            self.seen.lock().push(format!("enter {entity} {zone}"));
            if self.fail {
                return Err(SinkError("kit service offline".to_string()));
            }
            Ok(())
        }

        fn on_exit(&self, entity: EntityId, zone: &ZoneId) -> Result<(), SinkError> {
            self.seen.lock().push(format!("exit {entity} {zone}"));
            Ok(())
        }
    }

    #[test]
    fn unlocks_are_reverted_exactly() {
        let world = ScriptedWorld::new();
        let store = SnapshotStore::default();
        let sinks = EffectSinks::default();
        let entity = EntityId(1);
        world.spawn(entity, Position::new(1.0, 0.0, 1.0));
        world.grant(entity, TECH, &[1, 2]);
        world.grant(entity, ProgressionCategory::Achievements, &[3]);
        let zone = arena(ZoneEffects {
            unlocks: unlocks(&[1, 2, 3]),
            ..ZoneEffects::default()
        });

        let mut pipeline = EffectPipeline::default();
        let ctx = ctx(&world, &store, &sinks);
        let enter = pipeline.run_enter(&ctx, entity, &zone);
        assert!(enter.is_clean());
        assert_eq!(world.unlocked(entity, TECH), BTreeSet::from([1, 2, 3]));

        let exit = pipeline.run_exit(&ctx, entity, zone.id());
        assert!(exit.is_clean());
        assert!(exit.completed.contains(&EffectStep::RestoreState));
        assert_eq!(world.unlocked(entity, TECH), BTreeSet::from([1, 2]));
        assert_eq!(
            world.unlocked(entity, ProgressionCategory::Achievements),
            BTreeSet::from([3])
        );
        assert!(store.is_empty());
    }

    #[test]
    fn one_locked_category_does_not_block_the_rest() {
        let world = ScriptedWorld::new();
        let store = SnapshotStore::default();
        let sinks = EffectSinks::default();
        let entity = EntityId(11);
        world.spawn(entity, Position::new(1.0, 0.0, 1.0));
        world.grant(entity, TECH, &[1, 2]);
        let zone = arena(ZoneEffects {
            unlocks: unlocks(&[1, 2, 3]),
            ..ZoneEffects::default()
        });

        let mut pipeline = EffectPipeline::default();
        let ctx = ctx(&world, &store, &sinks);
        pipeline.run_enter(&ctx, entity, &zone);
        world.lock_category(ProgressionCategory::BossUnlocks);

        let exit = pipeline.run_exit(&ctx, entity, zone.id());
        assert_eq!(world.unlocked(entity, TECH), BTreeSet::from([1, 2]));
        assert!(store.is_empty());
        assert_eq!(exit.aborted, None);
        assert_eq!(exit.failed.len(), 1);
        match &exit.failed[0] {
            ZoneError::EffectStepFailed { step, reason, .. } => {
                assert_eq!(*step, EffectStep::RestoreState);
                assert!(reason.contains("boss_unlocks"));
            }
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[test]
    fn teleport_records_and_returns_to_origin() {
        let world = ScriptedWorld::new();
        let store = SnapshotStore::default();
        let sinks = EffectSinks::default();
        let entity = EntityId(2);
        let origin = Position::new(-20.0, 1.0, -20.0);
        world.spawn(entity, origin);
        let zone = arena(ZoneEffects {
            teleport_in: Some(Position::new(100.0, 0.0, 100.0)),
            ..ZoneEffects::default()
        });

        let mut pipeline = EffectPipeline::default();
        let ctx = ctx(&world, &store, &sinks);
        pipeline.run_enter(&ctx, entity, &zone);
        assert_eq!(world.position(entity), Some(Position::new(100.0, 0.0, 100.0)));
        let exit = pipeline.run_exit(&ctx, entity, zone.id());
        assert!(exit.completed.contains(&EffectStep::TeleportBack));
        assert_eq!(world.position(entity), Some(origin));
    }

    #[test]
    fn walking_in_keeps_no_return_point() {
        let world = ScriptedWorld::new();
        let store = SnapshotStore::default();
        let sinks = EffectSinks::default();
        let entity = EntityId(12);
        world.spawn(entity, Position::new(1.0, 0.0, 1.0));
        let zone = arena(ZoneEffects {
            teleport_in: Some(Position::new(5.0, 0.0, 5.0)),
            snapshot_physical: true,
            ..ZoneEffects::default()
        });

        let mut pipeline = EffectPipeline::default();
        let ctx = ctx(&world, &store, &sinks);
        pipeline.run_enter(&ctx, entity, &zone);
        world.set_health(entity, 10.0);
        world.move_to(entity, Position::new(30.0, 0.0, 5.0));

        let exit = pipeline.run_exit(&ctx, entity, zone.id());
        assert!(!exit.completed.contains(&EffectStep::TeleportBack));
        let physical = world.physical(entity).unwrap();
        assert_eq!(physical.health, 100.0);
        assert_eq!(physical.position, Position::new(30.0, 0.0, 5.0));
    }

    #[test]
    fn failing_step_does_not_stop_later_steps() {
        let world = ScriptedWorld::new();
        let store = SnapshotStore::default();
        let sinks = EffectSinks::default();
        let entity = EntityId(3);
        world.spawn(entity, Position::new(1.0, 0.0, 1.0));
        world.fail("equip_loadout");
        let zone = arena(ZoneEffects {
            loadout: Some("duelist".to_string()),
            transients: vec!["banner".to_string()],
            enter_message: Some("welcome".to_string()),
            ..ZoneEffects::default()
        });

        let mut pipeline = EffectPipeline::default();
        let report = pipeline.run_enter(&ctx(&world, &store, &sinks), entity, &zone);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            report.failed[0],
            ZoneError::EffectStepFailed {
                step: EffectStep::EquipLoadout,
                ..
            }
        ));
        assert!(report.aborted.is_none());
        assert!(report.completed.contains(&EffectStep::SpawnTransients));
        assert!(report.completed.contains(&EffectStep::NotifyEnter));
        assert_eq!(world.live_transients(), 1);
        assert_eq!(world.notifications(), vec![(entity, "welcome".to_string())]);
    }

    #[test]
    fn vanished_entity_aborts_and_releases() {
        let world = ScriptedWorld::new();
        let store = SnapshotStore::default();
        let sinks = EffectSinks::default();
        let entity = EntityId(4);
        world.spawn(entity, Position::new(1.0, 0.0, 1.0));
        let zone = arena(ZoneEffects {
            transients: vec!["banner".to_string()],
            snapshot_physical: true,
            ..ZoneEffects::default()
        });

        let mut pipeline = EffectPipeline::default();
        let ctx = ctx(&world, &store, &sinks);
        pipeline.run_enter(&ctx, entity, &zone);
        assert_eq!(store.len(), 2);
        world.despawn(entity);

        let exit = pipeline.run_exit(&ctx, entity, zone.id());
        assert_eq!(exit.aborted, Some(EffectStep::RestoreState));
        assert!(exit.completed.contains(&EffectStep::CleanupTransients));
        assert_eq!(world.live_transients(), 0);
        assert!(store.is_empty());
        assert!(pipeline.active_zone(entity).is_none());
        assert_eq!(pipeline.live_transients(), 0);
    }

    #[test]
    fn quiet_runs_skip_messages_but_keep_state_steps() {
        let world = ScriptedWorld::new();
        let store = SnapshotStore::default();
        let sinks = EffectSinks::default();
        let entity = EntityId(5);
        world.spawn(entity, Position::new(1.0, 0.0, 1.0));
        let zone = arena(ZoneEffects {
            enter_message: Some("welcome".to_string()),
            ..ZoneEffects::default()
        });

        let mut pipeline = EffectPipeline::default();
        let ctx = EffectContext {
            quiet: true,
            ..ctx(&world, &store, &sinks)
        };
        let report = pipeline.run_enter(&ctx, entity, &zone);
        assert!(world.notifications().is_empty());
        assert_eq!(report.completed, vec![EffectStep::BackupState]);
        assert!(store.contains(entity, SnapshotProfile::Progression));
    }

    #[test]
    fn sinks_are_called_and_failures_reported() {
        let world = ScriptedWorld::new();
        let store = SnapshotStore::default();
        let good = Arc::new(RecordingSink::default());
        let bad = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let mut sinks = EffectSinks::default();
        sinks.register("score", good.clone());
        sinks.register("kits", bad.clone());
        let entity = EntityId(6);
        world.spawn(entity, Position::new(1.0, 0.0, 1.0));
        let zone = arena(ZoneEffects::default());

        let mut pipeline = EffectPipeline::default();
        let ctx = ctx(&world, &store, &sinks);
        let enter = pipeline.run_enter(&ctx, entity, &zone);
        assert_eq!(enter.failed.len(), 1);
        assert_eq!(good.seen.lock().as_slice(), ["enter 6 arena"]);
        assert_eq!(bad.seen.lock().as_slice(), ["enter 6 arena"]);

        let exit = pipeline.run_exit(&ctx, entity, zone.id());
        assert!(exit.is_clean());
        assert_eq!(good.seen.lock().len(), 2);
    }

    #[test]
    fn exit_without_recorded_visit_still_restores() {
        let world = ScriptedWorld::new();
        let store = SnapshotStore::default();
        let sinks = EffectSinks::default();
        let entity = EntityId(7);
        world.spawn(entity, Position::new(1.0, 0.0, 1.0));
        world.grant(entity, TECH, &[1]);
        store
            .backup(entity, SnapshotProfile::Progression, 0.0, || {
                let mut captured = ProgressionSnapshot::new();
                captured.insert(TECH, BTreeSet::new());
                Ok(SnapshotData::Progression(captured))
            })
            .unwrap();

        let mut pipeline = EffectPipeline::default();
        let report = pipeline.run_exit(
            &ctx(&world, &store, &sinks),
            entity,
            &ZoneId::from("gone"),
        );
        assert_eq!(report.completed, vec![EffectStep::RestoreState]);
        assert!(world.unlocked(entity, TECH).is_empty());
    }
}
