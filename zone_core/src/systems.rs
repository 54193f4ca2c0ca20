use bevy::{ecs::system::SystemParam, prelude::*};
use zone_runtime::WorldAccess;

use crate::{
    events::{ZoneEntered, ZoneExited},
    metrics::ZoneMetrics,
    pipeline::{EffectContext, EffectPipeline, EffectSinks},
    registry::{ZoneRegistry, ZoneView},
    resources::{TrackingSettings, WorldHandle, ZoneClock},
    snapshot::SnapshotStore,
    tracker::{TransitionKind, TransitionTracker, ZoneTransition},
    zones::DebugEventFlags,
};

/// Everything one zone tick reads or writes.
#[derive(SystemParam)]
pub struct ZoneTickParams<'w> {
    pub settings: Res<'w, TrackingSettings>,
    pub clock: Res<'w, ZoneClock>,
    pub registry: Res<'w, ZoneRegistry>,
    pub world: Res<'w, WorldHandle>,
    pub snapshots: Res<'w, SnapshotStore>,
    pub sinks: Res<'w, EffectSinks>,
    pub tracker: ResMut<'w, TransitionTracker>,
    pub pipeline: ResMut<'w, EffectPipeline>,
    pub metrics: ResMut<'w, ZoneMetrics>,
    pub entered: EventWriter<'w, ZoneEntered>,
    pub exited: EventWriter<'w, ZoneExited>,
}

impl ZoneTickParams<'_> {
    /// Runs the effect pipeline for each transition in order and publishes
    /// the matching events.
    pub(crate) fn apply_transitions(
        &mut self,
        view: &ZoneView,
        transitions: &[ZoneTransition],
        forced: bool,
    ) {
        let world = self.world.get();
        let cooldown = self.settings.cooldown_seconds;
        for transition in transitions {
            let entity = transition.entity;
            let zone = &transition.zone;
            let quiet = !forced && transition.within(cooldown);
            log_transition(view, transition, forced);

            let ctx = EffectContext {
                world,
                snapshots: &self.snapshots,
                sinks: &self.sinks,
                now: transition.at,
                quiet,
            };
            match transition.kind {
                TransitionKind::Exit => {
                    let report = self.pipeline.run_exit(&ctx, entity, zone);
                    self.metrics.record_run(transition.kind, &report, quiet);
                    self.exited.send(ZoneExited {
                        entity,
                        zone: zone.clone(),
                        at: transition.at,
                        forced,
                    });
                }
                TransitionKind::Enter => {
                    let Some(entry) = view.get(zone) else {
                        tracing::warn!(
                            target: "zones::tracker",
                            %entity,
                            %zone,
                            "transition.enter_unknown_zone"
                        );
                        continue;
                    };
                    let report = self.pipeline.run_enter(&ctx, entity, entry);
                    self.metrics.record_run(transition.kind, &report, quiet);
                    self.entered.send(ZoneEntered {
                        entity,
                        zone: zone.clone(),
                        at: transition.at,
                        forced,
                    });
                }
            }
        }
    }
}

fn log_transition(view: &ZoneView, transition: &ZoneTransition, forced: bool) {
    let traced = view.get(&transition.zone).is_some_and(|zone| {
        zone.definition()
            .debug
            .contains(DebugEventFlags::TRACE_TRANSITIONS)
    });
    let event = match transition.kind {
        TransitionKind::Enter => "transition.enter",
        TransitionKind::Exit => "transition.exit",
    };
    if traced {
        tracing::info!(
            target: "zones::tracker",
            entity = %transition.entity,
            zone = %transition.zone,
            at = transition.at,
            forced,
            "{event}"
        );
    } else {
        tracing::debug!(
            target: "zones::tracker",
            entity = %transition.entity,
            zone = %transition.zone,
            at = transition.at,
            forced,
            "{event}"
        );
    }
}

/// Advance the zone clock by one tick.
pub fn advance_clock(settings: Res<TrackingSettings>, mut clock: ResMut<ZoneClock>) {
    clock.advance(settings.tick_seconds);
}

/// Sample every tracked entity, run exit then enter effects for each
/// crossing, and release entities that left the world.
pub fn poll_zone_transitions(mut params: ZoneTickParams) {
    let now = params.clock.seconds;
    let view = params.registry.view();
    let handle = params.world.clone();
    let world: &dyn WorldAccess = handle.get();

    let outcome = params.tracker.poll(&view, world, now);
    params.metrics.sampled = outcome.sampled;

    for dropped in &outcome.dropped {
        let discarded = params
            .pipeline
            .release_entity(world, &params.snapshots, dropped.entity);
        params.metrics.dropped_entities += 1;
        tracing::info!(
            target: "zones::tracker",
            entity = %dropped.entity,
            last_zone = ?dropped.last_zone.as_ref().map(|zone| zone.as_str()),
            discarded,
            "entity.released"
        );
    }

    params.apply_transitions(&view, &outcome.transitions, false);
}
