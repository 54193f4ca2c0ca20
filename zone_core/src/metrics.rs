use std::collections::BTreeMap;

use bevy::prelude::*;
use zone_runtime::ZoneId;

use crate::{
    pipeline::{EffectPipeline, PipelineReport},
    resources::ZoneClock,
    snapshot::SnapshotStore,
    tracker::{TransitionKind, TransitionTracker},
};

#[derive(Resource, Default, Debug, Clone)]
pub struct ZoneMetrics {
    pub tick: u64,
    pub sampled: usize,
    pub transitions: u64,
    pub enters: u64,
    pub exits: u64,
    pub quiet_transitions: u64,
    pub effect_failures: u64,
    pub aborted_runs: u64,
    pub dropped_entities: u64,
    pub live_snapshots: usize,
    pub live_transients: usize,
    pub occupancy: BTreeMap<ZoneId, usize>,
}

impl ZoneMetrics {
    pub fn record_run(&mut self, kind: TransitionKind, report: &PipelineReport, quiet: bool) {
        self.transitions += 1;
        match kind {
            TransitionKind::Enter => self.enters += 1,
            TransitionKind::Exit => self.exits += 1,
        }
        if quiet {
            self.quiet_transitions += 1;
        }
        self.effect_failures += report.failed.len() as u64;
        if report.aborted.is_some() {
            self.aborted_runs += 1;
        }
    }
}

pub fn collect_metrics(
    clock: Res<ZoneClock>,
    tracker: Res<TransitionTracker>,
    pipeline: Res<EffectPipeline>,
    snapshots: Res<SnapshotStore>,
    mut metrics: ResMut<ZoneMetrics>,
) {
    metrics.tick = clock.tick;
    metrics.live_snapshots = snapshots.len();
    metrics.live_transients = pipeline.live_transients();
    metrics.occupancy = tracker.occupancy();
}
