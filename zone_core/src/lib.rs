//! Zone tracking core.
//!
//! Tracks which entities occupy administrator-defined zones, detects
//! enter/exit transitions once per polling tick, and runs reversible zone
//! effects around them. [`build_headless_app`] wires everything into a Bevy
//! [`App`]; each [`run_tick`] samples the host world once.

pub mod admin;
pub mod border;
mod error;
pub mod events;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod registry;
mod resources;
pub mod snapshot;
mod systems;
pub mod territory;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod tracker;
pub mod zone_config;
pub mod zones;

use std::sync::Arc;

use bevy::prelude::*;
use zone_runtime::WorldAccess;

pub use border::{BorderDisplay, BorderRuntime, ZoneBorder};
pub use error::ZoneError;
pub use events::{ZoneEntered, ZoneExited};
pub use metrics::ZoneMetrics;
pub use pipeline::{EffectPipeline, EffectSinks, EffectStep, PipelineReport};
pub use registry::{ReloadReport, ZoneEntry, ZoneRegistry, ZoneView};
pub use resources::{TrackingSettings, WorldHandle, ZoneClock};
pub use snapshot::{RestoreOutcome, SnapshotProfile, SnapshotStore};
pub use systems::ZoneTickParams;
pub use territory::TerritoryGrid;
pub use tracker::{TransitionKind, TransitionTracker, ZoneTransition};
pub use zone_config::{load_zone_config_from_env, ZoneConfigMetadata, ZoneTrackingConfig};
pub use zones::{BorderMode, DebugEventFlags, ZoneDefinition, ZoneEffects, ZoneShape};

/// Construct a Bevy [`App`] driven by the configuration named in
/// `ZONE_CONFIG_PATH`, or the builtin one.
pub fn build_headless_app(world: Arc<dyn WorldAccess>) -> App {
    let (config, metadata) = load_zone_config_from_env();
    let mut app = build_app_with_config(world, &config);
    app.insert_resource(metadata);
    app
}

/// Construct a Bevy [`App`] for an explicit configuration.
pub fn build_app_with_config(world: Arc<dyn WorldAccess>, config: &ZoneTrackingConfig) -> App {
    let mut app = App::new();

    let settings = config.tracking.clone();
    let registry = ZoneRegistry::from_definitions(settings.block_size, config.zones.clone());

    app.insert_resource(settings)
        .insert_resource(registry)
        .insert_resource(WorldHandle::new(world))
        .insert_resource(ZoneClock::default())
        .insert_resource(SnapshotStore::default())
        .insert_resource(ZoneConfigMetadata::default())
        .init_resource::<EffectSinks>()
        .init_resource::<TransitionTracker>()
        .init_resource::<EffectPipeline>()
        .init_resource::<BorderDisplay>()
        .init_resource::<ZoneMetrics>()
        .add_event::<ZoneEntered>()
        .add_event::<ZoneExited>()
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (
                systems::advance_clock,
                systems::poll_zone_transitions,
                border::refresh_borders,
                metrics::collect_metrics,
            )
                .chain(),
        );

    app
}

/// Execute a single zone tick.
///
/// Each call runs the chained systems configured in [`build_app_with_config`]
/// (clock → transitions and effects → borders → metrics).
pub fn run_tick(app: &mut App) {
    app.update();
}
