use std::fmt;
use std::sync::Arc;

use bevy::prelude::*;
use serde::Deserialize;
use zone_runtime::WorldAccess;

/// Tracker-wide parameters.
#[derive(Resource, Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// Edge length of a territory cell in meters.
    pub block_size: f32,
    /// Transitions closer together than this are considered bouncing.
    pub cooldown_seconds: f64,
    /// World clock advance per update.
    pub tick_seconds: f64,
    /// Border asset rotation interval for zones that do not set their own.
    pub default_rotation_interval_seconds: f64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            block_size: 1.0,
            cooldown_seconds: 2.0,
            tick_seconds: 0.25,
            default_rotation_interval_seconds: 30.0,
        }
    }
}

/// Deterministic world clock advanced once per update.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq)]
pub struct ZoneClock {
    pub tick: u64,
    pub seconds: f64,
}

impl ZoneClock {
    pub fn advance(&mut self, dt: f64) {
        self.tick = self.tick.wrapping_add(1);
        self.seconds += dt.max(0.0);
    }
}

/// Host world capabilities shared with every system.
#[derive(Resource, Clone)]
pub struct WorldHandle(Arc<dyn WorldAccess>);

impl WorldHandle {
    pub fn new(world: Arc<dyn WorldAccess>) -> Self {
        Self(world)
    }

    pub fn get(&self) -> &dyn WorldAccess {
        self.0.as_ref()
    }
}

impl fmt::Debug for WorldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorldHandle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_ignores_negative_steps() {
        let mut clock = ZoneClock::default();
        clock.advance(0.5);
        clock.advance(-3.0);
        assert_eq!(clock.tick, 2);
        assert_eq!(clock.seconds, 0.5);
    }
}
