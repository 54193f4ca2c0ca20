use bevy::prelude::*;
use zone_runtime::{EntityId, ZoneId};

/// Sent after the enter effects for `zone` ran for `entity`.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct ZoneEntered {
    pub entity: EntityId,
    pub zone: ZoneId,
    pub at: f64,
    pub forced: bool,
}

/// Sent after the exit effects for `zone` ran for `entity`.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct ZoneExited {
    pub entity: EntityId,
    pub zone: ZoneId,
    pub at: f64,
    pub forced: bool,
}
