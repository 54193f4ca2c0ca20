//! Shared contracts for the zone tracking runtime.
//!
//! These types describe the world a host exposes to the zone core (positions,
//! vitals, progression unlocks) and the capability traits the core calls back
//! into. Nothing here depends on the Bevy runtime in `zone_core`.

mod sink;
mod state;
mod world;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use sink::{EffectSink, SinkError};
pub use state::{
    CapabilityId, PhysicalState, Position, ProgressionCategory, ProgressionSnapshot,
    TransientHandle,
};
pub use world::{WorldAccess, WorldError};

/// Identity of a mobile agent tracked by the host world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an administrator-defined zone. Immutable once live state
/// references it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
