use thiserror::Error;
use zone_runtime::{EntityId, WorldError, ZoneId};

use crate::pipeline::EffectStep;
use crate::snapshot::SnapshotProfile;

/// Failures raised by the zone core. None of them is fatal to the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ZoneError {
    #[error("zone `{zone}` has invalid geometry: {reason}")]
    InvalidGeometry { zone: ZoneId, reason: String },
    #[error("entity {0} is no longer present")]
    EntityGone(EntityId),
    #[error("{profile} snapshot already exists for entity {entity}")]
    SnapshotAlreadyExists {
        entity: EntityId,
        profile: SnapshotProfile,
    },
    #[error("no {profile} snapshot to restore for entity {entity}")]
    SnapshotNotFound {
        entity: EntityId,
        profile: SnapshotProfile,
    },
    #[error("effect step `{step}` failed for entity {entity}: {reason}")]
    EffectStepFailed {
        step: EffectStep,
        entity: EntityId,
        reason: String,
    },
}

impl ZoneError {
    pub(crate) fn from_world(step: EffectStep, entity: EntityId, err: WorldError) -> Self {
        match err {
            WorldError::EntityGone(gone) => ZoneError::EntityGone(gone),
            other => ZoneError::EffectStepFailed {
                step,
                entity,
                reason: other.to_string(),
            },
        }
    }

    pub fn is_entity_gone(&self) -> bool {
        matches!(self, ZoneError::EntityGone(_))
    }
}
