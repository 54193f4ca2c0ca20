use std::collections::BTreeSet;

use thiserror::Error;

use crate::{CapabilityId, EntityId, PhysicalState, Position, ProgressionCategory, TransientHandle};

/// Failure reported by a host world capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("entity {0} no longer exists")]
    EntityGone(EntityId),
    #[error("host does not support `{0}`")]
    Unsupported(&'static str),
    #[error("host rejected `{operation}`: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
}

/// Capabilities the host world exposes to the zone core.
///
/// Implementations must be cheap and non-blocking: they are called from the
/// world tick. Writes against an entity that vanished report
/// [`WorldError::EntityGone`] instead of panicking.
pub trait WorldAccess: Send + Sync {
    /// Entities the tracker should sample this tick.
    fn tracked_entities(&self) -> Vec<EntityId>;

    fn position(&self, entity: EntityId) -> Option<Position>;

    fn exists(&self, entity: EntityId) -> bool;

    fn capture_physical(&self, entity: EntityId) -> Result<PhysicalState, WorldError>;

    fn apply_physical(&self, entity: EntityId, state: &PhysicalState) -> Result<(), WorldError>;

    fn capture_progression(
        &self,
        entity: EntityId,
        category: ProgressionCategory,
    ) -> Result<BTreeSet<CapabilityId>, WorldError>;

    /// Removes every capability in `category`.
    fn clear_progression(
        &self,
        entity: EntityId,
        category: ProgressionCategory,
    ) -> Result<(), WorldError>;

    /// Grants `unlocks` in `category`; existing unlocks are kept.
    fn apply_progression(
        &self,
        entity: EntityId,
        category: ProgressionCategory,
        unlocks: &BTreeSet<CapabilityId>,
    ) -> Result<(), WorldError>;

    fn teleport(&self, entity: EntityId, to: Position) -> Result<(), WorldError>;

    fn equip_loadout(&self, _entity: EntityId, _loadout: &str) -> Result<(), WorldError> {
        Err(WorldError::Unsupported("equip_loadout"))
    }

    fn unequip_loadout(&self, _entity: EntityId, _loadout: &str) -> Result<(), WorldError> {
        Err(WorldError::Unsupported("unequip_loadout"))
    }

    fn spawn_transient(
        &self,
        _entity: EntityId,
        _prefab: &str,
        _at: Position,
    ) -> Result<TransientHandle, WorldError> {
        Err(WorldError::Unsupported("spawn_transient"))
    }

    fn despawn_transient(&self, _handle: TransientHandle) -> Result<(), WorldError> {
        Err(WorldError::Unsupported("despawn_transient"))
    }

    /// Fire-and-forget message to the entity's controller.
    fn notify(&self, entity: EntityId, message: &str);
}
