use thiserror::Error;

use crate::{EntityId, ZoneId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Collaborator notified after a zone transition's effects ran
/// (kit grants, announcements, score tracking).
///
/// Sinks are registered explicitly with the core; a failing sink is logged
/// and does not stop later sinks.
pub trait EffectSink: Send + Sync {
    fn on_enter(&self, entity: EntityId, zone: &ZoneId) -> Result<(), SinkError>;

    fn on_exit(&self, entity: EntityId, zone: &ZoneId) -> Result<(), SinkError>;
}
