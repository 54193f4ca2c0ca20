//! In-memory [`WorldAccess`] used by unit tests, integration tests and
//! benchmarks.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use parking_lot::Mutex;
use zone_runtime::{
    CapabilityId, EntityId, PhysicalState, Position, ProgressionCategory, ProgressionSnapshot,
    TransientHandle, WorldAccess, WorldError,
};

#[derive(Debug, Clone, Default)]
struct ScriptedEntity {
    physical: PhysicalState,
    progression: ProgressionSnapshot,
    loadouts: Vec<String>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    entities: BTreeMap<EntityId, ScriptedEntity>,
    notifications: Vec<(EntityId, String)>,
    transients: BTreeMap<TransientHandle, (EntityId, String)>,
    next_handle: u64,
    failing: HashSet<&'static str>,
    locked_categories: HashSet<ProgressionCategory>,
    teleports: usize,
}

/// Scriptable world: entities, positions and capabilities are set by the
/// test, and any capability can be made to fail by operation name.
#[derive(Debug, Default)]
pub struct ScriptedWorld {
    state: Mutex<ScriptedState>,
}

impl ScriptedWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&self, entity: EntityId, position: Position) {
        let mut state = self.state.lock();
        let record = state.entities.entry(entity).or_default();
        record.physical.position = position;
    }

    pub fn despawn(&self, entity: EntityId) -> bool {
        self.state.lock().entities.remove(&entity).is_some()
    }

    pub fn move_to(&self, entity: EntityId, position: Position) {
        if let Some(record) = self.state.lock().entities.get_mut(&entity) {
            record.physical.position = position;
        }
    }

    pub fn set_health(&self, entity: EntityId, health: f32) {
        if let Some(record) = self.state.lock().entities.get_mut(&entity) {
            record.physical.health = health;
        }
    }

    pub fn grant(&self, entity: EntityId, category: ProgressionCategory, ids: &[u32]) {
        if let Some(record) = self.state.lock().entities.get_mut(&entity) {
            record
                .progression
                .entry(category)
                .or_default()
                .extend(ids.iter().copied().map(CapabilityId));
        }
    }

    pub fn unlocked(&self, entity: EntityId, category: ProgressionCategory) -> BTreeSet<u32> {
        self.state
            .lock()
            .entities
            .get(&entity)
            .and_then(|record| record.progression.get(&category))
            .map(|ids| ids.iter().map(|id| id.0).collect())
            .unwrap_or_default()
    }

    pub fn physical(&self, entity: EntityId) -> Option<PhysicalState> {
        self.state
            .lock()
            .entities
            .get(&entity)
            .map(|record| record.physical)
    }

    pub fn loadouts(&self, entity: EntityId) -> Vec<String> {
        self.state
            .lock()
            .entities
            .get(&entity)
            .map(|record| record.loadouts.clone())
            .unwrap_or_default()
    }

    pub fn live_transients(&self) -> usize {
        self.state.lock().transients.len()
    }

    pub fn teleports(&self) -> usize {
        self.state.lock().teleports
    }

    pub fn notifications(&self) -> Vec<(EntityId, String)> {
        self.state.lock().notifications.clone()
    }

    pub fn take_notifications(&self) -> Vec<(EntityId, String)> {
        std::mem::take(&mut self.state.lock().notifications)
    }

    /// Makes every call to `operation` return [`WorldError::Rejected`].
    pub fn fail(&self, operation: &'static str) {
        self.state.lock().failing.insert(operation);
    }

    pub fn heal(&self, operation: &'static str) {
        self.state.lock().failing.remove(operation);
    }

    /// Rejects clearing or applying unlocks in `category` only.
    pub fn lock_category(&self, category: ProgressionCategory) {
        self.state.lock().locked_categories.insert(category);
    }
}

impl ScriptedState {
    fn check(&self, operation: &'static str, entity: EntityId) -> Result<(), WorldError> {
        if !self.entities.contains_key(&entity) {
            return Err(WorldError::EntityGone(entity));
        }
        if self.failing.contains(operation) {
            return Err(WorldError::Rejected {
                operation,
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn check_category(
        &self,
        operation: &'static str,
        entity: EntityId,
        category: ProgressionCategory,
    ) -> Result<(), WorldError> {
        self.check(operation, entity)?;
        if self.locked_categories.contains(&category) {
            return Err(WorldError::Rejected {
                operation,
                reason: format!("{} table locked", category.as_str()),
            });
        }
        Ok(())
    }

    fn entity_mut(&mut self, entity: EntityId) -> Result<&mut ScriptedEntity, WorldError> {
        self.entities
            .get_mut(&entity)
            .ok_or(WorldError::EntityGone(entity))
    }
}

impl WorldAccess for ScriptedWorld {
    fn tracked_entities(&self) -> Vec<EntityId> {
        self.state.lock().entities.keys().copied().collect()
    }

    fn position(&self, entity: EntityId) -> Option<Position> {
        self.state
            .lock()
            .entities
            .get(&entity)
            .map(|record| record.physical.position)
    }

    fn exists(&self, entity: EntityId) -> bool {
        self.state.lock().entities.contains_key(&entity)
    }

    fn capture_physical(&self, entity: EntityId) -> Result<PhysicalState, WorldError> {
        let state = self.state.lock();
        state.check("capture_physical", entity)?;
        Ok(state.entities[&entity].physical)
    }

    fn apply_physical(&self, entity: EntityId, physical: &PhysicalState) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        state.check("apply_physical", entity)?;
        state.entity_mut(entity)?.physical = *physical;
        Ok(())
    }

    fn capture_progression(
        &self,
        entity: EntityId,
        category: ProgressionCategory,
    ) -> Result<BTreeSet<CapabilityId>, WorldError> {
        let state = self.state.lock();
        state.check("capture_progression", entity)?;
        Ok(state.entities[&entity]
            .progression
            .get(&category)
            .cloned()
            .unwrap_or_default())
    }

    fn clear_progression(
        &self,
        entity: EntityId,
        category: ProgressionCategory,
    ) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        state.check_category("clear_progression", entity, category)?;
        state.entity_mut(entity)?.progression.remove(&category);
        Ok(())
    }

    fn apply_progression(
        &self,
        entity: EntityId,
        category: ProgressionCategory,
        capabilities: &BTreeSet<CapabilityId>,
    ) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        state.check_category("apply_progression", entity, category)?;
        state
            .entity_mut(entity)?
            .progression
            .entry(category)
            .or_default()
            .extend(capabilities.iter().copied());
        Ok(())
    }

    fn teleport(&self, entity: EntityId, target: Position) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        state.check("teleport", entity)?;
        state.entity_mut(entity)?.physical.position = target;
        state.teleports += 1;
        Ok(())
    }

    fn notify(&self, entity: EntityId, message: &str) {
        self.state
            .lock()
            .notifications
            .push((entity, message.to_string()));
    }

    fn equip_loadout(&self, entity: EntityId, loadout: &str) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        state.check("equip_loadout", entity)?;
        state.entity_mut(entity)?.loadouts.push(loadout.to_string());
        Ok(())
    }

    fn unequip_loadout(&self, entity: EntityId, loadout: &str) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        state.check("unequip_loadout", entity)?;
        state
            .entity_mut(entity)?
            .loadouts
            .retain(|equipped| equipped != loadout);
        Ok(())
    }

    fn spawn_transient(
        &self,
        entity: EntityId,
        prefab: &str,
        _at: Position,
    ) -> Result<TransientHandle, WorldError> {
        let mut state = self.state.lock();
        state.check("spawn_transient", entity)?;
        state.next_handle += 1;
        let handle = TransientHandle(state.next_handle);
        state.transients.insert(handle, (entity, prefab.to_string()));
        Ok(handle)
    }

    fn despawn_transient(&self, handle: TransientHandle) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        if state.failing.contains("despawn_transient") {
            return Err(WorldError::Rejected {
                operation: "despawn_transient",
                reason: "scripted failure".to_string(),
            });
        }
        state.transients.remove(&handle);
        Ok(())
    }
}
