//! Owned registry of zones and their territory grids.
//!
//! The registry is the only place zone configuration lives at run time.
//! Consumers take a [`ZoneView`] once per tick: the enabled flags and the
//! default marker are read when the view is built, so a decision made during
//! the tick never observes a half-applied change.

use std::collections::HashSet;
use std::sync::Arc;

use bevy::prelude::Resource;
use rayon::prelude::*;
use zone_runtime::{Position, ZoneId};

use crate::{
    error::ZoneError,
    territory::TerritoryGrid,
    zones::{ZoneDefinition, ZoneEffects},
};

/// A validated zone with its grid built at the registry's block size.
#[derive(Debug)]
pub struct ZoneEntry {
    definition: ZoneDefinition,
    grid: TerritoryGrid,
}

impl ZoneEntry {
    pub fn build(definition: ZoneDefinition, block_size: f32) -> Result<Self, ZoneError> {
        let grid = TerritoryGrid::build(&definition, block_size)?;
        Ok(Self { definition, grid })
    }

    pub fn id(&self) -> &ZoneId {
        &self.definition.id
    }

    pub fn definition(&self) -> &ZoneDefinition {
        &self.definition
    }

    pub fn effects(&self) -> &ZoneEffects {
        &self.definition.effects
    }

    pub fn grid(&self) -> &TerritoryGrid {
        &self.grid
    }

    #[inline]
    pub fn contains(&self, position: &Position) -> bool {
        self.grid.contains(position)
    }
}

#[derive(Debug, Clone)]
struct RegisteredZone {
    entry: Arc<ZoneEntry>,
    enabled: bool,
}

/// Outcome of a [`ZoneRegistry::reload`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReloadReport {
    pub accepted: usize,
    pub rejected: Vec<ZoneError>,
}

#[derive(Resource, Debug, Clone)]
pub struct ZoneRegistry {
    block_size: f32,
    sources: Vec<ZoneDefinition>,
    zones: Vec<RegisteredZone>,
    default_zone: Option<ZoneId>,
    rejected: Vec<ZoneError>,
    revision: u64,
}

impl ZoneRegistry {
    pub fn new(block_size: f32) -> Self {
        Self {
            block_size,
            sources: Vec::new(),
            zones: Vec::new(),
            default_zone: None,
            rejected: Vec::new(),
            revision: 0,
        }
    }

    pub fn from_definitions(block_size: f32, definitions: Vec<ZoneDefinition>) -> Self {
        let mut registry = Self::new(block_size);
        registry.reload(definitions);
        registry
    }

    /// Replaces every zone. Grids are rebuilt in parallel; malformed or
    /// duplicate definitions are excluded and reported.
    pub fn reload(&mut self, definitions: Vec<ZoneDefinition>) -> ReloadReport {
        let block_size = self.block_size;
        let built: Vec<Result<ZoneEntry, ZoneError>> = definitions
            .par_iter()
            .cloned()
            .map(|definition| ZoneEntry::build(definition, block_size))
            .collect();

        let mut seen = HashSet::new();
        let mut zones = Vec::with_capacity(built.len());
        let mut rejected = Vec::new();
        for result in built {
            match result {
                Ok(entry) if !seen.insert(entry.id().clone()) => {
                    rejected.push(ZoneError::InvalidGeometry {
                        zone: entry.id().clone(),
                        reason: "duplicate zone id".to_string(),
                    });
                }
                Ok(entry) => {
                    let enabled = entry.definition.enabled;
                    zones.push(RegisteredZone {
                        entry: Arc::new(entry),
                        enabled,
                    });
                }
                Err(err) => rejected.push(err),
            }
        }

        for err in &rejected {
            tracing::warn!(target: "zones::registry", error = %err, "zone.rejected");
        }

        let marked = zones
            .iter()
            .find(|zone| zone.entry.definition.is_default)
            .map(|zone| zone.entry.id().clone());
        let carried = self
            .default_zone
            .take()
            .filter(|id| zones.iter().any(|zone| zone.entry.id() == id));
        self.default_zone = marked.or(carried);

        self.sources = definitions;
        self.zones = zones;
        self.rejected = rejected.clone();
        self.revision = self.revision.wrapping_add(1);

        tracing::info!(
            target: "zones::registry",
            accepted = self.zones.len(),
            rejected = rejected.len(),
            default_zone = ?self.default_zone.as_ref().map(ZoneId::as_str),
            revision = self.revision,
            "registry.reloaded"
        );

        ReloadReport {
            accepted: self.zones.len(),
            rejected,
        }
    }

    /// Changes the cell size and rebuilds every grid.
    pub fn set_block_size(&mut self, block_size: f32) -> ReloadReport {
        self.block_size = block_size;
        let sources = std::mem::take(&mut self.sources);
        self.reload(sources)
    }

    pub fn block_size(&self) -> f32 {
        self.block_size
    }

    pub fn set_enabled(&mut self, id: &ZoneId, enabled: bool) -> bool {
        let Some(zone) = self.zones.iter_mut().find(|zone| zone.entry.id() == id) else {
            return false;
        };
        if zone.enabled != enabled {
            zone.enabled = enabled;
            if let Some(source) = self.sources.iter_mut().find(|def| &def.id == id) {
                source.enabled = enabled;
            }
            self.revision = self.revision.wrapping_add(1);
        }
        true
    }

    /// Reassigns the default marker. `None` clears it.
    pub fn set_default(&mut self, id: Option<ZoneId>) -> bool {
        if let Some(id) = &id {
            if self.get(id).is_none() {
                return false;
            }
        }
        if self.default_zone != id {
            self.default_zone = id;
            self.revision = self.revision.wrapping_add(1);
        }
        true
    }

    pub fn default_zone(&self) -> Option<&ZoneId> {
        self.default_zone.as_ref()
    }

    pub fn get(&self, id: &ZoneId) -> Option<&Arc<ZoneEntry>> {
        self.zones
            .iter()
            .find(|zone| zone.entry.id() == id)
            .map(|zone| &zone.entry)
    }

    pub fn is_enabled(&self, id: &ZoneId) -> bool {
        self.zones
            .iter()
            .any(|zone| zone.entry.id() == id && zone.enabled)
    }

    /// All registered zones in registration order, enabled or not.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ZoneEntry>> {
        self.zones.iter().map(|zone| &zone.entry)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn rejected(&self) -> &[ZoneError] {
        &self.rejected
    }

    /// Bumped on every change that affects membership or display.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Enabled zones in resolution order: default first, then registration
    /// order.
    pub fn view(&self) -> ZoneView {
        let mut ordered = Vec::with_capacity(self.zones.len());
        let default_entry = self
            .default_zone
            .as_ref()
            .and_then(|id| self.zones.iter().find(|zone| zone.entry.id() == id))
            .filter(|zone| zone.enabled);
        if let Some(zone) = default_entry {
            ordered.push(Arc::clone(&zone.entry));
        }
        for zone in &self.zones {
            if !zone.enabled || Some(zone.entry.id()) == self.default_zone.as_ref() {
                continue;
            }
            ordered.push(Arc::clone(&zone.entry));
        }
        ZoneView {
            ordered,
            default_zone: default_entry.map(|zone| zone.entry.id().clone()),
            revision: self.revision,
        }
    }
}

impl Default for ZoneRegistry {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Point-in-time view of the enabled zones.
#[derive(Debug, Clone, Default)]
pub struct ZoneView {
    ordered: Vec<Arc<ZoneEntry>>,
    default_zone: Option<ZoneId>,
    revision: u64,
}

impl ZoneView {
    /// First zone in priority order containing `position`.
    pub fn resolve(&self, position: &Position) -> Option<&Arc<ZoneEntry>> {
        self.ordered.iter().find(|zone| zone.contains(position))
    }

    pub fn get(&self, id: &ZoneId) -> Option<&Arc<ZoneEntry>> {
        self.ordered.iter().find(|zone| zone.id() == id)
    }

    pub fn default_entry(&self) -> Option<&Arc<ZoneEntry>> {
        self.default_zone.as_ref().and_then(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ZoneEntry>> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::ZoneShape;

    fn overlapping() -> Vec<ZoneDefinition> {
        vec![
            ZoneDefinition::new("west", ZoneShape::rectangle(0.0, 20.0, 0.0, 20.0)),
            ZoneDefinition::new("east", ZoneShape::rectangle(10.0, 30.0, 0.0, 20.0)).as_default(),
        ]
    }

    #[test]
    fn default_zone_wins_overlap() {
        let registry = ZoneRegistry::from_definitions(1.0, overlapping());
        let view = registry.view();
        let hit = view.resolve(&Position::new(15.0, 0.0, 5.0)).unwrap();
        assert_eq!(hit.id().as_str(), "east");
        let only_west = view.resolve(&Position::new(2.0, 0.0, 5.0)).unwrap();
        assert_eq!(only_west.id().as_str(), "west");
        assert!(view.resolve(&Position::new(50.0, 0.0, 5.0)).is_none());
    }

    #[test]
    fn registration_order_breaks_ties_without_default() {
        let mut registry = ZoneRegistry::from_definitions(1.0, overlapping());
        assert!(registry.set_default(None));
        let view = registry.view();
        let hit = view.resolve(&Position::new(15.0, 0.0, 5.0)).unwrap();
        assert_eq!(hit.id().as_str(), "west");
    }

    #[test]
    fn disabled_zones_are_skipped_and_views_are_stable() {
        let mut registry = ZoneRegistry::from_definitions(1.0, overlapping());
        let before = registry.view();
        let east = ZoneId::from("east");
        assert!(registry.set_enabled(&east, false));
        let after = registry.view();
        assert_eq!(before.len(), 2);
        assert_eq!(after.len(), 1);
        assert!(after.default_entry().is_none());
        assert_eq!(
            before.resolve(&Position::new(15.0, 0.0, 5.0)).unwrap().id(),
            &east
        );
        assert_eq!(
            after
                .resolve(&Position::new(15.0, 0.0, 5.0))
                .unwrap()
                .id()
                .as_str(),
            "west"
        );
        assert!(!registry.set_enabled(&ZoneId::from("missing"), false));
    }

    #[test]
    fn reload_rejects_invalid_and_duplicate_zones() {
        let mut registry = ZoneRegistry::new(1.0);
        let report = registry.reload(vec![
            ZoneDefinition::new("ok", ZoneShape::circle(0.0, 0.0, 10.0)),
            ZoneDefinition::new("bad", ZoneShape::circle(0.0, 0.0, -1.0)),
            ZoneDefinition::new("ok", ZoneShape::circle(50.0, 0.0, 10.0)),
        ]);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(registry.rejected().len(), 2);
        assert!(registry.get(&ZoneId::from("bad")).is_none());
    }

    #[test]
    fn reload_carries_default_when_still_registered() {
        let mut registry = ZoneRegistry::from_definitions(1.0, overlapping());
        assert!(registry.set_default(Some(ZoneId::from("west"))));
        let definitions = vec![
            ZoneDefinition::new("west", ZoneShape::rectangle(0.0, 20.0, 0.0, 20.0)),
            ZoneDefinition::new("north", ZoneShape::rectangle(0.0, 20.0, 30.0, 40.0)),
        ];
        registry.reload(definitions);
        assert_eq!(registry.default_zone().map(ZoneId::as_str), Some("west"));
        assert!(!registry.set_default(Some(ZoneId::from("east"))));
    }

    #[test]
    fn block_size_change_rebuilds_grids() {
        let mut registry = ZoneRegistry::from_definitions(1.0, overlapping());
        let before = registry.get(&ZoneId::from("west")).unwrap().grid().len();
        let revision = registry.revision();
        registry.set_block_size(2.0);
        let after = registry.get(&ZoneId::from("west")).unwrap().grid().len();
        assert_eq!(before, 400);
        assert_eq!(after, 100);
        assert!(registry.revision() > revision);
    }
}
