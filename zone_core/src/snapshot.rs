//! Per-entity backup of state that zone effects mutate.
//!
//! At most one snapshot lives per `(entity, profile)`. A second backup for a
//! live key is a no-op, and restore removes the snapshot before applying it,
//! so a duplicate restore finds nothing. Keys are spread over locked shards;
//! locks are held only for map updates, never while calling into the world,
//! so a slow capture for one key does not hold up any other key.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;

use bevy::prelude::Resource;
use parking_lot::Mutex;
use zone_runtime::{EntityId, PhysicalState, ProgressionSnapshot};

use crate::error::ZoneError;

const DEFAULT_SHARDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SnapshotProfile {
    /// Position, orientation, health and vitality.
    Physical,
    /// Unlocked capabilities per progression category.
    Progression,
}

impl SnapshotProfile {
    pub const ALL: [SnapshotProfile; 2] = [SnapshotProfile::Physical, SnapshotProfile::Progression];

    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotProfile::Physical => "physical",
            SnapshotProfile::Progression => "progression",
        }
    }
}

impl fmt::Display for SnapshotProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotData {
    Physical(PhysicalState),
    Progression(ProgressionSnapshot),
}

impl SnapshotData {
    pub fn profile(&self) -> SnapshotProfile {
        match self {
            SnapshotData::Physical(_) => SnapshotProfile::Physical,
            SnapshotData::Progression(_) => SnapshotProfile::Progression,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub entity: EntityId,
    /// World clock seconds at capture time.
    pub created_at: f64,
    pub data: SnapshotData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    NotFound,
}

type SnapshotKey = (EntityId, SnapshotProfile);
type Shard = Mutex<HashMap<SnapshotKey, Slot>>;

/// A key is reserved while its capture runs outside the shard lock.
#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Live(Snapshot),
}

impl Slot {
    fn live(&self) -> Option<&Snapshot> {
        match self {
            Slot::Live(snapshot) => Some(snapshot),
            Slot::Pending => None,
        }
    }
}

/// Thread-safe snapshot table. Clones share the same storage.
#[derive(Resource, Clone)]
pub struct SnapshotStore {
    shards: Arc<[Shard]>,
    placement: RandomState,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("shards", &self.shards.len())
            .field("live", &self.len())
            .finish()
    }
}

impl SnapshotStore {
    pub fn with_shards(count: usize) -> Self {
        let shards: Vec<Shard> = (0..count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            shards: shards.into(),
            placement: RandomState::new(),
        }
    }

    #[inline]
    fn shard(&self, key: &SnapshotKey) -> &Shard {
        let index = self.placement.hash_one(key) % self.shards.len() as u64;
        &self.shards[index as usize]
    }

    /// Stores the result of `capture` unless a snapshot already exists, or
    /// is being captured, for the key. Returns `Ok(false)` for the no-op
    /// case.
    ///
    /// The key is reserved under the shard lock; `capture` itself runs
    /// without holding it.
    pub fn backup<F>(
        &self,
        entity: EntityId,
        profile: SnapshotProfile,
        created_at: f64,
        capture: F,
    ) -> Result<bool, ZoneError>
    where
        F: FnOnce() -> Result<SnapshotData, ZoneError>,
    {
        let key = (entity, profile);
        {
            let mut shard = self.shard(&key).lock();
            if shard.contains_key(&key) {
                tracing::debug!(
                    target: "zones::snapshots",
                    %entity,
                    error = %ZoneError::SnapshotAlreadyExists { entity, profile },
                    "snapshot.backup_skipped"
                );
                return Ok(false);
            }
            shard.insert(key, Slot::Pending);
        }

        let captured = capture();
        let mut shard = self.shard(&key).lock();
        let reserved = matches!(shard.get(&key), Some(Slot::Pending));
        let data = match captured {
            Ok(data) => data,
            Err(err) => {
                if reserved {
                    shard.remove(&key);
                }
                return Err(err);
            }
        };
        debug_assert_eq!(data.profile(), profile, "captured data for wrong profile");
        if !reserved {
            // Discarded while capturing: the entity was released.
            tracing::debug!(
                target: "zones::snapshots",
                %entity,
                profile = profile.as_str(),
                "snapshot.capture_dropped"
            );
            return Ok(false);
        }
        shard.insert(
            key,
            Slot::Live(Snapshot {
                entity,
                created_at,
                data,
            }),
        );
        tracing::debug!(
            target: "zones::snapshots",
            %entity,
            profile = profile.as_str(),
            "snapshot.stored"
        );
        Ok(true)
    }

    /// Removes the snapshot for the key and hands it to `apply`.
    ///
    /// The snapshot is consumed even when `apply` fails; a vanished entity
    /// must not keep its backup alive. A key still being captured counts as
    /// not found.
    pub fn restore<F>(
        &self,
        entity: EntityId,
        profile: SnapshotProfile,
        apply: F,
    ) -> Result<RestoreOutcome, ZoneError>
    where
        F: FnOnce(Snapshot) -> Result<(), ZoneError>,
    {
        let key = (entity, profile);
        let taken = {
            let mut shard = self.shard(&key).lock();
            match shard.get(&key) {
                Some(Slot::Live(_)) => shard.remove(&key),
                _ => None,
            }
        };
        let Some(Slot::Live(snapshot)) = taken else {
            return Ok(RestoreOutcome::NotFound);
        };
        apply(snapshot)?;
        tracing::debug!(
            target: "zones::snapshots",
            %entity,
            profile = profile.as_str(),
            "snapshot.restored"
        );
        Ok(RestoreOutcome::Restored)
    }

    /// Drops every profile's snapshot for `entity` without applying it,
    /// including captures still in flight.
    pub fn discard_all_for(&self, entity: EntityId) -> usize {
        let mut discarded = 0;
        for profile in SnapshotProfile::ALL {
            let key = (entity, profile);
            if let Some(Slot::Live(_)) = self.shard(&key).lock().remove(&key) {
                discarded += 1;
            }
        }
        if discarded > 0 {
            tracing::info!(
                target: "zones::snapshots",
                %entity,
                discarded,
                "snapshot.discarded"
            );
        }
        discarded
    }

    pub fn contains(&self, entity: EntityId, profile: SnapshotProfile) -> bool {
        self.get(entity, profile).is_some()
    }

    pub fn get(&self, entity: EntityId, profile: SnapshotProfile) -> Option<Snapshot> {
        let key = (entity, profile);
        self.shard(&key).lock().get(&key).and_then(Slot::live).cloned()
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().values().filter(|slot| slot.live().is_some()).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything. Returns how many snapshots were discarded.
    pub fn clear(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let mut guard = shard.lock();
                let count = guard.values().filter(|slot| slot.live().is_some()).count();
                guard.clear();
                count
            })
            .sum()
    }
}
