use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// World-space position. `y` is the vertical axis; zones are evaluated on the
/// `x`/`z` plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Distance on the horizontal plane, ignoring height.
    pub fn planar_distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Transform and vitals captured by the physical snapshot profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalState {
    pub position: Position,
    /// Orientation quaternion in `x, y, z, w` order.
    pub orientation: [f32; 4],
    pub health: f32,
    /// Secondary vitality resource (stamina, blood, mana; host defined).
    pub vitality: f32,
}

impl Default for PhysicalState {
    fn default() -> Self {
        Self {
            position: Position::default(),
            orientation: [0.0, 0.0, 0.0, 1.0],
            health: 100.0,
            vitality: 100.0,
        }
    }
}

/// Independent categories of unlocked capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionCategory {
    BossUnlocks,
    TechUnlocks,
    BlueprintUnlocks,
    ShapeshiftUnlocks,
    Achievements,
}

impl ProgressionCategory {
    pub const ALL: [ProgressionCategory; 5] = [
        ProgressionCategory::BossUnlocks,
        ProgressionCategory::TechUnlocks,
        ProgressionCategory::BlueprintUnlocks,
        ProgressionCategory::ShapeshiftUnlocks,
        ProgressionCategory::Achievements,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProgressionCategory::BossUnlocks => "boss_unlocks",
            ProgressionCategory::TechUnlocks => "tech_unlocks",
            ProgressionCategory::BlueprintUnlocks => "blueprint_unlocks",
            ProgressionCategory::ShapeshiftUnlocks => "shapeshift_unlocks",
            ProgressionCategory::Achievements => "achievements",
        }
    }
}

impl fmt::Display for ProgressionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a single unlockable capability within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(pub u32);

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unlocked capabilities per category.
pub type ProgressionSnapshot = BTreeMap<ProgressionCategory, BTreeSet<CapabilityId>>;

/// Handle for an object the host spawned on behalf of a zone effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransientHandle(pub u64);
