//! Zone definitions as supplied by the configuration collaborator.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use zone_runtime::{CapabilityId, Position, ProgressionCategory, ZoneId};

use crate::error::ZoneError;

bitflags::bitflags! {
    /// Per-zone diagnostics toggles.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DebugEventFlags: u8 {
        /// Log enter/exit transitions for this zone at `info`.
        const TRACE_TRANSITIONS = 1 << 0;
        /// Log every effect step for this zone at `info`.
        const TRACE_EFFECTS = 1 << 1;
        /// Do not publish border markers for this zone.
        const HIDE_BORDER = 1 << 2;
    }
}

impl Default for DebugEventFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Planar footprint of a zone on the `x`/`z` plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneShape {
    Circle {
        center_x: f32,
        center_z: f32,
        radius: f32,
    },
    Rectangle {
        min_x: f32,
        max_x: f32,
        min_z: f32,
        max_z: f32,
    },
}

impl ZoneShape {
    pub fn circle(center_x: f32, center_z: f32, radius: f32) -> Self {
        ZoneShape::Circle {
            center_x,
            center_z,
            radius,
        }
    }

    pub fn rectangle(min_x: f32, max_x: f32, min_z: f32, max_z: f32) -> Self {
        ZoneShape::Rectangle {
            min_x,
            max_x,
            min_z,
            max_z,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ZoneShape::Circle { .. } => "circle",
            ZoneShape::Rectangle { .. } => "rectangle",
        }
    }

    /// Axis-aligned bounds as `(min_x, max_x, min_z, max_z)`.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        match *self {
            ZoneShape::Circle {
                center_x,
                center_z,
                radius,
            } => (
                center_x - radius,
                center_x + radius,
                center_z - radius,
                center_z + radius,
            ),
            ZoneShape::Rectangle {
                min_x,
                max_x,
                min_z,
                max_z,
            } => (min_x, max_x, min_z, max_z),
        }
    }

    /// Exact (unquantized) containment against the shape itself.
    pub fn contains_point(&self, x: f32, z: f32) -> bool {
        match *self {
            ZoneShape::Circle {
                center_x,
                center_z,
                radius,
            } => {
                let dx = x - center_x;
                let dz = z - center_z;
                dx * dx + dz * dz <= radius * radius
            }
            ZoneShape::Rectangle {
                min_x,
                max_x,
                min_z,
                max_z,
            } => x >= min_x && x <= max_x && z >= min_z && z <= max_z,
        }
    }

    fn validate(&self) -> Result<(), String> {
        match *self {
            ZoneShape::Circle {
                center_x,
                center_z,
                radius,
            } => {
                if !center_x.is_finite() || !center_z.is_finite() {
                    return Err("circle center must be finite".to_string());
                }
                if !radius.is_finite() || radius <= 0.0 {
                    return Err(format!("radius {radius} must be positive and finite"));
                }
            }
            ZoneShape::Rectangle {
                min_x,
                max_x,
                min_z,
                max_z,
            } => {
                if ![min_x, max_x, min_z, max_z].iter().all(|v| v.is_finite()) {
                    return Err("rectangle bounds must be finite".to_string());
                }
                if max_x <= min_x || max_z <= min_z {
                    return Err(format!(
                        "rectangle extent must be positive (x {min_x}..{max_x}, z {min_z}..{max_z})"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Where border markers are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderMode {
    /// Analytic outline of the circle or rectangle.
    #[default]
    Shape,
    /// Border cells of the discretized territory grid.
    Grid,
}

/// Side effects applied while an entity is inside the zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneEffects {
    pub enter_message: Option<String>,
    pub exit_message: Option<String>,
    pub loadout: Option<String>,
    pub unlocks: BTreeMap<ProgressionCategory, BTreeSet<CapabilityId>>,
    /// Prefabs spawned next to the entity on enter and removed on exit.
    pub transients: Vec<String>,
    pub teleport_in: Option<Position>,
    /// Return the entity on exit to where `teleport_in` picked it up. Only
    /// applies when that origin lay outside the zone, so an entity that
    /// walked in is never moved back.
    pub teleport_back: bool,
    pub snapshot_physical: bool,
    pub snapshot_progression: bool,
}

impl Default for ZoneEffects {
    fn default() -> Self {
        Self {
            enter_message: None,
            exit_message: None,
            loadout: None,
            unlocks: BTreeMap::new(),
            transients: Vec::new(),
            teleport_in: None,
            teleport_back: true,
            snapshot_physical: false,
            snapshot_progression: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub id: ZoneId,
    pub shape: ZoneShape,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub is_default: bool,
    /// Meters between border markers.
    #[serde(default = "default_border_spacing")]
    pub border_spacing: f32,
    /// Height at which border markers are placed.
    #[serde(default)]
    pub marker_height: f32,
    #[serde(default)]
    pub border_mode: BorderMode,
    #[serde(default)]
    pub border_assets: Vec<String>,
    /// Overrides the tracker-wide rotation interval for this zone.
    #[serde(default)]
    pub rotation_interval_seconds: Option<f64>,
    #[serde(default)]
    pub effects: ZoneEffects,
    #[serde(default)]
    pub debug: DebugEventFlags,
}

fn default_enabled() -> bool {
    true
}

fn default_border_spacing() -> f32 {
    4.0
}

impl ZoneDefinition {
    pub fn new(id: impl Into<String>, shape: ZoneShape) -> Self {
        Self {
            id: ZoneId::new(id),
            shape,
            enabled: true,
            is_default: false,
            border_spacing: default_border_spacing(),
            marker_height: 0.0,
            border_mode: BorderMode::default(),
            border_assets: Vec::new(),
            rotation_interval_seconds: None,
            effects: ZoneEffects::default(),
            debug: DebugEventFlags::default(),
        }
    }

    pub fn with_effects(mut self, effects: ZoneEffects) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_border_spacing(mut self, spacing: f32) -> Self {
        self.border_spacing = spacing;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn validate(&self) -> Result<(), ZoneError> {
        let invalid = |reason: String| ZoneError::InvalidGeometry {
            zone: self.id.clone(),
            reason,
        };
        if self.id.as_str().is_empty() {
            return Err(invalid("zone id must not be empty".to_string()));
        }
        self.shape.validate().map_err(invalid)?;
        if !self.border_spacing.is_finite() || self.border_spacing <= 0.0 {
            return Err(invalid(format!(
                "border spacing {} must be positive and finite",
                self.border_spacing
            )));
        }
        Ok(())
    }
}
