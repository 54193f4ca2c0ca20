//! Border marker geometry and asset rotation.
//!
//! Geometry is derived from the zone shape alone; rotation is a timer-driven
//! round-robin over the zone's border assets. Neither touches per-entity
//! state.

use std::collections::BTreeMap;
use std::f32::consts::TAU;

use bevy::prelude::*;
use zone_runtime::{Position, ZoneId};

use crate::{
    registry::{ZoneEntry, ZoneRegistry},
    resources::{TrackingSettings, ZoneClock},
    zones::{BorderMode, DebugEventFlags, ZoneShape},
};

/// Minimum marker count on a circle, however coarse the spacing.
pub const MIN_CIRCLE_POINTS: usize = 12;

/// Upper bound on markers per zone outline, however fine the spacing.
pub const MAX_BORDER_POINTS: usize = 4096;

/// Marker positions along the outline of `shape`, `spacing` meters apart.
pub fn shape_border_points(shape: &ZoneShape, spacing: f32, height: f32) -> Vec<Position> {
    let spacing = if spacing.is_finite() && spacing > 0.0 {
        spacing
    } else {
        1.0
    };
    match *shape {
        ZoneShape::Circle {
            center_x,
            center_z,
            radius,
        } => circle_points(center_x, center_z, radius, spacing, height),
        ZoneShape::Rectangle {
            min_x,
            max_x,
            min_z,
            max_z,
        } => rectangle_points(min_x, max_x, min_z, max_z, spacing, height),
    }
}

fn circle_points(cx: f32, cz: f32, radius: f32, spacing: f32, height: f32) -> Vec<Position> {
    let perimeter = TAU * radius;
    let count = (perimeter / spacing)
        .floor()
        .clamp(MIN_CIRCLE_POINTS as f32, MAX_BORDER_POINTS as f32) as usize;
    (0..count)
        .map(|i| {
            let angle = TAU * i as f32 / count as f32;
            Position::new(
                cx + radius * angle.cos(),
                height,
                cz + radius * angle.sin(),
            )
        })
        .collect()
}

/// Walks the four edges counter-clockwise from `(min_x, min_z)`. Each edge
/// contributes its start corner plus intermediate points; its end corner is
/// the next edge's start. Edges share [`MAX_BORDER_POINTS`] evenly.
fn rectangle_points(
    min_x: f32,
    max_x: f32,
    min_z: f32,
    max_z: f32,
    spacing: f32,
    height: f32,
) -> Vec<Position> {
    let corners = [
        (min_x, min_z),
        (max_x, min_z),
        (max_x, max_z),
        (min_x, max_z),
    ];
    let mut points = Vec::new();
    for (index, &(ax, az)) in corners.iter().enumerate() {
        let (bx, bz) = corners[(index + 1) % corners.len()];
        let length = ((bx - ax).powi(2) + (bz - az).powi(2)).sqrt();
        let segments = (length / spacing)
            .ceil()
            .clamp(1.0, (MAX_BORDER_POINTS / corners.len()) as f32) as usize;
        for step in 0..segments {
            let t = step as f32 / segments as f32;
            points.push(Position::new(
                ax + (bx - ax) * t,
                height,
                az + (bz - az) * t,
            ));
        }
    }
    points
}

/// Marker positions for a registered zone, honoring its border mode.
pub fn zone_border_points(zone: &ZoneEntry) -> Vec<Position> {
    let definition = zone.definition();
    match definition.border_mode {
        BorderMode::Shape => shape_border_points(
            &definition.shape,
            definition.border_spacing,
            definition.marker_height,
        ),
        BorderMode::Grid => zone
            .grid()
            .border_points(definition.border_spacing, definition.marker_height),
    }
}

/// Which border asset is shown and when it changes next.
#[derive(Debug, Clone, PartialEq)]
pub struct BorderRuntime {
    assets: Vec<String>,
    active: usize,
    interval: f64,
    next_rotation_at: f64,
}

impl BorderRuntime {
    pub fn new(assets: Vec<String>, interval: f64, now: f64) -> Self {
        let interval = interval.max(0.0);
        Self {
            assets,
            active: 0,
            interval,
            next_rotation_at: now + interval,
        }
    }

    pub fn active_asset(&self) -> Option<&str> {
        self.assets.get(self.active).map(String::as_str)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn next_rotation_at(&self) -> f64 {
        self.next_rotation_at
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Changes the rotation interval, keeping the active asset. The next
    /// rotation is rescheduled from `now`.
    pub fn reschedule(&mut self, interval: f64, now: f64) {
        self.interval = interval.max(0.0);
        self.next_rotation_at = now + self.interval;
    }

    /// Rotation only matters with two or more assets and a positive interval.
    pub fn is_due(&self, now: f64) -> bool {
        self.assets.len() > 1 && self.interval > 0.0 && now >= self.next_rotation_at
    }

    /// Advances to the next asset and schedules the following rotation.
    pub fn rotate(&mut self, now: f64) {
        if !self.assets.is_empty() {
            self.active = (self.active + 1) % self.assets.len();
        }
        self.next_rotation_at = now + self.interval;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneBorder {
    pub points: Vec<Position>,
    pub runtime: BorderRuntime,
}

/// Published border markers for every visible zone.
#[derive(Resource, Debug, Default)]
pub struct BorderDisplay {
    borders: BTreeMap<ZoneId, ZoneBorder>,
    revision: Option<u64>,
}

impl BorderDisplay {
    pub fn get(&self, zone: &ZoneId) -> Option<&ZoneBorder> {
        self.borders.get(zone)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ZoneId, &ZoneBorder)> {
        self.borders.iter()
    }

    pub fn len(&self) -> usize {
        self.borders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.borders.is_empty()
    }

    /// Rebuilds geometry from the registry. Zones keeping the same asset
    /// list keep their active asset; a changed interval is rescheduled.
    pub fn sync(&mut self, registry: &ZoneRegistry, default_interval: f64, now: f64) {
        let mut previous = std::mem::take(&mut self.borders);
        for zone in registry.view().iter() {
            let definition = zone.definition();
            if definition.debug.contains(DebugEventFlags::HIDE_BORDER) {
                continue;
            }
            let interval = definition
                .rotation_interval_seconds
                .unwrap_or(default_interval)
                .max(0.0);
            let runtime = match previous.remove(zone.id()) {
                Some(existing) if existing.runtime.assets() == definition.border_assets => {
                    let mut runtime = existing.runtime;
                    if runtime.interval() != interval {
                        runtime.reschedule(interval, now);
                    }
                    runtime
                }
                _ => BorderRuntime::new(definition.border_assets.clone(), interval, now),
            };
            let points = zone_border_points(zone);
            tracing::debug!(
                target: "zones::border",
                zone = %zone.id(),
                points = points.len(),
                "border.rebuilt"
            );
            self.borders
                .insert(zone.id().clone(), ZoneBorder { points, runtime });
        }
        self.revision = Some(registry.revision());
    }

    /// Rotates every zone whose timer elapsed. Returns how many rotated.
    pub fn rotate_due(&mut self, now: f64) -> usize {
        let mut rotated = 0;
        for (zone, border) in &mut self.borders {
            if border.runtime.is_due(now) {
                border.runtime.rotate(now);
                rotated += 1;
                tracing::debug!(
                    target: "zones::border",
                    %zone,
                    asset = border.runtime.active_asset().unwrap_or_default(),
                    "border.rotated"
                );
            }
        }
        rotated
    }

    pub fn is_current(&self, registry: &ZoneRegistry) -> bool {
        self.revision == Some(registry.revision())
    }
}

/// Keeps [`BorderDisplay`] in step with the registry and rotates assets.
pub fn refresh_borders(
    registry: Res<ZoneRegistry>,
    settings: Res<TrackingSettings>,
    clock: Res<ZoneClock>,
    mut display: ResMut<BorderDisplay>,
) {
    if !display.is_current(&registry) {
        display.sync(
            &registry,
            settings.default_rotation_interval_seconds,
            clock.seconds,
        );
    }
    display.rotate_due(clock.seconds);
}
