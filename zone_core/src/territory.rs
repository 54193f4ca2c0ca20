//! Discretized zone membership.
//!
//! A [`TerritoryGrid`] maps world positions onto integer cells
//! (`floor(axis / block_size)`) and keeps the set of cells a zone covers.
//! Border and corner extraction are local 4-neighbour tests, so concave or
//! irregular territories cost the same as convex ones.

use std::collections::HashSet;

use bevy::math::IVec2;
use zone_runtime::{Position, ZoneId};

use crate::{error::ZoneError, zones::ZoneDefinition};

/// Upper bound on the cells a single zone may expand to.
pub const MAX_TERRITORY_CELLS: u64 = 4_000_000;

const NEIGHBORS: [IVec2; 4] = [
    IVec2::new(-1, 0),
    IVec2::new(1, 0),
    IVec2::new(0, -1),
    IVec2::new(0, 1),
];

#[inline]
fn cell_coord(value: f32, block_size: f32) -> i32 {
    (value / block_size).floor() as i32
}

/// Cell containing the world-space `(x, z)` coordinate.
#[inline]
pub fn cell_of(x: f32, z: f32, block_size: f32) -> IVec2 {
    IVec2::new(cell_coord(x, block_size), cell_coord(z, block_size))
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerritoryGrid {
    block_size: f32,
    cells: HashSet<IVec2>,
}

impl TerritoryGrid {
    /// Enumerates every cell whose center lies inside the zone's shape.
    pub fn build(zone: &ZoneDefinition, block_size: f32) -> Result<Self, ZoneError> {
        zone.validate()?;
        let invalid = |reason: String| ZoneError::InvalidGeometry {
            zone: zone.id.clone(),
            reason,
        };
        if !block_size.is_finite() || block_size <= 0.0 {
            return Err(invalid(format!(
                "block size {block_size} must be positive and finite"
            )));
        }

        let (min_x, max_x, min_z, max_z) = zone.shape.bounds();
        let x0 = cell_coord(min_x, block_size);
        let x1 = cell_coord(max_x, block_size);
        let z0 = cell_coord(min_z, block_size);
        let z1 = cell_coord(max_z, block_size);
        let width = (i64::from(x1) - i64::from(x0) + 1) as u64;
        let depth = (i64::from(z1) - i64::from(z0) + 1) as u64;
        let span = width.saturating_mul(depth);
        if span > MAX_TERRITORY_CELLS {
            return Err(invalid(format!(
                "zone spans {span} cells at block size {block_size}, limit is {MAX_TERRITORY_CELLS}"
            )));
        }

        let mut cells = HashSet::with_capacity(span as usize);
        for cz in z0..=z1 {
            for cx in x0..=x1 {
                let cell = IVec2::new(cx, cz);
                let (wx, wz) = center_of(cell, block_size);
                if zone.shape.contains_point(wx, wz) {
                    cells.insert(cell);
                }
            }
        }

        if cells.is_empty() {
            return Err(invalid(format!(
                "zone covers no cells at block size {block_size}"
            )));
        }

        Ok(Self { block_size, cells })
    }

    /// Builds a grid from an explicit cell set (irregular territories).
    pub fn from_cells(
        zone: &ZoneId,
        block_size: f32,
        cells: impl IntoIterator<Item = IVec2>,
    ) -> Result<Self, ZoneError> {
        if !block_size.is_finite() || block_size <= 0.0 {
            return Err(ZoneError::InvalidGeometry {
                zone: zone.clone(),
                reason: format!("block size {block_size} must be positive and finite"),
            });
        }
        let cells: HashSet<IVec2> = cells.into_iter().collect();
        if cells.is_empty() {
            return Err(ZoneError::InvalidGeometry {
                zone: zone.clone(),
                reason: "territory has no cells".to_string(),
            });
        }
        Ok(Self { block_size, cells })
    }

    pub fn block_size(&self) -> f32 {
        self.block_size
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &HashSet<IVec2> {
        &self.cells
    }

    #[inline]
    pub fn contains_cell(&self, cell: IVec2) -> bool {
        self.cells.contains(&cell)
    }

    #[inline]
    pub fn contains(&self, position: &Position) -> bool {
        self.contains_cell(cell_of(position.x, position.z, self.block_size))
    }

    fn present_neighbors(&self, cell: IVec2) -> usize {
        NEIGHBORS
            .iter()
            .filter(|offset| self.cells.contains(&(cell + **offset)))
            .count()
    }

    /// Member cells with at least one missing 4-neighbour.
    pub fn border_cells(&self) -> HashSet<IVec2> {
        self.cells
            .iter()
            .copied()
            .filter(|cell| self.present_neighbors(*cell) < NEIGHBORS.len())
            .collect()
    }

    /// Border cells with exactly two of four neighbours present.
    ///
    /// Cheap approximation: narrow peninsulas and one-cell notches also
    /// qualify. Good enough for marker decoration.
    pub fn corner_cells(&self) -> HashSet<IVec2> {
        self.cells
            .iter()
            .copied()
            .filter(|cell| self.present_neighbors(*cell) == 2)
            .collect()
    }

    /// World-space centers of border cells, thinned to roughly one per
    /// `spacing_meters`.
    pub fn border_points(&self, spacing_meters: f32, height: f32) -> Vec<Position> {
        let stride = (spacing_meters / self.block_size).round().max(1.0) as usize;
        let mut border: Vec<IVec2> = self.border_cells().into_iter().collect();

        // Walk order around the centroid keeps the stride spread along the
        // outline instead of bunching up per row.
        let count = border.len().max(1) as f32;
        let (sum_x, sum_z) = border.iter().fold((0.0f32, 0.0f32), |acc, cell| {
            (acc.0 + cell.x as f32, acc.1 + cell.y as f32)
        });
        let (cx, cz) = (sum_x / count, sum_z / count);
        border.sort_by(|a, b| {
            let angle_a = (a.y as f32 - cz).atan2(a.x as f32 - cx);
            let angle_b = (b.y as f32 - cz).atan2(b.x as f32 - cx);
            angle_a
                .total_cmp(&angle_b)
                .then_with(|| (a.x, a.y).cmp(&(b.x, b.y)))
        });

        border
            .into_iter()
            .step_by(stride)
            .map(|cell| {
                let (x, z) = center_of(cell, self.block_size);
                Position::new(x, height, z)
            })
            .collect()
    }

    pub fn cell_center(&self, cell: IVec2) -> (f32, f32) {
        center_of(cell, self.block_size)
    }
}

#[inline]
fn center_of(cell: IVec2, block_size: f32) -> (f32, f32) {
    (
        (cell.x as f32 + 0.5) * block_size,
        (cell.y as f32 + 0.5) * block_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::ZoneShape;

    fn square(size: f32) -> ZoneDefinition {
        ZoneDefinition::new("square", ZoneShape::rectangle(0.0, size, 0.0, size))
    }

    #[test]
    fn rectangle_cells_follow_cell_centers() {
        let grid = TerritoryGrid::build(&square(10.0), 1.0).unwrap();
        assert_eq!(grid.len(), 100);
        assert!(grid.contains(&Position::new(0.0, 0.0, 0.0)));
        assert!(grid.contains(&Position::new(9.99, 3.0, 9.99)));
        assert!(!grid.contains(&Position::new(-0.01, 0.0, 5.0)));
        assert!(!grid.contains(&Position::new(10.0, 0.0, 5.0)));
    }

    #[test]
    fn circle_includes_cells_by_center_distance() {
        let zone = ZoneDefinition::new("ring", ZoneShape::circle(0.0, 0.0, 5.0));
        let grid = TerritoryGrid::build(&zone, 1.0).unwrap();
        for cell in grid.cells() {
            let (x, z) = grid.cell_center(*cell);
            assert!((x * x + z * z).sqrt() <= 5.0);
        }
        assert!(grid.contains(&Position::new(0.2, 0.0, -0.2)));
        assert!(!grid.contains(&Position::new(4.9, 0.0, 4.9)));
    }

    #[test]
    fn rebuilding_is_stable() {
        let zone = ZoneDefinition::new("ring", ZoneShape::circle(3.3, -7.1, 12.5));
        let a = TerritoryGrid::build(&zone, 2.0).unwrap();
        let b = TerritoryGrid::build(&zone, 2.0).unwrap();
        assert_eq!(a, b);
        for step in -40..40 {
            let p = Position::new(step as f32 * 0.37, 0.0, step as f32 * -0.53);
            assert_eq!(a.contains(&p), b.contains(&p));
        }
    }

    #[test]
    fn rejects_bad_block_size_and_empty_cover() {
        assert!(TerritoryGrid::build(&square(10.0), 0.0).is_err());
        assert!(TerritoryGrid::build(&square(10.0), f32::INFINITY).is_err());
        let tiny = ZoneDefinition::new("dot", ZoneShape::circle(0.0, 0.0, 0.1));
        assert!(matches!(
            TerritoryGrid::build(&tiny, 1.0),
            Err(ZoneError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn border_is_subset_and_excludes_interior() {
        let grid = TerritoryGrid::build(&square(6.0), 1.0).unwrap();
        let border = grid.border_cells();
        assert!(border.is_subset(grid.cells()));
        // 6x6 square: 36 cells, 4x4 interior.
        assert_eq!(border.len(), 20);
        for cell in grid.cells() {
            if grid.present_neighbors(*cell) == 4 {
                assert!(!border.contains(cell));
            }
        }
    }

    #[test]
    fn corners_of_square_are_its_four_corners() {
        let grid = TerritoryGrid::build(&square(6.0), 1.0).unwrap();
        let corners = grid.corner_cells();
        let expected: HashSet<IVec2> = [
            IVec2::new(0, 0),
            IVec2::new(5, 0),
            IVec2::new(0, 5),
            IVec2::new(5, 5),
        ]
        .into_iter()
        .collect();
        assert_eq!(corners, expected);
    }

    #[test]
    fn concave_territory_border_is_local() {
        // L-shape: 4x4 block with the top-right 2x2 removed.
        let cells = (0..4)
            .flat_map(|x| (0..4).map(move |z| IVec2::new(x, z)))
            .filter(|c| !(c.x >= 2 && c.y >= 2));
        let grid = TerritoryGrid::from_cells(&ZoneId::from("ell"), 1.0, cells).unwrap();
        assert_eq!(grid.len(), 12);
        let border = grid.border_cells();
        // Only (1,1) has all four neighbours.
        assert_eq!(border.len(), 11);
        assert!(!border.contains(&IVec2::new(1, 1)));
        // The inner elbow cell (1,1) is interior, the notch edges are border.
        assert!(border.contains(&IVec2::new(1, 2)));
        assert!(border.contains(&IVec2::new(2, 1)));
    }

    #[test]
    fn border_points_use_spacing_stride() {
        let grid = TerritoryGrid::build(&square(10.0), 1.0).unwrap();
        let border = grid.border_cells().len();
        let dense = grid.border_points(1.0, 2.0);
        let sparse = grid.border_points(3.0, 2.0);
        assert_eq!(dense.len(), border);
        assert_eq!(sparse.len(), border.div_ceil(3));
        assert!(sparse.iter().all(|p| p.y == 2.0));
        assert!(sparse.iter().all(|p| grid.contains(p)));
        // Spacing below one block still emits every border cell.
        assert_eq!(grid.border_points(0.1, 0.0).len(), border);
    }
}
