//! # Spatial
//!
//! Conversion between scene distance units and pixels, and integer
//! range checks between token centers.

use crate::primitives::{Point, Token};
use serde::{Deserialize, Serialize};

/// Distance units per grid square when the scene reports none.
pub const DEFAULT_UNITS_PER_SQUARE: u32 = 5;

/// The active grid of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridScale {
    /// Pixels per grid square.
    pub size: u32,
    /// Distance units per grid square.
    pub distance: u32,
}

impl Default for GridScale {
    fn default() -> Self {
        Self {
            size: 100,
            distance: DEFAULT_UNITS_PER_SQUARE,
        }
    }
}

impl GridScale {
    #[must_use]
    pub const fn new(size: u32, distance: u32) -> Self {
        Self { size, distance }
    }

    fn units_per_square(&self) -> u32 {
        if self.distance == 0 {
            DEFAULT_UNITS_PER_SQUARE
        } else {
            self.distance
        }
    }

    /// Radius in pixels of `units` distance units (rounded down).
    #[must_use]
    pub fn radius_px(&self, units: u32) -> u64 {
        u64::from(units) * u64::from(self.size) / u64::from(self.units_per_square())
    }

    /// Whether `b` lies within `units` distance units of `a`.
    ///
    /// Compares squared lengths scaled by units-per-square so no
    /// precision is lost to division. A span too large to represent is
    /// out of range.
    #[must_use]
    pub fn within(&self, a: Point, b: Point, units: u32) -> bool {
        let dx = u128::from(a.x.abs_diff(b.x));
        let dy = u128::from(a.y.abs_diff(b.y));
        let per_square = u128::from(self.units_per_square());
        let reach = u128::from(units) * u128::from(self.size);

        let span = dx
            .checked_mul(dx)
            .zip(dy.checked_mul(dy))
            .and_then(|(xx, yy)| xx.checked_add(yy))
            .and_then(|d| d.checked_mul(per_square))
            .and_then(|d| d.checked_mul(per_square));
        let Some(span) = span else {
            return false;
        };
        reach.checked_mul(reach).is_none_or(|limit| span <= limit)
    }
}

/// Tokens whose centers lie within `units` of `center`, in input order.
pub fn tokens_within<'t>(
    tokens: &'t [Token],
    center: Point,
    units: u32,
    grid: GridScale,
) -> impl Iterator<Item = &'t Token> {
    tokens
        .iter()
        .filter(move |token| grid.within(center, token.center, units))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{DETONATION_RADIUS, Disposition};

    #[test]
    fn ten_units_on_a_fifty_pixel_grid_is_one_hundred_pixels() {
        let grid = GridScale::new(50, 5);
        assert_eq!(grid.radius_px(10), 100);
    }

    #[test]
    fn within_is_inclusive_at_the_edge() {
        let grid = GridScale::new(50, 5);
        let origin = Point::new(0, 0);

        assert!(grid.within(origin, Point::new(100, 0), 10));
        assert!(grid.within(origin, Point::new(60, 80), 10));
        assert!(!grid.within(origin, Point::new(101, 0), 10));
        assert!(!grid.within(origin, Point::new(71, 71), 10));
    }

    #[test]
    fn extreme_scene_values_are_out_of_range() {
        let grid = GridScale::new(u32::MAX, u32::MAX);
        let near = Point::new(i64::MIN, i64::MIN);
        let far = Point::new(i64::MAX, i64::MAX);

        assert!(!grid.within(near, far, DETONATION_RADIUS));
        assert!(!GridScale::new(50, 5).within(near, far, u32::MAX));
        assert!(grid.within(far, far, DETONATION_RADIUS));
    }

    #[test]
    fn missing_units_fall_back_to_five() {
        let grid = GridScale::new(50, 0);
        assert_eq!(grid.radius_px(10), 100);
    }

    #[test]
    fn filters_tokens_in_range() {
        let tokens = vec![
            Token::new("a", "A", Point::new(0, 0), Disposition::Hostile),
            Token::new("b", "B", Point::new(90, 0), Disposition::Hostile),
            Token::new("c", "C", Point::new(300, 0), Disposition::Hostile),
        ];
        let hit: Vec<&str> = tokens_within(&tokens, Point::new(0, 0), 10, GridScale::new(50, 5))
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(hit, vec!["a", "b"]);
    }
}
