//! Positions, neighbor iteration, and the Bresenham raycast with corner
//! safety (spec.md §3, §4.1).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn planar_distance(&self, other: &Position) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    /// Up to 8 planar neighbors in the same z-band, in a stable order.
    pub fn planar_neighbors(&self) -> [Position; 8] {
        [
            Position::new(self.x + 1, self.y, self.z),
            Position::new(self.x + 1, self.y + 1, self.z),
            Position::new(self.x, self.y + 1, self.z),
            Position::new(self.x - 1, self.y + 1, self.z),
            Position::new(self.x - 1, self.y, self.z),
            Position::new(self.x - 1, self.y - 1, self.z),
            Position::new(self.x, self.y - 1, self.z),
            Position::new(self.x + 1, self.y - 1, self.z),
        ]
    }

    pub fn vertical_neighbors(&self) -> [Position; 2] {
        [
            Position::new(self.x, self.y, self.z + 1),
            Position::new(self.x, self.y, self.z - 1),
        ]
    }

    /// The pair of tiles forming the shared corner between `self` and a
    /// diagonal neighbor `other` (must differ by exactly one planar step
    /// on each axis). Used by the raycast corner rule.
    pub fn shared_corner(&self, other: &Position) -> Option<(Position, Position)> {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        if dx.abs() == 1 && dy.abs() == 1 && self.z == other.z {
            Some((
                Position::new(self.x + dx, self.y, self.z),
                Position::new(self.x, self.y + dy, self.z),
            ))
        } else {
            None
        }
    }
}

/// A single sub-step along a ray: the tile it falls in and the distance
/// travelled from the ray's origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaySample {
    pub tile: Position,
    pub distance: f32,
}

/// Casts planar sub-steps of `step` length from `from` toward `to`,
/// stopping once `max_distance` is reached or `to`'s tile is passed.
/// Pure geometry; opacity/corner-blocking is applied by the caller
/// (vision/sound need different semantics for "blocked").
pub fn march(from: (f32, f32), to: (f32, f32), step: f32, max_distance: f32) -> Vec<RaySample> {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let total = (dx * dx + dy * dy).sqrt();
    if total <= f32::EPSILON {
        return vec![RaySample {
            tile: Position::new(from.0.round() as i32, from.1.round() as i32, 0),
            distance: 0.0,
        }];
    }
    let dir = (dx / total, dy / total);
    let mut samples = Vec::new();
    let mut travelled = 0.0_f32;
    let limit = max_distance.min(total);
    while travelled <= limit {
        let px = from.0 + dir.0 * travelled;
        let py = from.1 + dir.1 * travelled;
        samples.push(RaySample {
            tile: Position::new(px.round() as i32, py.round() as i32, 0),
            distance: travelled,
        });
        travelled += step;
    }
    samples
}
