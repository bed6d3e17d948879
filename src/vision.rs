//! Bounded raycast vision (spec.md §4.3).

use crate::entity::{Entity, EntityId};
use crate::geometry::Position;
use crate::grid::Grid;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct ObserverPose {
    pub position: Position,
    pub facing_angle: f32,
    pub fov_radians: f32,
    pub sight_range: f32,
}

/// Global visibility modifiers applied after ray accumulation (spec.md
/// §4.3): ambient light, weather visibility factor, `obscures_vision`
/// affordance intensity. The vision service doesn't know how to compute
/// these; the caller (tick driver) supplies them per tile.
pub trait VisibilityModifiers {
    fn ambient_light(&self, tile: Position) -> f32;
    fn weather_visibility_factor(&self, tile: Position) -> f32;
    fn obscures_vision_intensity(&self, tile: Position) -> f32;
}

#[derive(Debug, Clone, Default)]
pub struct VisionResult {
    /// Tiles with final clarity >= 0.9.
    pub visible: HashMap<Position, f32>,
    /// Tiles with clarity in [0.1, 0.9).
    pub partial: HashMap<Position, f32>,
    pub visible_entities: Vec<EntityId>,
}

pub struct VisionService;

impl VisionService {
    pub fn compute(
        grid: &Grid,
        pose: &ObserverPose,
        min_rays: u32,
        step: f32,
        modifiers: &dyn VisibilityModifiers,
    ) -> VisionResult {
        let mut clarity_map: HashMap<Position, f32> = HashMap::new();
        let ray_count = min_rays.max(2);
        let half_fov = pose.fov_radians / 2.0;

        for i in 0..ray_count {
            let t = if ray_count == 1 {
                0.0
            } else {
                i as f32 / (ray_count - 1) as f32
            };
            let angle = pose.facing_angle - half_fov + t * pose.fov_radians;
            let dir = (angle.cos(), angle.sin());
            let target = Position::new(
                pose.position.x + (dir.0 * pose.sight_range).round() as i32,
                pose.position.y + (dir.1 * pose.sight_range).round() as i32,
                pose.position.z,
            );

            cast_single_ray(grid, pose, target, step, modifiers, &mut clarity_map);
        }

        let mut result = VisionResult::default();
        for (pos, clarity) in clarity_map {
            if clarity >= 0.9 {
                result.visible.insert(pos, clarity);
            } else if clarity >= 0.1 {
                result.partial.insert(pos, clarity);
            }
        }

        for entity in grid.entities_iter() {
            if Self::entity_visible(grid, pose, entity, step, modifiers) {
                result.visible_entities.push(entity.id);
            }
        }

        result
    }

    fn entity_visible(
        grid: &Grid,
        pose: &ObserverPose,
        entity: &Entity,
        step: f32,
        modifiers: &dyn VisibilityModifiers,
    ) -> bool {
        let d = pose.position.planar_distance(&entity.position);
        if d > pose.sight_range {
            return false;
        }
        let dx = (entity.position.x - pose.position.x) as f32;
        let dy = (entity.position.y - pose.position.y) as f32;
        let angle_to = dy.atan2(dx);
        let mut delta = angle_to - pose.facing_angle;
        while delta > std::f32::consts::PI {
            delta -= 2.0 * std::f32::consts::PI;
        }
        while delta < -std::f32::consts::PI {
            delta += 2.0 * std::f32::consts::PI;
        }
        if delta.abs() > pose.fov_radians / 2.0 {
            return false;
        }

        let mut clarity_map = HashMap::new();
        cast_single_ray(grid, pose, entity.position, step, modifiers, &mut clarity_map);
        clarity_map.get(&entity.position).copied().unwrap_or(0.0) >= 0.3
    }
}

fn cast_single_ray(
    grid: &Grid,
    pose: &ObserverPose,
    target: Position,
    step: f32,
    modifiers: &dyn VisibilityModifiers,
    clarity_map: &mut HashMap<Position, f32>,
) {
    let samples = grid.raycast(pose.position, target, step);
    let mut accumulated_opacity = 0.0_f32;

    for (tile_pos, distance) in samples {
        if distance > pose.sight_range || accumulated_opacity >= 0.99 {
            break;
        }
        let tile = grid.get_tile(tile_pos);
        let base_clarity =
            (1.0 - accumulated_opacity) * (1.0 - (distance / pose.sight_range).powi(2));
        let modified = (base_clarity
            * modifiers.ambient_light(tile_pos).clamp(0.0, 1.0).max(0.05)
            * modifiers.weather_visibility_factor(tile_pos).clamp(0.0, 1.0)
            * (1.0 - modifiers.obscures_vision_intensity(tile_pos).clamp(0.0, 1.0)))
        .clamp(0.0, 1.0);

        clarity_map
            .entry(tile_pos)
            .and_modify(|c| *c = c.max(modified))
            .or_insert(modified);

        accumulated_opacity = (accumulated_opacity + tile.opacity * step).min(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TerrainKind;
    use crate::tile::Tile;

    struct NoModifiers;
    impl VisibilityModifiers for NoModifiers {
        fn ambient_light(&self, _: Position) -> f32 {
            1.0
        }
        fn weather_visibility_factor(&self, _: Position) -> f32 {
            1.0
        }
        fn obscures_vision_intensity(&self, _: Position) -> f32 {
            0.0
        }
    }

    fn open_grid(n: i32) -> Grid {
        let mut grid = Grid::new(8, 64);
        for x in -n..=n {
            for y in -n..=n {
                grid.generate_tile(Position::new(x, y, 0), Tile::new(TerrainKind::Soil, "plains", 8));
            }
        }
        grid
    }

    #[test]
    fn clear_open_field_is_fully_visible_near_observer() {
        let grid = open_grid(10);
        let pose = ObserverPose {
            position: Position::new(0, 0, 0),
            facing_angle: 0.0,
            fov_radians: std::f32::consts::PI,
            sight_range: 8.0,
        };
        let result = VisionService::compute(&grid, &pose, 64, 0.25, &NoModifiers);
        assert!(result.visible.contains_key(&Position::new(1, 0, 0)));
    }

    #[test]
    fn opaque_wall_blocks_vision_behind_it() {
        let mut grid = open_grid(5);
        let mut wall = Tile::new(TerrainKind::Rock, "plains", 8);
        wall.opacity = 1.0;
        grid.generate_tile(Position::new(3, 0, 0), wall);

        let pose = ObserverPose {
            position: Position::new(0, 0, 0),
            facing_angle: 0.0,
            fov_radians: std::f32::consts::FRAC_PI_2,
            sight_range: 8.0,
        };
        let result = VisionService::compute(&grid, &pose, 64, 0.25, &NoModifiers);
        let behind_clarity = result
            .visible
            .get(&Position::new(5, 0, 0))
            .or_else(|| result.partial.get(&Position::new(5, 0, 0)))
            .copied()
            .unwrap_or(0.0);
        assert!(behind_clarity < 0.3);
    }
}
