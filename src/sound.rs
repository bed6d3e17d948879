//! Damped breadth-first sound propagation (spec.md §4.4).

use crate::entity::EntityId;
use crate::geometry::Position;
use crate::grid::Grid;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundDirection {
    Front,
    Back,
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct SoundEvent {
    pub origin: Position,
    pub source: Option<EntityId>,
    pub initial_volume: f32,
    pub emitted_tick: u64,
    /// Discrete events expire after `SimConfig::sound_decay_horizon_ticks`;
    /// continuous emitters re-propagate fresh every tick and never use
    /// this field's decay.
    pub is_continuous: bool,
}

#[derive(Debug, Clone)]
pub struct AudioCue {
    pub tile: Position,
    pub volume: f32,
    pub direction: SoundDirection,
    /// `[-1, 1]`, negative is left.
    pub stereo_balance: f32,
    pub masked: bool,
}

/// Flood-fills volume outward from `event.origin`, attenuating by each
/// tile's `sound_absorption` and cutting off once volume drops below
/// `hearing_threshold`. Revisits are only allowed when they strictly
/// improve the recorded volume at that tile, which bounds the queue to
/// one productive visit per tile per propagation (spec.md §4.4).
pub fn propagate(
    grid: &Grid,
    event: &SoundEvent,
    attenuation_per_tile: f32,
    hearing_threshold: f32,
) -> HashMap<Position, f32> {
    let mut volume_at_tile: HashMap<Position, f32> = HashMap::new();
    let mut queue: VecDeque<Position> = VecDeque::new();

    volume_at_tile.insert(event.origin, event.initial_volume);
    queue.push_back(event.origin);

    while let Some(current) = queue.pop_front() {
        let current_volume = *volume_at_tile.get(&current).unwrap_or(&0.0);
        if current_volume < hearing_threshold {
            continue;
        }
        let tile = grid.get_tile(current);
        for neighbor in current.planar_neighbors() {
            if !grid.contains_generated(neighbor) {
                continue;
            }
            let next_volume =
                current_volume * (1.0 - tile.sound_absorption.clamp(0.0, 1.0)) * attenuation_per_tile;
            if next_volume < hearing_threshold {
                continue;
            }
            let improves = match volume_at_tile.get(&neighbor) {
                Some(existing) => next_volume > *existing,
                None => true,
            };
            if improves {
                volume_at_tile.insert(neighbor, next_volume);
                queue.push_back(neighbor);
            }
        }
    }

    volume_at_tile
}

pub struct SoundService;

impl SoundService {
    /// Combines a listener's audible tiles into directional cues. At
    /// each tile, the loudest of the individually-propagated
    /// `event_volumes` is the target sound; every other event whose own
    /// volume at that tile is at least `masking_threshold` (an absolute
    /// cutoff, not a ratio against the target) contributes
    /// `masking_factor` to a summed, 1.0-capped mask fraction, and the
    /// target's recorded volume is multiplied by `(1 - mask_fraction)`
    /// (spec.md §4.4).
    pub fn audible_cues(
        listener: Position,
        listener_facing: f32,
        hearing_range: f32,
        event_volumes: &[HashMap<Position, f32>],
        masking_threshold: f32,
        masking_factor: f32,
    ) -> Vec<AudioCue> {
        let mut tiles: std::collections::HashSet<Position> = std::collections::HashSet::new();
        for map in event_volumes {
            tiles.extend(map.keys().copied());
        }

        let mut cues = Vec::new();
        for tile in tiles {
            let distance = listener.planar_distance(&tile);
            if distance > hearing_range {
                continue;
            }
            let volumes_here: Vec<f32> = event_volumes.iter().filter_map(|m| m.get(&tile).copied()).collect();
            let Some((loudest_idx, &volume_at_loudest)) = volumes_here
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            else {
                continue;
            };

            let mask_fraction: f32 = volumes_here
                .iter()
                .enumerate()
                .filter(|(i, v)| *i != loudest_idx && **v >= masking_threshold)
                .map(|_| masking_factor)
                .sum::<f32>()
                .min(1.0);
            let volume = volume_at_loudest * (1.0 - mask_fraction);
            let masked = mask_fraction > 0.0;

            let dx = (tile.x - listener.x) as f32;
            let dy = (tile.y - listener.y) as f32;
            let angle_to = dy.atan2(dx);
            let mut delta = angle_to - listener_facing;
            while delta > std::f32::consts::PI {
                delta -= 2.0 * std::f32::consts::PI;
            }
            while delta < -std::f32::consts::PI {
                delta += 2.0 * std::f32::consts::PI;
            }

            let direction = if delta.abs() <= std::f32::consts::FRAC_PI_4 {
                SoundDirection::Front
            } else if delta.abs() >= std::f32::consts::PI - std::f32::consts::FRAC_PI_4 {
                SoundDirection::Back
            } else if delta > 0.0 {
                SoundDirection::Right
            } else {
                SoundDirection::Left
            };
            let stereo_balance = (delta.sin()).clamp(-1.0, 1.0);

            cues.push(AudioCue {
                tile,
                volume,
                direction,
                stereo_balance,
                masked,
            });
        }
        cues.sort_by(|a, b| b.volume.partial_cmp(&a.volume).unwrap());
        cues
    }

    /// Discrete events older than the decay horizon no longer propagate;
    /// continuous emitters are exempt (spec.md §4.4, §3 supplement).
    pub fn is_expired(event: &SoundEvent, current_tick: u64, decay_horizon_ticks: u64) -> bool {
        !event.is_continuous && current_tick.saturating_sub(event.emitted_tick) > decay_horizon_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{TerrainKind, Tile};

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
    fn volume_decays_with_distance() {
        let grid = open_grid(10);
        let event = SoundEvent {
            origin: Position::new(0, 0, 0),
            source: None,
            initial_volume: 1.0,
            emitted_tick: 0,
            is_continuous: false,
        };
        let volumes = propagate(&grid, &event, 0.85, 0.01);
        let near = volumes[&Position::new(1, 0, 0)];
        let far = volumes[&Position::new(5, 0, 0)];
        assert!(near > far);
    }

    #[test]
    fn absorption_reduces_propagation_distance() {
        let mut quiet_grid = open_grid(10);
        for (pos, mut tile) in quiet_grid
            .get_in_radius(Position::new(0, 0, 0), 10)
            .into_iter()
            .map(|(p, t)| (p, t.clone()))
            .collect::<Vec<_>>()
        {
            tile.sound_absorption = 0.9;
            quiet_grid.generate_tile(pos, tile);
        }
        let loud_grid = open_grid(10);

        let event = SoundEvent {
            origin: Position::new(0, 0, 0),
            source: None,
            initial_volume: 1.0,
            emitted_tick: 0,
            is_continuous: false,
        };
        let quiet_volumes = propagate(&quiet_grid, &event, 0.85, 0.01);
        let loud_volumes = propagate(&loud_grid, &event, 0.85, 0.01);
        assert!(quiet_volumes.len() <= loud_volumes.len());
    }

    #[test]
    fn a_masker_above_threshold_reduces_the_loudest_events_volume() {
        let mut target = HashMap::new();
        target.insert(Position::new(1, 0, 0), 0.5);
        let mut masker = HashMap::new();
        masker.insert(Position::new(1, 0, 0), 0.4);

        let cues = SoundService::audible_cues(
            Position::new(0, 0, 0),
            0.0,
            10.0,
            &[target, masker],
            0.3,
            0.6,
        );
        assert_eq!(cues.len(), 1);
        assert!(cues[0].masked);
        assert!((cues[0].volume - 0.5 * (1.0 - 0.6)).abs() < 1e-6);
    }

    #[test]
    fn a_quiet_masker_below_threshold_does_not_mask() {
        let mut target = HashMap::new();
        target.insert(Position::new(1, 0, 0), 0.5);
        let mut masker = HashMap::new();
        masker.insert(Position::new(1, 0, 0), 0.1);

        let cues = SoundService::audible_cues(
            Position::new(0, 0, 0),
            0.0,
            10.0,
            &[target, masker],
            0.3,
            0.6,
        );
        assert_eq!(cues.len(), 1);
        assert!(!cues[0].masked);
        assert!((cues[0].volume - 0.5).abs() < 1e-6);
    }

    #[test]
    fn a_loud_masker_reduces_the_louder_events_own_volume() {
        // Two events both above the masking threshold at the same tile:
        // the loudest becomes the published cue, and its volume is still
        // reduced by the other's mask_factor contribution.
        let mut event_a = HashMap::new();
        event_a.insert(Position::new(1, 0, 0), 0.9);
        let mut event_b = HashMap::new();
        event_b.insert(Position::new(1, 0, 0), 0.5);

        let cues = SoundService::audible_cues(
            Position::new(0, 0, 0),
            0.0,
            10.0,
            &[event_a, event_b],
            0.3,
            0.6,
        );
        assert_eq!(cues.len(), 1);
        assert!(cues[0].masked);
        assert!((cues[0].volume - 0.9 * (1.0 - 0.6)).abs() < 1e-6);
    }

    #[test]
    fn discrete_events_expire_past_horizon_but_continuous_never_do() {
        let discrete = SoundEvent {
            origin: Position::new(0, 0, 0),
            source: None,
            initial_volume: 1.0,
            emitted_tick: 0,
            is_continuous: false,
        };
        let continuous = SoundEvent {
            is_continuous: true,
            ..discrete.clone()
        };
        assert!(SoundService::is_expired(&discrete, 100, 40));
        assert!(!SoundService::is_expired(&continuous, 100, 40));
    }
}
