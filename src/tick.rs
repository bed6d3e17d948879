//! The fixed-timestep tick driver (spec.md §2, §4.6). Sequences tile
//! decay, mutation commit, vision, sound, awareness fusion, escalation,
//! and reaction resolution deterministically behind a single seeded RNG.

use crate::affordance::WorldRules;
use crate::config::SimConfig;
use crate::entity::EntityId;
use crate::grid::Grid;
use crate::intent::{Intent, IntentOutcome};
use crate::error::CoreResult;
use crate::persist::{self, PersistedState};
use crate::snapshot::{AudioCueView, AwarenessTransition, ProximityBand, Snapshot, ThreatDescriptor};
use crate::sound::{self, SoundEvent, SoundService};
use crate::threat::{self, Threat};
use crate::vision::{ObserverPose, VisibilityModifiers, VisionService};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};

pub struct TickDriver {
    pub grid: Grid,
    pub rules: WorldRules,
    pub config: SimConfig,
    pub threats: Vec<Threat>,
    pub sound_events: Vec<SoundEvent>,
    pub player_id: EntityId,
    pub player_sight_range: f32,
    pub player_fov_radians: f32,
    pub player_hearing_range: f32,
    rng: ChaCha8Rng,
    tick: u64,
}

impl TickDriver {
    pub fn new(grid: Grid, rules: WorldRules, config: SimConfig, seed: u64, player_id: EntityId) -> Self {
        Self {
            grid,
            rules,
            config,
            threats: Vec::new(),
            sound_events: Vec::new(),
            player_id,
            player_sight_range: 8.0,
            player_fov_radians: std::f32::consts::PI,
            player_hearing_range: 12.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            tick: 0,
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn queue_sound_event(&mut self, event: SoundEvent) {
        self.sound_events.push(event);
    }

    /// Serializes the grid, every threat's observer state, the tick
    /// counter, and the seeded RNG's stream state into canonical bytes
    /// (spec.md §6). Sound events and queued mutations are transient
    /// and are not part of the persisted layout.
    pub fn save(&self) -> CoreResult<Vec<u8>> {
        let state = PersistedState::quantized(
            self.tick,
            &self.grid,
            &self.threats,
            self.rng.clone(),
            self.config.serialization_quantum,
        );
        persist::save_state(&state)
    }

    /// Restores the grid, threats, tick counter, and RNG state from
    /// bytes produced by `save`. `rules`, `config`, and the player
    /// identity are left untouched — they're construction-time
    /// configuration, not simulation state.
    pub fn load_into(&mut self, bytes: &[u8]) -> CoreResult<()> {
        let state: PersistedState = persist::load_state(bytes)?;
        self.tick = state.tick;
        self.grid = state.grid;
        self.threats = state.threats;
        self.rng = state.rng_state;
        Ok(())
    }

    /// Runs the eight-step per-tick sequence and publishes the result.
    pub fn tick(
        &mut self,
        pending_intent: Option<Intent>,
        modifiers: &dyn VisibilityModifiers,
    ) -> Snapshot {
        let dt = self.config.dt_seconds;

        // 1. decay tile state tags.
        self.grid.decay_all(dt);

        // 2. commit queued mutations (placement, state tag changes).
        let _receipts = self.grid.commit_mutations();

        // 3. expire stale discrete sound events, then emit continuous ones.
        self.sound_events
            .retain(|e| !SoundService::is_expired(e, self.tick, self.config.sound_decay_horizon_ticks as u64));
        for entity in self.grid.entities_iter() {
            if entity.sound_signature > 0.0 {
                self.sound_events.push(SoundEvent {
                    origin: entity.position,
                    source: Some(entity.id),
                    initial_volume: entity.sound_signature,
                    emitted_tick: self.tick,
                    is_continuous: true,
                });
            }
        }

        // 4. propagate every active sound event individually (kept
        // separate, not merged, so masking can treat each event as a
        // potential masker of every other one at a shared tile), and
        // also fold them into one max-per-tile map for the simpler
        // threat-hearing gate below.
        let mut event_volumes: Vec<HashMap<_, f32>> = Vec::with_capacity(self.sound_events.len());
        let mut volume_at_tile: HashMap<_, f32> = HashMap::new();
        for event in &self.sound_events {
            let propagated = sound::propagate(
                &self.grid,
                event,
                self.config.attenuation_per_tile,
                self.config.hearing_threshold,
            );
            for (&pos, &vol) in &propagated {
                volume_at_tile
                    .entry(pos)
                    .and_modify(|v: &mut f32| *v = v.max(vol))
                    .or_insert(vol);
            }
            event_volumes.push(propagated);
        }

        let player_position = self
            .grid
            .entity(self.player_id)
            .map(|e| e.position)
            .unwrap_or(crate::geometry::Position::new(0, 0, 0));
        let player_facing = self.grid.entity(self.player_id).map(|e| e.facing_angle).unwrap_or(0.0);

        // 5. update each threat's vision + hearing, fuse awareness, advance
        // the escalation ladder.
        let mut transitions = Vec::new();
        let windows = self.config.reaction_windows;
        let thresholds = (
            self.config.threshold_unaware_suspicious,
            self.config.threshold_suspicious_alert,
            self.config.threshold_alert_engaged,
        );
        let decay_rates = (
            self.config.awareness_decay_suspicious,
            self.config.awareness_decay_alert,
            self.config.awareness_decay_engaged,
        );

        for t in &mut self.threats {
            let pose = ObserverPose {
                position: t.observer.position,
                facing_angle: t.observer.facing_angle,
                fov_radians: t.observer.fov_radians,
                sight_range: t.observer.sight_range,
            };
            let vision = VisionService::compute(&self.grid, &pose, self.config.min_rays, self.config.vision_step, modifiers);
            let sees_player = vision.visible_entities.contains(&self.player_id);

            let heard_volume = volume_at_tile.get(&player_position).copied().unwrap_or(0.0);
            let hears_player = heard_volume >= self.config.hearing_threshold
                && t.observer.position.planar_distance(&player_position) <= t.observer.hearing_range;

            let visual_clarity = if sees_player { 1.0 } else { 0.0 };

            let before = t.observer.awareness_state;
            t.observer.fuse(visual_clarity, heard_volume, thresholds, decay_rates, dt);
            if t.observer.awareness_state != before {
                transitions.push(AwarenessTransition {
                    observer_id: t.observer.id,
                    from: before,
                    to: t.observer.awareness_state,
                });
            }

            t.advance(dt, sees_player || hears_player, &windows);
        }

        // 6. resolve any pending player intent against the most urgent threat.
        let intent_outcome: Option<IntentOutcome> = pending_intent.as_ref().and_then(|intent| {
            let most_urgent = threat::most_urgent(&self.threats, player_position)?;
            let reaction_time = threat::effective_reaction_time(
                intent,
                most_urgent.observer.position,
                player_position,
                player_facing,
                self.config.flanking_min_angle_radians,
                self.config.flanking_time_penalty_seconds,
            );
            let fear_level = most_urgent.observer.awareness_score;
            if threat::check_freeze(fear_level, self.config.fear_freeze_threshold, &mut self.rng) {
                return Some(IntentOutcome {
                    timing: crate::intent::TimingClass::Freeze,
                    damage_applied: 1.0,
                    intent_accepted: false,
                });
            }
            Some(threat::resolve_reaction(most_urgent, intent, reaction_time, &windows))
        });

        // 7. compute the player's own sight/hearing for the published snapshot.
        let player_pose = ObserverPose {
            position: player_position,
            facing_angle: player_facing,
            fov_radians: self.player_fov_radians,
            sight_range: self.player_sight_range,
        };
        let player_vision = VisionService::compute(&self.grid, &player_pose, self.config.min_rays, self.config.vision_step, modifiers);
        let cues = SoundService::audible_cues(
            player_position,
            player_facing,
            self.player_hearing_range,
            &event_volumes,
            self.config.masking_threshold,
            self.config.masking_factor,
        );

        let mut visible_tiles: Vec<_> = player_vision.visible.keys().copied().collect();
        visible_tiles.sort();
        let partial_tiles_with_clarity: BTreeMap<_, _> = player_vision.partial.into_iter().collect();

        let threat_descriptors: Vec<ThreatDescriptor> = self
            .threats
            .iter()
            .map(|t| ThreatDescriptor {
                id: t.observer.id,
                escalation_stage: t.escalation_stage,
                proximity: ProximityBand::from_distance(t.observer.position.planar_distance(&player_position)),
                awareness_state: t.observer.awareness_state,
            })
            .collect();

        // 8. publish.
        let snapshot = Snapshot {
            tick: self.tick,
            visible_tiles,
            partial_tiles_with_clarity,
            audio_cues: cues
                .into_iter()
                .map(|c| AudioCueView {
                    tile: c.tile,
                    volume: c.volume,
                    direction: c.direction,
                    stereo_balance: c.stereo_balance,
                    masked: c.masked,
                })
                .collect(),
            threat_descriptors,
            awareness_transitions: transitions,
            intent_outcome,
        };
        self.tick += 1;
        snapshot
    }
}

// AwarenessState is re-exported for downstream snapshot consumers that
// only import `tick`.
pub use crate::observer::AwarenessState as ObserverAwarenessState;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityKind, Layer};
    use crate::geometry::Position;
    use crate::tile::{TerrainKind, Tile};

    struct NoopModifiers;
    impl VisibilityModifiers for NoopModifiers {
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

    fn build_driver() -> TickDriver {
        let mut grid = Grid::new(8, 64);
        for x in -5..=5 {
            for y in -5..=5 {
                grid.generate_tile(Position::new(x, y, 0), Tile::new(TerrainKind::Soil, "plains", 8));
            }
        }
        let player = Entity::new(Position::new(0, 0, 0), EntityKind::Player, Layer::Ground);
        let player_id = player.id;
        grid.register_entity(player);

        let mut driver = TickDriver::new(grid, WorldRules::default(), SimConfig::default(), 7, player_id);
        driver.threats.push(Threat::new(EntityId::new(), Position::new(3, 0, 0)));
        driver
    }

    #[test]
    fn tick_advances_counter_and_produces_a_snapshot() {
        let mut driver = build_driver();
        let snap = driver.tick(None, &NoopModifiers);
        assert_eq!(snap.tick, 0);
        assert_eq!(driver.current_tick(), 1);
    }

    #[test]
    fn threats_start_at_notice() {
        let driver = build_driver();
        assert_eq!(driver.threats[0].escalation_stage, crate::threat::EscalationStage::Notice);
    }

    #[test]
    fn identical_seed_and_inputs_produce_identical_snapshots() {
        let mut a = build_driver();
        let mut b = build_driver();
        for _ in 0..10 {
            let snap_a = a.tick(None, &NoopModifiers);
            let snap_b = b.tick(None, &NoopModifiers);
            assert_eq!(snap_a.visible_tiles, snap_b.visible_tiles);
            assert_eq!(snap_a.threat_descriptors.len(), snap_b.threat_descriptors.len());
        }
    }
}
