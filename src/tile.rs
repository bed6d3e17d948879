//! The tile model (spec.md §3): terrain, mutable state tags with decay
//! clocks, occupancy by layer, and a bounded significant-event history.

use crate::affordance::Affordance;
use crate::entity::{EntityId, Layer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainKind {
    Rock,
    Wood,
    Metal,
    Glass,
    Soil,
    WaterShallow,
    WaterDeep,
    Vegetation,
    Debris,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateTag {
    Wet,
    Frozen,
    Cracked,
    Overgrown,
    Scorched,
    Rusty,
    Mossy,
    Bloodied,
    Burning,
    Flooded,
    Darkened,
}

impl StateTag {
    pub fn key(&self) -> &'static str {
        match self {
            StateTag::Wet => "wet",
            StateTag::Frozen => "frozen",
            StateTag::Cracked => "cracked",
            StateTag::Overgrown => "overgrown",
            StateTag::Scorched => "scorched",
            StateTag::Rusty => "rusty",
            StateTag::Mossy => "mossy",
            StateTag::Bloodied => "bloodied",
            StateTag::Burning => "burning",
            StateTag::Flooded => "flooded",
            StateTag::Darkened => "darkened",
        }
    }

    /// Whether this tag impedes movement, used for the traversal-cost
    /// monotonicity invariant (spec.md §3).
    pub fn impedes_movement(&self) -> bool {
        matches!(
            self,
            StateTag::Frozen
                | StateTag::Overgrown
                | StateTag::Burning
                | StateTag::Flooded
                | StateTag::Cracked
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileEventKind {
    EntityArrived,
    EntityLeft,
    StateTagApplied,
    StateTagExpired,
    CombatOccurred,
    SoundHeard,
    Discovered,
}

impl TileEventKind {
    /// Only events in this "significant" set are retained in the
    /// history ring (spec.md §3).
    pub fn is_significant(&self) -> bool {
        matches!(
            self,
            TileEventKind::CombatOccurred
                | TileEventKind::StateTagApplied
                | TileEventKind::Discovered
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileEvent {
    pub timestamp_tick: u64,
    pub kind: TileEventKind,
    pub actor: Option<EntityId>,
}

/// A bounded ring of tile history, oldest-evicted, capacity-bound
/// (spec.md §3; capacity is configuration, see `SimConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRing {
    capacity: usize,
    events: std::collections::VecDeque<TileEvent>,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: std::collections::VecDeque::new(),
        }
    }

    pub fn push_if_significant(&mut self, event: TileEvent) {
        if !event.kind.is_significant() {
            return;
        }
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &TileEvent> {
        self.events.iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayingTag {
    pub tag: StateTag,
    pub remaining_seconds: f32,
}

impl DecayingTag {
    pub fn quantized(&self, quantum: f32) -> Self {
        Self {
            tag: self.tag,
            remaining_seconds: crate::persist::quantize(self.remaining_seconds, quantum),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tile {
    pub terrain_kind: TerrainKind,
    pub biome_tag: String,
    pub base_affordances: Vec<Affordance>,
    pub opacity: f32,
    pub sound_absorption: f32,
    pub sound_emission: f32,
    pub light_emission: f32,
    pub state_tags: Vec<DecayingTag>,
    /// Occupants ordered by layer: ground, then object, then ceiling.
    pub entities: BTreeMap<Layer, Vec<EntityId>>,
    pub history: HistoryRing,
}

impl Tile {
    pub fn new(terrain_kind: TerrainKind, biome_tag: impl Into<String>, history_capacity: usize) -> Self {
        let (opacity, absorption, emission, light) = terrain_kind.base_physical_properties();
        Self {
            terrain_kind,
            biome_tag: biome_tag.into(),
            base_affordances: Vec::new(),
            opacity,
            sound_absorption: absorption,
            sound_emission: emission,
            light_emission: light,
            state_tags: Vec::new(),
            entities: BTreeMap::new(),
            history: HistoryRing::new(history_capacity),
        }
    }

    /// The read-only sentinel returned for coordinates outside the
    /// generated envelope (spec.md §3, §4.1). Zero affordances, infinite
    /// traversal cost.
    pub fn void_sentinel() -> Self {
        Self::new(TerrainKind::Void, "void", 1)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.terrain_kind, TerrainKind::Void)
    }

    pub fn clamp_physical(&mut self) {
        self.opacity = self.opacity.clamp(0.0, 1.0);
        self.sound_absorption = self.sound_absorption.clamp(0.0, 1.0);
        self.sound_emission = self.sound_emission.clamp(0.0, 1.0);
        self.light_emission = self.light_emission.clamp(0.0, 1.0);
    }

    /// Monotonic non-decreasing in the number of impeding state tags
    /// (spec.md §3 invariant). `f32::INFINITY` means impassable.
    pub fn traversal_cost(&self) -> f32 {
        if self.is_void() {
            return f32::INFINITY;
        }
        let mut cost = self.terrain_kind.base_traversal_cost();
        let impeding_count = self
            .state_tags
            .iter()
            .filter(|t| t.tag.impedes_movement())
            .count();
        cost *= 1.0 + 0.5 * impeding_count as f32;
        if self
            .state_tags
            .iter()
            .any(|t| t.tag == StateTag::Burning && self.terrain_kind == TerrainKind::Void)
        {
            return f32::INFINITY;
        }
        cost
    }

    pub fn passable(&self) -> bool {
        self.traversal_cost().is_finite()
    }

    pub fn entity_count_on_layer(&self, layer: Layer) -> usize {
        self.entities.get(&layer).map(|v| v.len()).unwrap_or(0)
    }

    pub fn active_state_tag_keys(&self) -> Vec<String> {
        self.state_tags.iter().map(|t| t.tag.key().to_string()).collect()
    }

    /// Snaps every float field to `quantum` so that two structurally
    /// equal tiles serialize byte-identically (spec.md §6, §9).
    pub fn quantized(&self, quantum: f32) -> Self {
        Self {
            terrain_kind: self.terrain_kind,
            biome_tag: self.biome_tag.clone(),
            base_affordances: self.base_affordances.iter().map(|a| a.quantized(quantum)).collect(),
            opacity: crate::persist::quantize(self.opacity, quantum),
            sound_absorption: crate::persist::quantize(self.sound_absorption, quantum),
            sound_emission: crate::persist::quantize(self.sound_emission, quantum),
            light_emission: crate::persist::quantize(self.light_emission, quantum),
            state_tags: self.state_tags.iter().map(|t| t.quantized(quantum)).collect(),
            entities: self.entities.clone(),
            history: self.history.clone(),
        }
    }

    /// Advances decay clocks by `dt`, dropping expired tags. Returns the
    /// tags that expired this call, for history/event purposes.
    pub fn decay_state_tags(&mut self, dt: f32) -> Vec<StateTag> {
        let mut expired = Vec::new();
        self.state_tags.retain_mut(|t| {
            t.remaining_seconds -= dt;
            if t.remaining_seconds <= 0.0 {
                expired.push(t.tag);
                false
            } else {
                true
            }
        });
        expired
    }
}

impl TerrainKind {
    fn base_physical_properties(&self) -> (f32, f32, f32, f32) {
        // (opacity, sound_absorption, sound_emission, light_emission)
        match self {
            TerrainKind::Rock => (0.9, 0.2, 0.0, 0.0),
            TerrainKind::Wood => (0.6, 0.3, 0.0, 0.0),
            TerrainKind::Metal => (0.8, 0.1, 0.0, 0.0),
            TerrainKind::Glass => (0.1, 0.05, 0.0, 0.0),
            TerrainKind::Soil => (0.2, 0.4, 0.0, 0.0),
            TerrainKind::WaterShallow => (0.05, 0.5, 0.2, 0.0),
            TerrainKind::WaterDeep => (0.1, 0.6, 0.4, 0.0),
            TerrainKind::Vegetation => (0.5, 0.6, 0.1, 0.0),
            TerrainKind::Debris => (0.4, 0.3, 0.0, 0.0),
            TerrainKind::Void => (0.0, 0.0, 0.0, 0.0),
        }
    }

    fn base_traversal_cost(&self) -> f32 {
        match self {
            TerrainKind::Rock => 1.2,
            TerrainKind::Wood => 1.0,
            TerrainKind::Metal => 1.0,
            TerrainKind::Glass => 1.0,
            TerrainKind::Soil => 1.0,
            TerrainKind::WaterShallow => 1.5,
            TerrainKind::WaterDeep => 3.0,
            TerrainKind::Vegetation => 1.3,
            TerrainKind::Debris => 1.8,
            TerrainKind::Void => f32::INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_sentinel_is_impassable_and_affordance_free() {
        let void = Tile::void_sentinel();
        assert!(!void.passable());
        assert!(void.base_affordances.is_empty());
        assert_eq!(void.traversal_cost(), f32::INFINITY);
    }

    #[test]
    fn traversal_cost_is_monotonic_in_impeding_tags() {
        let mut tile = Tile::new(TerrainKind::Soil, "plains", 4);
        let base = tile.traversal_cost();
        tile.state_tags.push(DecayingTag {
            tag: StateTag::Overgrown,
            remaining_seconds: 10.0,
        });
        let after_one = tile.traversal_cost();
        assert!(after_one >= base);
        tile.state_tags.push(DecayingTag {
            tag: StateTag::Flooded,
            remaining_seconds: 10.0,
        });
        let after_two = tile.traversal_cost();
        assert!(after_two >= after_one);
    }

    #[test]
    fn history_only_keeps_significant_events_and_is_bounded() {
        let mut ring = HistoryRing::new(2);
        for _ in 0..5 {
            ring.push_if_significant(TileEvent {
                timestamp_tick: 0,
                kind: TileEventKind::CombatOccurred,
                actor: None,
            });
            ring.push_if_significant(TileEvent {
                timestamp_tick: 0,
                kind: TileEventKind::EntityArrived,
                actor: None,
            });
        }
        assert_eq!(ring.iter().count(), 2);
    }

    #[test]
    fn decay_state_tags_drops_expired() {
        let mut tile = Tile::new(TerrainKind::Soil, "plains", 4);
        tile.state_tags.push(DecayingTag {
            tag: StateTag::Wet,
            remaining_seconds: 0.5,
        });
        let expired = tile.decay_state_tags(1.0);
        assert_eq!(expired, vec![StateTag::Wet]);
        assert!(tile.state_tags.is_empty());
    }
}
