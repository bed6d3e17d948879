//! Entity records (spec.md §3). The grid owns placement; each entity
//! owns its own position — cross-references use ids, never live handles
//! (spec.md §9, "cyclic entity/tile references").

use crate::geometry::Position;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The stable layer an entity occupies within a tile (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    Ground,
    Object,
    Ceiling,
}

pub const LAYER_CAPACITY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Observer,
    StaticFeature,
    Hazard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub position: Position,
    pub facing_angle: f32,
    pub size: f32,
    pub kind: EntityKind,
    pub layer: Layer,
    /// Continuous sound signature for static features that emit each
    /// tick (spec.md §4.4); `0.0` for entities that don't emit.
    pub sound_signature: f32,
}

impl Entity {
    pub fn new(position: Position, kind: EntityKind, layer: Layer) -> Self {
        Self {
            id: EntityId::new(),
            position,
            facing_angle: 0.0,
            size: 1.0,
            kind,
            layer,
            sound_signature: 0.0,
        }
    }

    /// Snaps every float field to `quantum` so that two structurally
    /// equal entities serialize byte-identically (spec.md §6, §9).
    pub fn quantized(&self, quantum: f32) -> Self {
        Self {
            id: self.id,
            position: self.position,
            facing_angle: crate::persist::quantize(self.facing_angle, quantum),
            size: crate::persist::quantize(self.size, quantum),
            kind: self.kind,
            layer: self.layer,
            sound_signature: crate::persist::quantize(self.sound_signature, quantum),
        }
    }
}
