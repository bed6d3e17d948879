//! The immutable per-tick output record (spec.md §6). Consumers render
//! from this; the core never mutates it after publication.

use crate::entity::EntityId;
use crate::geometry::Position;
use crate::intent::IntentOutcome;
use crate::observer::AwarenessState;
use crate::sound::SoundDirection;
use crate::threat::EscalationStage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coarse distance banding for threat descriptors, so renderers don't
/// need to recompute geometry from raw positions (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProximityBand {
    Far,
    Medium,
    Near,
    Imminent,
    Contact,
}

impl ProximityBand {
    pub fn from_distance(distance: f32) -> Self {
        if distance <= 1.0 {
            ProximityBand::Contact
        } else if distance <= 3.0 {
            ProximityBand::Imminent
        } else if distance <= 6.0 {
            ProximityBand::Near
        } else if distance <= 12.0 {
            ProximityBand::Medium
        } else {
            ProximityBand::Far
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioCueView {
    pub tile: Position,
    pub volume: f32,
    pub direction: SoundDirection,
    pub stereo_balance: f32,
    pub masked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatDescriptor {
    pub id: EntityId,
    pub escalation_stage: EscalationStage,
    pub proximity: ProximityBand,
    pub awareness_state: AwarenessState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwarenessTransition {
    pub observer_id: EntityId,
    pub from: AwarenessState,
    pub to: AwarenessState,
}

/// One published tick's worth of world state visible to the player
/// (spec.md §6). Ordering inside every collection is canonical
/// (`BTreeMap`/sorted `Vec`) so two runs with identical inputs produce
/// byte-identical snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub visible_tiles: Vec<Position>,
    pub partial_tiles_with_clarity: BTreeMap<Position, f32>,
    pub audio_cues: Vec<AudioCueView>,
    pub threat_descriptors: Vec<ThreatDescriptor>,
    pub awareness_transitions: Vec<AwarenessTransition>,
    pub intent_outcome: Option<IntentOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proximity_band_boundaries() {
        assert_eq!(ProximityBand::from_distance(0.5), ProximityBand::Contact);
        assert_eq!(ProximityBand::from_distance(2.0), ProximityBand::Imminent);
        assert_eq!(ProximityBand::from_distance(5.0), ProximityBand::Near);
        assert_eq!(ProximityBand::from_distance(10.0), ProximityBand::Medium);
        assert_eq!(ProximityBand::from_distance(50.0), ProximityBand::Far);
    }
}
