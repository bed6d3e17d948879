//! Observers that fuse sight, sound, and prior belief into a 4-state
//! awareness machine (spec.md §4.5).

use crate::entity::EntityId;
use crate::geometry::Position;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AwarenessState {
    Unaware,
    Suspicious,
    Alert,
    Engaged,
}

/// How strongly an observer leans toward curiosity, fear, or paranoia;
/// each bias term nudges the fused awareness score (spec.md §4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObserverBias {
    pub curious: f32,
    pub fearful: f32,
    pub paranoid: f32,
}

impl Default for ObserverBias {
    fn default() -> Self {
        Self {
            curious: 0.0,
            fearful: 0.0,
            paranoid: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observer {
    pub id: EntityId,
    pub position: Position,
    pub facing_angle: f32,
    pub sight_range: f32,
    pub fov_radians: f32,
    pub hearing_range: f32,
    /// `[0,1]`.
    pub awareness_score: f32,
    pub awareness_state: AwarenessState,
    pub bias: ObserverBias,
    /// Whether the player is already known to this observer ahead of
    /// any sight/sound contact this tick. The core treats this
    /// opaquely: it is supplied and maintained entirely by an external
    /// memory collaborator and `fuse` only ever reads it (spec.md §3,
    /// §1 Non-goals — NPC long-term memory is out of scope here).
    pub prior_belief_of_player: bool,
}

impl Observer {
    pub fn new(id: EntityId, position: Position) -> Self {
        Self {
            id,
            position,
            facing_angle: 0.0,
            sight_range: 8.0,
            fov_radians: std::f32::consts::FRAC_PI_2,
            hearing_range: 12.0,
            awareness_score: 0.0,
            awareness_state: AwarenessState::Unaware,
            bias: ObserverBias::default(),
            prior_belief_of_player: false,
        }
    }

    /// Snaps every float field to `quantum` so that two structurally
    /// equal observers serialize byte-identically (spec.md §6, §9).
    pub fn quantized(&self, quantum: f32) -> Self {
        Self {
            id: self.id,
            position: self.position,
            facing_angle: crate::persist::quantize(self.facing_angle, quantum),
            sight_range: crate::persist::quantize(self.sight_range, quantum),
            fov_radians: crate::persist::quantize(self.fov_radians, quantum),
            hearing_range: crate::persist::quantize(self.hearing_range, quantum),
            awareness_score: crate::persist::quantize(self.awareness_score, quantum),
            awareness_state: self.awareness_state,
            bias: ObserverBias {
                curious: crate::persist::quantize(self.bias.curious, quantum),
                fearful: crate::persist::quantize(self.bias.fearful, quantum),
                paranoid: crate::persist::quantize(self.bias.paranoid, quantum),
            },
            prior_belief_of_player: self.prior_belief_of_player,
        }
    }

    /// Fuses visual clarity `v`, audible volume `a`, and prior belief
    /// `m` into a new awareness score, then reclassifies the 4-state
    /// machine at the configured thresholds (spec.md §4.5):
    ///
    /// `awareness' = clamp01(base + 0.5v + 0.4a + 0.2m) * (1 + 0.3*curious)`
    ///
    /// `m` is read from `prior_belief_of_player` as supplied by the
    /// caller; this method never writes that field.
    pub fn fuse(
        &mut self,
        visual_clarity: f32,
        audible_volume: f32,
        thresholds: (f32, f32, f32),
        decay_rates: (f32, f32, f32),
        dt: f32,
    ) {
        let base = self.decayed_base(decay_rates, dt);
        let prior_belief = if self.prior_belief_of_player { 1.0 } else { 0.0 };
        let fused = (base + 0.5 * visual_clarity + 0.4 * audible_volume + 0.2 * prior_belief).clamp(0.0, 1.0);
        let boosted = (fused * (1.0 + 0.3 * self.bias.curious)).clamp(0.0, 1.0);
        self.awareness_score = boosted;

        let (unaware_suspicious, suspicious_alert, alert_engaged) = thresholds;
        self.awareness_state = if self.awareness_score >= alert_engaged {
            AwarenessState::Engaged
        } else if self.awareness_score >= suspicious_alert {
            AwarenessState::Alert
        } else if self.awareness_score >= unaware_suspicious {
            AwarenessState::Suspicious
        } else {
            AwarenessState::Unaware
        };
    }

    /// Applies per-state decay to the score before a new fusion sample
    /// is blended in, so contact loss eventually cools awareness back
    /// down through the state machine rather than latching forever.
    fn decayed_base(&self, decay_rates: (f32, f32, f32), dt: f32) -> f32 {
        let (suspicious_rate, alert_rate, engaged_rate) = decay_rates;
        let rate = match self.awareness_state {
            AwarenessState::Unaware => 0.0,
            AwarenessState::Suspicious => suspicious_rate,
            AwarenessState::Alert => alert_rate,
            AwarenessState::Engaged => engaged_rate,
        };
        (self.awareness_score - rate * dt).max(0.0)
    }
}
