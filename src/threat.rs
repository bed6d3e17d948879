//! Threat escalation ladder and real-time reaction resolution (spec.md
//! §4.6).

use crate::entity::EntityId;
use crate::geometry::Position;
use crate::intent::{Intent, IntentOutcome, TimingClass};
use crate::observer::{AwarenessState, Observer};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EscalationStage {
    Notice,
    Challenge,
    Advance,
    Aim,
    Warning,
    Lethal,
}

impl EscalationStage {
    pub fn index(&self) -> usize {
        match self {
            EscalationStage::Notice => 0,
            EscalationStage::Challenge => 1,
            EscalationStage::Advance => 2,
            EscalationStage::Aim => 3,
            EscalationStage::Warning => 4,
            EscalationStage::Lethal => 5,
        }
    }

    fn from_index(i: usize) -> Self {
        match i {
            0 => EscalationStage::Notice,
            1 => EscalationStage::Challenge,
            2 => EscalationStage::Advance,
            3 => EscalationStage::Aim,
            4 => EscalationStage::Warning,
            _ => EscalationStage::Lethal,
        }
    }

    fn next(&self) -> Self {
        Self::from_index((self.index() + 1).min(5))
    }

    fn prev(&self) -> Self {
        Self::from_index(self.index().saturating_sub(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threat {
    pub observer: Observer,
    pub escalation_stage: EscalationStage,
    pub stage_timer_seconds: f32,
    /// Consecutive ticks with neither sight nor sound contact with the
    /// player; two in a row de-escalates one stage (spec.md §4.6).
    pub lost_contact_ticks: u32,
    pub lethality_range_tiles: f32,
    pub damage_potential: f32,
    pub sound_signature: f32,
    pub velocity_tiles_per_second: f32,
}

impl Threat {
    pub fn new(id: EntityId, position: Position) -> Self {
        Self {
            observer: Observer::new(id, position),
            escalation_stage: EscalationStage::Notice,
            stage_timer_seconds: 0.0,
            lost_contact_ticks: 0,
            lethality_range_tiles: 6.0,
            damage_potential: 1.0,
            sound_signature: 0.3,
            velocity_tiles_per_second: 2.0,
        }
    }

    pub fn reaction_window(&self, reaction_windows: &[f32; 6]) -> f32 {
        reaction_windows[self.escalation_stage.index()]
    }

    /// Snaps every float field to `quantum` so that two structurally
    /// equal threats serialize byte-identically (spec.md §6, §9).
    pub fn quantized(&self, quantum: f32) -> Self {
        Self {
            observer: self.observer.quantized(quantum),
            escalation_stage: self.escalation_stage,
            stage_timer_seconds: crate::persist::quantize(self.stage_timer_seconds, quantum),
            lost_contact_ticks: self.lost_contact_ticks,
            lethality_range_tiles: crate::persist::quantize(self.lethality_range_tiles, quantum),
            damage_potential: crate::persist::quantize(self.damage_potential, quantum),
            sound_signature: crate::persist::quantize(self.sound_signature, quantum),
            velocity_tiles_per_second: crate::persist::quantize(self.velocity_tiles_per_second, quantum),
        }
    }

    /// Advances the stage timer; escalates once the timer exceeds the
    /// current stage's reaction window while awareness stays at or
    /// above `Alert`. De-escalates one stage after two consecutive
    /// contact-loss ticks, never below `Notice` (spec.md §4.6).
    pub fn advance(&mut self, dt: f32, has_contact: bool, reaction_windows: &[f32; 6]) {
        if has_contact {
            self.lost_contact_ticks = 0;
            self.stage_timer_seconds += dt;
            let aware_enough = matches!(
                self.observer.awareness_state,
                AwarenessState::Alert | AwarenessState::Engaged
            );
            if aware_enough && self.stage_timer_seconds >= self.reaction_window(reaction_windows) {
                self.escalation_stage = self.escalation_stage.next();
                self.stage_timer_seconds = 0.0;
            }
        } else {
            self.lost_contact_ticks += 1;
            if self.lost_contact_ticks >= 2 && self.escalation_stage != EscalationStage::Notice {
                self.escalation_stage = self.escalation_stage.prev();
                self.stage_timer_seconds = 0.0;
                self.lost_contact_ticks = 0;
            }
        }
    }
}

/// The nearest-in-priority threat, ranked by stage first and distance
/// second (spec.md §4.6, "most urgent threat selection").
pub fn most_urgent<'a>(threats: &'a [Threat], player_pos: Position) -> Option<&'a Threat> {
    threats.iter().max_by(|a, b| {
        a.escalation_stage
            .cmp(&b.escalation_stage)
            .then_with(|| {
                let da = a.observer.position.planar_distance(&player_pos);
                let db = b.observer.position.planar_distance(&player_pos);
                db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
            })
    })
}

/// Resolves a player intent against a threat's reaction window. The
/// four deadline fractions and their damage multipliers are fixed by
/// spec.md §4.6: on-time below `0.5w`, late below `0.8w`, too-late
/// below `w`, and anything at or beyond `w` is the maximum multiplier.
pub fn resolve_reaction(
    threat: &Threat,
    _intent: &Intent,
    effective_reaction_time: f32,
    reaction_windows: &[f32; 6],
) -> IntentOutcome {
    let window = threat.reaction_window(reaction_windows);
    let timing = if effective_reaction_time <= window * 0.5 {
        TimingClass::Early
    } else if effective_reaction_time <= window * 0.8 {
        TimingClass::OnTime
    } else if effective_reaction_time <= window {
        TimingClass::Late
    } else {
        TimingClass::TooLate
    };
    let damage_applied = match timing {
        TimingClass::Early => 0.0,
        TimingClass::OnTime => 0.1,
        TimingClass::Late => 0.4,
        TimingClass::TooLate => 0.8,
        TimingClass::Freeze => 1.0,
    };
    IntentOutcome {
        timing,
        damage_applied,
        intent_accepted: !matches!(timing, TimingClass::TooLate),
    }
}

/// Effective reaction time: raw latency plus a flanking penalty when
/// the threat's approach angle to the player differs from the
/// player's facing by more than `flanking_min_angle_radians`.
pub fn effective_reaction_time(
    intent: &Intent,
    threat_position: Position,
    player_position: Position,
    player_facing: f32,
    flanking_min_angle_radians: f32,
    flanking_time_penalty_seconds: f32,
) -> f32 {
    let dx = (threat_position.x - player_position.x) as f32;
    let dy = (threat_position.y - player_position.y) as f32;
    let angle_to_threat = dy.atan2(dx);
    let mut delta = angle_to_threat - player_facing;
    while delta > std::f32::consts::PI {
        delta -= 2.0 * std::f32::consts::PI;
    }
    while delta < -std::f32::consts::PI {
        delta += 2.0 * std::f32::consts::PI;
    }
    let flanked = delta.abs() > flanking_min_angle_radians;
    intent.input_latency_seconds + if flanked { flanking_time_penalty_seconds } else { 0.0 }
}

/// Whether a set of threats constitutes a crossfire: three or more
/// engaged threats with at least one flanking pair (spec.md §4.6).
pub fn is_crossfire(threats: &[&Threat], player_position: Position, flanking_min_angle_radians: f32) -> bool {
    if threats.len() < 3 {
        return false;
    }
    for i in 0..threats.len() {
        for j in (i + 1)..threats.len() {
            let a = threats[i].observer.position;
            let b = threats[j].observer.position;
            let angle_a = ((a.y - player_position.y) as f32).atan2((a.x - player_position.x) as f32);
            let angle_b = ((b.y - player_position.y) as f32).atan2((b.x - player_position.x) as f32);
            let mut delta = angle_a - angle_b;
            while delta > std::f32::consts::PI {
                delta -= 2.0 * std::f32::consts::PI;
            }
            while delta < -std::f32::consts::PI {
                delta += 2.0 * std::f32::consts::PI;
            }
            if delta.abs() > flanking_min_angle_radians {
                return true;
            }
        }
    }
    false
}

/// Fear-driven freeze check: a probabilistic intent override drawn
/// from the single seeded RNG, never a thread-local source (spec.md
/// §4.6, §9 determinism invariant).
pub fn check_freeze(fear_level: f32, fear_freeze_threshold: f32, rng: &mut impl Rng) -> bool {
    if fear_level < fear_freeze_threshold {
        return false;
    }
    rng.random::<f32>() < (fear_level - fear_freeze_threshold) / (1.0 - fear_freeze_threshold).max(1e-6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{IntentKind, TargetRef};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeSet;

    fn threat_at(x: i32) -> Threat {
        Threat::new(EntityId::new(), Position::new(x, 0, 0))
    }

    fn sample_intent(latency: f32) -> Intent {
        Intent {
            intent_kind: IntentKind::Defend,
            target_ref: None::<TargetRef>,
            modifiers: BTreeSet::new(),
            urgency: 0.5,
            input_latency_seconds: latency,
            arrival_monotonic_time: 0.0,
        }
    }

    #[test]
    fn stage_escalates_after_reaction_window_elapses_with_contact() {
        let mut t = threat_at(1);
        t.observer.awareness_state = AwarenessState::Alert;
        let windows = [0.1, 2.0, 1.5, 1.0, 0.8, 0.5];
        t.advance(0.2, true, &windows);
        assert_eq!(t.escalation_stage, EscalationStage::Challenge);
    }

    #[test]
    fn stage_deescalates_after_two_contact_loss_ticks() {
        let mut t = threat_at(1);
        t.escalation_stage = EscalationStage::Advance;
        let windows = [3.0, 2.0, 1.5, 1.0, 0.8, 0.5];
        t.advance(0.05, false, &windows);
        assert_eq!(t.escalation_stage, EscalationStage::Advance);
        t.advance(0.05, false, &windows);
        assert_eq!(t.escalation_stage, EscalationStage::Challenge);
    }

    #[test]
    fn reaction_resolution_boundaries_match_damage_table() {
        let t = threat_at(1);
        let windows = [3.0, 2.0, 1.5, 1.0, 0.8, 0.5];
        let early = resolve_reaction(&t, &sample_intent(0.1), 1.0, &windows);
        assert_eq!(early.timing, TimingClass::Early);
        let on_time = resolve_reaction(&t, &sample_intent(0.1), 2.0, &windows);
        assert_eq!(on_time.timing, TimingClass::OnTime);
        let late = resolve_reaction(&t, &sample_intent(0.1), 2.7, &windows);
        assert_eq!(late.timing, TimingClass::Late);
        let too_late = resolve_reaction(&t, &sample_intent(0.1), 3.5, &windows);
        assert_eq!(too_late.timing, TimingClass::TooLate);
        assert!(!too_late.intent_accepted);
    }

    #[test]
    fn exact_window_boundary_is_late_and_accepted() {
        let t = threat_at(1);
        let windows = [1.0, 2.0, 1.5, 1.0, 0.8, 0.5];
        let at_window = resolve_reaction(&t, &sample_intent(0.1), 1.0, &windows);
        assert_eq!(at_window.timing, TimingClass::Late);
        assert!(at_window.intent_accepted);

        let at_half = resolve_reaction(&t, &sample_intent(0.1), 0.5, &windows);
        assert_eq!(at_half.timing, TimingClass::Early);

        let at_eighty_percent = resolve_reaction(&t, &sample_intent(0.1), 0.8, &windows);
        assert_eq!(at_eighty_percent.timing, TimingClass::OnTime);

        let just_over = resolve_reaction(&t, &sample_intent(0.1), 1.000001, &windows);
        assert_eq!(just_over.timing, TimingClass::TooLate);
    }

    #[test]
    fn flanking_adds_reaction_time_penalty() {
        let intent = sample_intent(0.2);
        let front = effective_reaction_time(
            &intent,
            Position::new(1, 0, 0),
            Position::new(0, 0, 0),
            0.0,
            std::f32::consts::FRAC_PI_2,
            0.3,
        );
        let flank = effective_reaction_time(
            &intent,
            Position::new(0, 1, 0),
            Position::new(0, 0, 0),
            0.0,
            std::f32::consts::FRAC_PI_2,
            0.3,
        );
        assert!(flank > front);
    }

    #[test]
    fn freeze_never_triggers_below_threshold() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(!check_freeze(0.5, 0.9, &mut rng));
    }

    #[test]
    fn freeze_check_is_deterministic_given_seed() {
        let mut rng_a = ChaCha8Rng::seed_from_u64(42);
        let mut rng_b = ChaCha8Rng::seed_from_u64(42);
        let a = check_freeze(0.95, 0.9, &mut rng_a);
        let b = check_freeze(0.95, 0.9, &mut rng_b);
        assert_eq!(a, b);
    }
}
