//! Construction-time configuration record.
//!
//! Mirrors the teacher's `DreadProgressionConfig` pattern: a flat, plain
//! `serde`-derived struct, validated once at construction, never reread
//! or hot-reloaded by the core itself.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Spread factors for the adjacency-spread affordance subset (spec.md
/// §4.2). Keys are the affordance category tag names; values are in
/// `[0,1]`.
pub type SpreadFactors = HashMap<String, f32>;

/// Per-stage reaction windows, indexed by escalation stage `0..=5`.
pub type ReactionWindows = [f32; 6];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Fixed tick step, seconds. Target 20 Hz -> 0.05.
    pub dt_seconds: f32,

    /// Sub-tile raycast step for vision (spec.md §4.3), must be `<= 0.5`.
    pub vision_step: f32,
    /// Minimum rays per field of view, independent of renderer width.
    pub min_rays: u32,

    /// Minimum propagated volume below which sound BFS stops expanding.
    pub hearing_threshold: f32,
    /// Per-tile inverse-square discretized attenuation factor, `(0,1]`.
    pub attenuation_per_tile: f32,
    /// Masking threshold: a masker's volume at a tile must exceed this to
    /// mask other sounds there.
    pub masking_threshold: f32,
    /// Fraction a single qualifying masker reduces another sound's
    /// recorded volume by at the same tile; contributions from multiple
    /// simultaneous maskers sum, capped at 1.0 (spec.md §4.4).
    pub masking_factor: f32,
    /// Ticks a discrete sound event's volume map is retained for.
    pub sound_decay_horizon_ticks: u32,

    /// Awareness decay rate per second, indexed by current state
    /// (`Suspicious`, `Alert`, `Engaged`; `Unaware` is unused).
    pub awareness_decay_suspicious: f32,
    pub awareness_decay_alert: f32,
    pub awareness_decay_engaged: f32,

    /// Awareness state thresholds, strictly increasing, all in `[0,1]`.
    pub threshold_unaware_suspicious: f32,
    pub threshold_suspicious_alert: f32,
    pub threshold_alert_engaged: f32,

    /// Nominal reaction window per escalation stage, seconds, strictly
    /// non-increasing as stage rises (spec.md §4.5 table).
    pub reaction_windows: ReactionWindows,

    /// Flanking / crossfire adjustments (spec.md §4.5).
    pub flanking_time_penalty_seconds: f32,
    pub crossfire_damage_multiplier_bonus: f32,
    pub flanking_min_angle_radians: f32,

    /// Fear/freeze.
    pub fear_freeze_threshold: f32,

    /// Adjacency spread factors keyed by affordance id (spec.md §4.2).
    pub spread_factors: SpreadFactors,

    /// Tile history ring capacity (spec.md §3, left implementation
    /// defined).
    pub tile_history_capacity: usize,

    /// LRU bound for the affordance cache, proportional to simulation
    /// radius (spec.md §4.2 / §5).
    pub affordance_cache_capacity: usize,

    /// Quantization precision applied to floats before canonical
    /// serialization (spec.md §6).
    pub serialization_quantum: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        let mut spread_factors = HashMap::new();
        for (k, v) in [
            ("conceals", 0.4_f32),
            ("deadens_sound", 0.5),
            ("emits_light", 0.3),
            ("threatens", 0.2),
            ("burns", 0.3),
            ("poisons", 0.3),
        ] {
            spread_factors.insert(k.to_string(), v);
        }

        Self {
            dt_seconds: 0.05,
            vision_step: 0.5,
            min_rays: 64,
            hearing_threshold: 0.05,
            attenuation_per_tile: 0.85,
            masking_threshold: 0.3,
            masking_factor: 0.6,
            sound_decay_horizon_ticks: 40,
            awareness_decay_suspicious: 0.15,
            awareness_decay_alert: 0.10,
            awareness_decay_engaged: 0.05,
            threshold_unaware_suspicious: 0.1,
            threshold_suspicious_alert: 0.3,
            threshold_alert_engaged: 0.6,
            reaction_windows: [3.0, 2.0, 1.5, 1.0, 0.8, 0.5],
            flanking_time_penalty_seconds: 0.3,
            crossfire_damage_multiplier_bonus: 0.3,
            flanking_min_angle_radians: std::f32::consts::FRAC_PI_2,
            fear_freeze_threshold: 0.9,
            spread_factors,
            tile_history_capacity: 16,
            affordance_cache_capacity: 4096,
            serialization_quantum: 1e-6,
        }
    }
}

impl SimConfig {
    /// Validates every declared range, returning the first violation.
    /// Fatal at construction, per spec.md §7.
    pub fn validated(self) -> CoreResult<Self> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);

        if self.dt_seconds <= 0.0 {
            return Err(invalid("dt_seconds", self.dt_seconds, "> 0"));
        }
        if !(self.vision_step > 0.0 && self.vision_step <= 0.5) {
            return Err(invalid("vision_step", self.vision_step, "(0, 0.5]"));
        }
        if self.min_rays == 0 {
            return Err(invalid("min_rays", self.min_rays as f32, "> 0"));
        }
        if !in_unit(self.hearing_threshold) {
            return Err(invalid(
                "hearing_threshold",
                self.hearing_threshold,
                "[0,1]",
            ));
        }
        if !(self.attenuation_per_tile > 0.0 && self.attenuation_per_tile <= 1.0) {
            return Err(invalid(
                "attenuation_per_tile",
                self.attenuation_per_tile,
                "(0,1]",
            ));
        }
        if !in_unit(self.masking_threshold) {
            return Err(invalid(
                "masking_threshold",
                self.masking_threshold,
                "[0,1]",
            ));
        }
        if !in_unit(self.masking_factor) {
            return Err(invalid("masking_factor", self.masking_factor, "[0,1]"));
        }
        if self.sound_decay_horizon_ticks == 0 {
            return Err(invalid(
                "sound_decay_horizon_ticks",
                self.sound_decay_horizon_ticks as f32,
                "> 0",
            ));
        }
        for (name, v) in [
            ("awareness_decay_suspicious", self.awareness_decay_suspicious),
            ("awareness_decay_alert", self.awareness_decay_alert),
            ("awareness_decay_engaged", self.awareness_decay_engaged),
        ] {
            if v < 0.0 {
                return Err(invalid(name, v, ">= 0"));
            }
        }
        let t1 = self.threshold_unaware_suspicious;
        let t2 = self.threshold_suspicious_alert;
        let t3 = self.threshold_alert_engaged;
        if !(in_unit(t1) && in_unit(t2) && in_unit(t3) && t1 < t2 && t2 < t3) {
            return Err(invalid(
                "threshold_unaware_suspicious..threshold_alert_engaged",
                t1,
                "strictly increasing, each in [0,1]",
            ));
        }
        let mut prev = f32::INFINITY;
        for (i, w) in self.reaction_windows.iter().enumerate() {
            if *w <= 0.0 {
                return Err(invalid("reaction_windows[i]", *w, "> 0"));
            }
            if *w > prev {
                return Err(invalid(
                    "reaction_windows",
                    *w,
                    "non-increasing by stage index",
                ));
            }
            prev = *w;
            let _ = i;
        }
        if self.flanking_time_penalty_seconds < 0.0 {
            return Err(invalid(
                "flanking_time_penalty_seconds",
                self.flanking_time_penalty_seconds,
                ">= 0",
            ));
        }
        if self.crossfire_damage_multiplier_bonus < 0.0 {
            return Err(invalid(
                "crossfire_damage_multiplier_bonus",
                self.crossfire_damage_multiplier_bonus,
                ">= 0",
            ));
        }
        if !in_unit(self.fear_freeze_threshold) {
            return Err(invalid(
                "fear_freeze_threshold",
                self.fear_freeze_threshold,
                "[0,1]",
            ));
        }
        for (k, v) in &self.spread_factors {
            if !in_unit(*v) {
                return Err(CoreError::InvalidConfig {
                    field: "spread_factors",
                    value: format!("{k}={v}"),
                    expected: "[0,1]",
                });
            }
        }
        if self.tile_history_capacity == 0 {
            return Err(invalid(
                "tile_history_capacity",
                self.tile_history_capacity as f32,
                "> 0",
            ));
        }
        if self.affordance_cache_capacity == 0 {
            return Err(invalid(
                "affordance_cache_capacity",
                self.affordance_cache_capacity as f32,
                "> 0",
            ));
        }
        if self.serialization_quantum <= 0.0 {
            return Err(invalid(
                "serialization_quantum",
                self.serialization_quantum,
                "> 0",
            ));
        }

        Ok(self)
    }
}

fn invalid(field: &'static str, value: f32, expected: &'static str) -> CoreError {
    CoreError::InvalidConfig {
        field,
        value: value.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(SimConfig::default().validated().is_ok());
    }

    #[test]
    fn rejects_decreasing_thresholds() {
        let mut cfg = SimConfig::default();
        cfg.threshold_suspicious_alert = 0.05;
        assert!(matches!(
            cfg.validated(),
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_increasing_reaction_windows() {
        let mut cfg = SimConfig::default();
        cfg.reaction_windows = [1.0, 2.0, 1.5, 1.0, 0.8, 0.5];
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn rejects_out_of_range_spread_factor() {
        let mut cfg = SimConfig::default();
        cfg.spread_factors.insert("conceals".into(), 1.5);
        assert!(cfg.validated().is_err());
    }
}
