//! The affordance category vocabulary and the seven-layer composer
//! (spec.md §4.2).

use crate::intent::IntentKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AffordanceId {
    // spatial
    Supports,
    Blocks,
    Conceals,
    Funnels,
    Elevates,
    Encloses,
    Exposes,
    // movement
    Traversable,
    Slippery,
    Climbable,
    Unstable,
    Impeding,
    ForcedMotion,
    // sensory
    ObscuresVision,
    AmplifiesSound,
    DeadensSound,
    EmitsLight,
    CastsShadow,
    Distracts,
    // physical_risk
    Injures,
    Fatigues,
    Disorients,
    Bleeds,
    Burns,
    Poisons,
    // social
    Threatens,
    Intimidates,
    Reassures,
    Provokes,
    InvitesTrust,
    SignalsAuthority,
    // temporal
    Delays,
    Accelerates,
    ForcesWait,
    CreatesDeadline,
}

impl AffordanceId {
    pub fn key(&self) -> &'static str {
        match self {
            AffordanceId::Supports => "supports",
            AffordanceId::Blocks => "blocks",
            AffordanceId::Conceals => "conceals",
            AffordanceId::Funnels => "funnels",
            AffordanceId::Elevates => "elevates",
            AffordanceId::Encloses => "encloses",
            AffordanceId::Exposes => "exposes",
            AffordanceId::Traversable => "traversable",
            AffordanceId::Slippery => "slippery",
            AffordanceId::Climbable => "climbable",
            AffordanceId::Unstable => "unstable",
            AffordanceId::Impeding => "impeding",
            AffordanceId::ForcedMotion => "forced_motion",
            AffordanceId::ObscuresVision => "obscures_vision",
            AffordanceId::AmplifiesSound => "amplifies_sound",
            AffordanceId::DeadensSound => "deadens_sound",
            AffordanceId::EmitsLight => "emits_light",
            AffordanceId::CastsShadow => "casts_shadow",
            AffordanceId::Distracts => "distracts",
            AffordanceId::Injures => "injures",
            AffordanceId::Fatigues => "fatigues",
            AffordanceId::Disorients => "disorients",
            AffordanceId::Bleeds => "bleeds",
            AffordanceId::Burns => "burns",
            AffordanceId::Poisons => "poisons",
            AffordanceId::Threatens => "threatens",
            AffordanceId::Intimidates => "intimidates",
            AffordanceId::Reassures => "reassures",
            AffordanceId::Provokes => "provokes",
            AffordanceId::InvitesTrust => "invites_trust",
            AffordanceId::SignalsAuthority => "signals_authority",
            AffordanceId::Delays => "delays",
            AffordanceId::Accelerates => "accelerates",
            AffordanceId::ForcesWait => "forces_wait",
            AffordanceId::CreatesDeadline => "creates_deadline",
        }
    }
}

/// Per-observer knowledge state of a discovered affordance (spec.md
/// §4.2). The composer never reads this — gating belongs to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Knowledge {
    Hidden,
    Suspected,
    Revealed,
    Known,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Affordance {
    pub id: AffordanceId,
    pub intensity: f32,
    pub enables: HashSet<IntentKind>,
    pub blocks: HashSet<IntentKind>,
}

impl Affordance {
    pub fn new(id: AffordanceId, intensity: f32) -> Self {
        Self {
            id,
            intensity: intensity.clamp(0.0, 1.0),
            enables: HashSet::new(),
            blocks: HashSet::new(),
        }
    }

    /// Snaps `intensity` to `quantum` so that two structurally equal
    /// affordances serialize byte-identically (spec.md §6, §9).
    pub fn quantized(&self, quantum: f32) -> Self {
        Self {
            id: self.id,
            intensity: crate::persist::quantize(self.intensity, quantum),
            enables: self.enables.clone(),
            blocks: self.blocks.clone(),
        }
    }
}

/// The final `{id -> intensity}` map produced for a tile in a context.
pub type AffordanceMap = BTreeMap<AffordanceId, Affordance>;

/// A declarative layer contribution: either adds a new affordance
/// (merged by maximum intensity) or nudges an existing key by a signed
/// delta. No layer ever removes a key (spec.md §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LayerOp {
    Add(AffordanceId, f32),
    Delta(AffordanceId, f32),
}

fn apply_ops(acc: &mut AffordanceMap, ops: &[LayerOp]) {
    for op in ops {
        match op {
            LayerOp::Add(id, intensity) => {
                acc.entry(*id)
                    .and_modify(|a| a.intensity = a.intensity.max(*intensity))
                    .or_insert_with(|| Affordance::new(*id, *intensity));
            }
            LayerOp::Delta(id, delta) => {
                if let Some(a) = acc.get_mut(id) {
                    a.intensity = (a.intensity + delta).clamp(0.0, 1.0);
                }
                // Deltas on keys that don't exist yet are noops: no
                // layer creates state purely from a modifier.
            }
        }
    }
    for a in acc.values_mut() {
        a.intensity = a.intensity.clamp(0.0, 1.0);
    }
}

/// Static rule tables consumed by the composer: world rules, biome
/// defaults, state-tag deltas, weather overlays, and temporal overlays.
/// Conceptually the data half of what the teacher's
/// `DreadProgressionConfig` keeps for its own per-level transformations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldRules {
    pub universal: Vec<LayerOp>,
    pub biome_defaults: HashMap<String, Vec<LayerOp>>,
    pub state_tag_deltas: HashMap<String, Vec<LayerOp>>,
    pub weather_overlays: HashMap<String, Vec<LayerOp>>,
    pub temporal_overlays: HashMap<String, Vec<LayerOp>>,
}

/// Per-tile, per-context entity contributions (layer 5). Computed by the
/// caller from the grid's occupants, since the composer itself is
/// stateless and has no grid access.
#[derive(Debug, Clone, Default)]
pub struct EntityContribution {
    pub ops: Vec<LayerOp>,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    pub biome_tag: String,
    pub weather_tag: Option<String>,
    pub temporal_tags: Vec<String>,
    pub entities: Vec<EntityContribution>,
}

impl Context {
    /// A cheap hash used for cache invalidation keying; not
    /// cryptographic, just stable for equal contexts.
    pub fn context_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.biome_tag.hash(&mut hasher);
        self.weather_tag.hash(&mut hasher);
        self.temporal_tags.hash(&mut hasher);
        self.entities.len().hash(&mut hasher);
        hasher.finish()
    }
}

pub struct AffordanceComposer;

impl AffordanceComposer {
    /// Folds the seven layers bottom to top for one tile. `base` is the
    /// tile's own `base_affordances`; `state_tags` are the tile's
    /// currently active state tag names (layer 4, resolved against
    /// `rules.state_tag_deltas` between the tile base and the entity
    /// layer, per spec.md §4.2); `neighbor_maps` are the
    /// already-composed (pre-spread) maps of planar neighbors, used for
    /// the single-step adjacency spread.
    pub fn compose(
        rules: &WorldRules,
        base: &[Affordance],
        state_tags: &[String],
        ctx: &Context,
        neighbor_maps: &[AffordanceMap],
        spread_factors: &HashMap<String, f32>,
    ) -> AffordanceMap {
        let mut acc: AffordanceMap = BTreeMap::new();

        // Layer 1: world rules.
        apply_ops(&mut acc, &rules.universal);

        // Layer 2: biome defaults.
        if let Some(ops) = rules.biome_defaults.get(&ctx.biome_tag) {
            apply_ops(&mut acc, ops);
        }

        // Layer 3: tile base affordances (max-merge by id).
        for a in base {
            acc.entry(a.id)
                .and_modify(|existing| {
                    existing.intensity = existing.intensity.max(a.intensity);
                    existing.enables.extend(a.enables.iter().copied());
                    existing.blocks.extend(a.blocks.iter().copied());
                })
                .or_insert_with(|| a.clone());
        }

        // Layer 4: tile state tags, resolved against the tile's
        // currently active tag names before entities fold in.
        for tag in state_tags {
            if let Some(ops) = rules.state_tag_deltas.get(tag) {
                apply_ops(&mut acc, ops);
            }
        }

        // Layer 5: entities on tile.
        for contribution in &ctx.entities {
            apply_ops(&mut acc, &contribution.ops);
        }

        // Layer 6: weather overlay.
        if let Some(tag) = &ctx.weather_tag {
            if let Some(ops) = rules.weather_overlays.get(tag) {
                apply_ops(&mut acc, ops);
            }
        }

        // Layer 7: temporal context.
        for tag in &ctx.temporal_tags {
            if let Some(ops) = rules.temporal_overlays.get(tag) {
                apply_ops(&mut acc, ops);
            }
        }

        // Adjacency spread: single step, max-merge, only for the
        // designated subset (spec.md §4.2).
        for neighbor_map in neighbor_maps {
            for (id, affordance) in neighbor_map {
                let Some(factor) = spread_factors.get(id.key()) else {
                    continue;
                };
                let spread_intensity = affordance.intensity * factor;
                acc.entry(*id)
                    .and_modify(|existing| {
                        existing.intensity = existing.intensity.max(spread_intensity);
                    })
                    .or_insert_with(|| Affordance::new(*id, spread_intensity));
            }
        }

        for a in acc.values_mut() {
            a.intensity = a.intensity.clamp(0.0, 1.0);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_layers_are_noop_over_base() {
        let rules = WorldRules::default();
        let base = vec![Affordance::new(AffordanceId::Traversable, 0.7)];
        let ctx = Context {
            biome_tag: "unknown_biome".into(),
            ..Default::default()
        };
        let map = AffordanceComposer::compose(&rules, &base, &[], &ctx, &[], &HashMap::new());
        assert_eq!(map.len(), 1);
        assert!((map[&AffordanceId::Traversable].intensity - 0.7).abs() < 1e-6);
    }

    #[test]
    fn intensities_always_clamped() {
        let mut rules = WorldRules::default();
        rules.universal.push(LayerOp::Add(AffordanceId::Burns, 0.9));
        rules
            .universal
            .push(LayerOp::Delta(AffordanceId::Burns, 0.5));
        let ctx = Context::default();
        let map = AffordanceComposer::compose(&rules, &[], &[], &ctx, &[], &HashMap::new());
        assert!(map[&AffordanceId::Burns].intensity <= 1.0);
    }

    #[test]
    fn no_layer_removes_a_key() {
        let mut rules = WorldRules::default();
        rules
            .universal
            .push(LayerOp::Add(AffordanceId::Conceals, 0.6));
        rules
            .universal
            .push(LayerOp::Delta(AffordanceId::Conceals, -2.0));
        let ctx = Context::default();
        let map = AffordanceComposer::compose(&rules, &[], &[], &ctx, &[], &HashMap::new());
        assert!(map.contains_key(&AffordanceId::Conceals));
        assert_eq!(map[&AffordanceId::Conceals].intensity, 0.0);
    }

    #[test]
    fn adjacency_spread_is_single_step_max_merge() {
        let rules = WorldRules::default();
        let mut neighbor = AffordanceMap::new();
        neighbor.insert(AffordanceId::Conceals, Affordance::new(AffordanceId::Conceals, 0.8));
        let mut factors = HashMap::new();
        factors.insert("conceals".to_string(), 0.5);
        let ctx = Context::default();
        let map = AffordanceComposer::compose(&rules, &[], &[], &ctx, &[neighbor], &factors);
        assert!((map[&AffordanceId::Conceals].intensity - 0.4).abs() < 1e-6);
    }

    #[test]
    fn state_tag_deltas_apply_before_entities_and_weather() {
        let mut rules = WorldRules::default();
        rules.universal.push(LayerOp::Add(AffordanceId::Burns, 0.5));
        rules
            .state_tag_deltas
            .insert("scorched".to_string(), vec![LayerOp::Delta(AffordanceId::Burns, 0.3)]);
        rules
            .weather_overlays
            .insert("storm".to_string(), vec![LayerOp::Delta(AffordanceId::Burns, -0.9)]);

        let ctx = Context {
            weather_tag: Some("storm".to_string()),
            ..Default::default()
        };
        // With layer 4 running before layer 6, the tag bumps intensity to
        // 0.8 first and the storm delta then drags it back down, rather
        // than the storm delta being clamped to 0 before the tag lands.
        let map = AffordanceComposer::compose(
            &rules,
            &[],
            &["scorched".to_string()],
            &ctx,
            &[],
            &HashMap::new(),
        );
        assert!((map[&AffordanceId::Burns].intensity - 0.2).abs() < 1e-6);
    }
}
