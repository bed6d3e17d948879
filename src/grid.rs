//! The authoritative spatial store (spec.md §4.1). Owns all tiles and
//! entity placement; reads of unknown coordinates return the void
//! sentinel without creating anything (spec.md §3).

use crate::affordance::{AffordanceComposer, AffordanceMap, Context, WorldRules};
use crate::entity::{Entity, EntityId, Layer, LAYER_CAPACITY};
use crate::error::{CoreError, CoreResult};
use crate::geometry::Position;
use crate::tile::{DecayingTag, StateTag, Tile, TileEvent, TileEventKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Mutation {
    PlaceEntity { id: EntityId, to: Position },
    RemoveEntity { id: EntityId },
    ApplyStateTag { at: Position, tag: StateTag, duration_seconds: f32 },
    ClearStateTag { at: Position, tag: StateTag },
}

/// Non-fatal completion receipt for a queued mutation (spec.md §7).
#[derive(Debug, Clone)]
pub struct MutationReceipt {
    pub mutation: Mutation,
    pub result: Result<(), CoreError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Grid {
    tiles: BTreeMap<Position, Tile>,
    entity_records: BTreeMap<EntityId, Entity>,
    queue: VecDeque<Mutation>,
    history_capacity: usize,
    tick: u64,
    #[serde(skip)]
    affordance_cache: AffordanceCache,
}

#[derive(Debug)]
struct AffordanceCache {
    capacity: usize,
    entries: HashMap<(Position, u64), AffordanceMap>,
    order: VecDeque<(Position, u64)>,
}

impl Default for AffordanceCache {
    /// The cache is a pure memoization layer, not persisted state; a
    /// deserialized `Grid` starts with an empty cache at this default
    /// capacity rather than whatever capacity produced it (spec.md §6).
    fn default() -> Self {
        Self::new(1024)
    }
}

impl AffordanceCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &(Position, u64)) -> Option<&AffordanceMap> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: (Position, u64), value: AffordanceMap) {
        if !self.entries.contains_key(&key) {
            if self.order.len() >= self.capacity {
                if let Some(evict) = self.order.pop_front() {
                    self.entries.remove(&evict);
                }
            }
            self.order.push_back(key);
        }
        self.entries.insert(key, value);
    }

    fn invalidate_tile(&mut self, pos: Position) {
        self.entries.retain(|(p, _), _| *p != pos);
        self.order.retain(|(p, _)| *p != pos);
    }

    fn invalidate_all(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

impl Grid {
    pub fn new(history_capacity: usize, affordance_cache_capacity: usize) -> Self {
        Self {
            tiles: BTreeMap::new(),
            entity_records: BTreeMap::new(),
            queue: VecDeque::new(),
            history_capacity,
            tick: 0,
            affordance_cache: AffordanceCache::new(affordance_cache_capacity),
        }
    }

    /// Explicit chunk generation: the only path by which a tile comes
    /// into existence (spec.md §3 invariant).
    pub fn generate_tile(&mut self, at: Position, tile: Tile) {
        self.tiles.insert(at, tile);
        self.affordance_cache.invalidate_tile(at);
    }

    pub fn get_tile(&self, at: Position) -> &Tile {
        static VOID_INIT: std::sync::OnceLock<Tile> = std::sync::OnceLock::new();
        self.tiles
            .get(&at)
            .unwrap_or_else(|| VOID_INIT.get_or_init(Tile::void_sentinel))
    }

    pub fn contains_generated(&self, at: Position) -> bool {
        self.tiles.contains_key(&at)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entity_records.get(&id)
    }

    pub fn entities_iter(&self) -> impl Iterator<Item = &Entity> {
        self.entity_records.values()
    }

    pub fn queue_mutation(&mut self, m: Mutation) {
        self.queue.push_back(m);
    }

    /// Up to 8 planar neighbors in the same z-band, plus up to 2
    /// vertical neighbors where a climbable/fall affordance exists on
    /// the source tile (spec.md §4.1).
    pub fn neighbors(&self, at: Position, has_vertical_affordance: bool) -> Vec<Position> {
        let mut out: Vec<Position> = at.planar_neighbors().to_vec();
        if has_vertical_affordance {
            out.extend(at.vertical_neighbors());
        }
        out
    }

    /// Bresenham-style planar raycast with corner safety: a diagonal
    /// step through the corner shared by two opaque tiles is resolved
    /// by inserting the more opaque corner tile into the sequence, so a
    /// ray can never skim between two walls undetected (spec.md §4.1,
    /// property 7).
    pub fn raycast(&self, from: Position, to: Position, step: f32) -> Vec<(Position, f32)> {
        const OPAQUE_THRESHOLD: f32 = 0.5;
        let samples = crate::geometry::march(
            (from.x as f32, from.y as f32),
            (to.x as f32, to.y as f32),
            step.max(0.01),
            from.planar_distance(&to),
        );
        let mut out: Vec<(Position, f32)> = Vec::with_capacity(samples.len());
        let mut prev: Option<Position> = None;
        for s in samples {
            let pos = Position::new(s.tile.x, s.tile.y, from.z);
            if let Some(p) = prev {
                if p != pos {
                    if let Some((c1, c2)) = p.shared_corner(&pos) {
                        let o1 = self.get_tile(c1).opacity;
                        let o2 = self.get_tile(c2).opacity;
                        if o1 >= OPAQUE_THRESHOLD && o2 >= OPAQUE_THRESHOLD {
                            let blocker = if o1 >= o2 { c1 } else { c2 };
                            out.push((blocker, s.distance));
                        }
                    }
                }
            }
            out.push((pos, s.distance));
            prev = Some(pos);
        }
        out
    }

    /// Read-only projection for external pathfinders: traversal cost is
    /// never an underestimate of what `apply_mutation` will actually
    /// charge, so A*-style heuristics built on it stay admissible
    /// (spec.md §4.1).
    pub fn passability_view(&self, at: Position) -> f32 {
        self.get_tile(at).traversal_cost()
    }

    /// Tiles within radius `r` of `center`, restricted to `center`'s
    /// z-band. Never forces generation of ungenerated coordinates
    /// (spec.md §4.1).
    pub fn get_in_radius(&self, center: Position, r: i32) -> Vec<(Position, &Tile)> {
        let mut out = Vec::new();
        for dx in -r..=r {
            for dy in -r..=r {
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                let p = Position::new(center.x + dx, center.y + dy, center.z);
                if let Some(tile) = self.tiles.get(&p) {
                    out.push((p, tile));
                }
            }
        }
        out
    }

    pub fn register_entity(&mut self, entity: Entity) {
        let pos = entity.position;
        let layer = entity.layer;
        let id = entity.id;
        self.entity_records.insert(id, entity);
        if let Some(tile) = self.tiles.get_mut(&pos) {
            tile.entities.entry(layer).or_default().push(id);
        }
    }

    /// Transactional move: the old tile is only modified if placement
    /// on the new tile succeeds. There is no path under which an entity
    /// disappears from both endpoints (spec.md §4.1).
    pub fn move_entity(&mut self, id: EntityId, to: Position) -> CoreResult<()> {
        let Some(entity) = self.entity_records.get(&id) else {
            return Err(CoreError::UnknownReference {
                reference: id.to_string(),
            });
        };
        let from = entity.position;
        let layer = entity.layer;

        if !self.tiles.contains_key(&to) {
            return Err(CoreError::BlockedMutation {
                reason: format!("{to:?} is outside the generated envelope"),
            });
        }
        let dest = self.tiles.get(&to).unwrap();
        if !dest.passable() {
            return Err(CoreError::BlockedMutation {
                reason: format!("{to:?} is impassable"),
            });
        }
        if dest.entity_count_on_layer(layer) >= LAYER_CAPACITY {
            return Err(CoreError::BlockedMutation {
                reason: format!("{to:?} layer {layer:?} is at capacity"),
            });
        }

        // Placement succeeds: commit both sides now.
        if let Some(old_tile) = self.tiles.get_mut(&from) {
            if let Some(bucket) = old_tile.entities.get_mut(&layer) {
                bucket.retain(|e| *e != id);
            }
            old_tile.history.push_if_significant(TileEvent {
                timestamp_tick: self.tick,
                kind: TileEventKind::EntityLeft,
                actor: Some(id),
            });
        }
        self.tiles
            .get_mut(&to)
            .unwrap()
            .entities
            .entry(layer)
            .or_default()
            .push(id);
        self.tiles.get_mut(&to).unwrap().history.push_if_significant(TileEvent {
            timestamp_tick: self.tick,
            kind: TileEventKind::EntityArrived,
            actor: Some(id),
        });
        self.entity_records.get_mut(&id).unwrap().position = to;
        self.affordance_cache.invalidate_tile(from);
        self.affordance_cache.invalidate_tile(to);
        Ok(())
    }

    /// Drains and applies the queued mutations — the only point at
    /// which the grid mutates (spec.md §5). Returns one receipt per
    /// mutation, in arrival order.
    pub fn commit_mutations(&mut self) -> Vec<MutationReceipt> {
        let queued: Vec<Mutation> = self.queue.drain(..).collect();
        let mut receipts = Vec::with_capacity(queued.len());
        for m in queued {
            let result = self.apply_one(m.clone());
            if let Err(e) = &result {
                warn!("mutation rejected: {e}");
            }
            receipts.push(MutationReceipt { mutation: m, result });
        }
        receipts
    }

    fn apply_one(&mut self, m: Mutation) -> CoreResult<()> {
        match m {
            Mutation::PlaceEntity { id, to } => self.move_entity(id, to),
            Mutation::RemoveEntity { id } => {
                let Some(entity) = self.entity_records.remove(&id) else {
                    return Err(CoreError::UnknownReference {
                        reference: id.to_string(),
                    });
                };
                if let Some(tile) = self.tiles.get_mut(&entity.position) {
                    if let Some(bucket) = tile.entities.get_mut(&entity.layer) {
                        bucket.retain(|e| *e != id);
                    }
                }
                self.affordance_cache.invalidate_tile(entity.position);
                Ok(())
            }
            Mutation::ApplyStateTag { at, tag, duration_seconds } => {
                let Some(tile) = self.tiles.get_mut(&at) else {
                    return Err(CoreError::BlockedMutation {
                        reason: format!("{at:?} is outside the generated envelope"),
                    });
                };
                if let Some(existing) = tile.state_tags.iter_mut().find(|t| t.tag == tag) {
                    existing.remaining_seconds = existing.remaining_seconds.max(duration_seconds);
                } else {
                    tile.state_tags.push(DecayingTag {
                        tag,
                        remaining_seconds: duration_seconds,
                    });
                }
                tile.history.push_if_significant(TileEvent {
                    timestamp_tick: self.tick,
                    kind: TileEventKind::StateTagApplied,
                    actor: None,
                });
                self.affordance_cache.invalidate_tile(at);
                Ok(())
            }
            Mutation::ClearStateTag { at, tag } => {
                let Some(tile) = self.tiles.get_mut(&at) else {
                    return Err(CoreError::BlockedMutation {
                        reason: format!("{at:?} is outside the generated envelope"),
                    });
                };
                tile.state_tags.retain(|t| t.tag != tag);
                self.affordance_cache.invalidate_tile(at);
                Ok(())
            }
        }
    }

    /// Advances all generated tiles' state-tag decay clocks by `dt`.
    pub fn decay_all(&mut self, dt: f32) {
        for (pos, tile) in self.tiles.iter_mut() {
            let expired = tile.decay_state_tags(dt);
            if !expired.is_empty() {
                debug!("tile {pos:?} decayed {} tag(s)", expired.len());
                for _ in &expired {
                    tile.history.push_if_significant(TileEvent {
                        timestamp_tick: self.tick,
                        kind: TileEventKind::StateTagExpired,
                        actor: None,
                    });
                }
            }
        }
        self.tick += 1;
    }

    pub fn invalidate_affordance_cache(&mut self) {
        self.affordance_cache.invalidate_all();
    }

    /// Memoized affordance composition, keyed by `(tile position,
    /// context hash)` (spec.md §4.2).
    pub fn compose_affordances(
        &mut self,
        rules: &WorldRules,
        at: Position,
        ctx: &Context,
        spread_factors: &HashMap<String, f32>,
    ) -> AffordanceMap {
        let key = (at, ctx.context_hash());
        if let Some(cached) = self.affordance_cache.get(&key) {
            return cached.clone();
        }
        let tile = self.get_tile(at);
        let mut acc = AffordanceComposer::compose(
            rules,
            &tile.base_affordances,
            &tile.active_state_tag_keys(),
            ctx,
            &[],
            spread_factors,
        );

        let neighbor_maps: Vec<AffordanceMap> = at
            .planar_neighbors()
            .iter()
            .filter(|p| self.contains_generated(**p))
            .map(|p| {
                let n_tile = self.get_tile(*p);
                let n_ctx = Context {
                    biome_tag: n_tile.biome_tag.clone(),
                    ..ctx.clone()
                };
                AffordanceComposer::compose(
                    rules,
                    &n_tile.base_affordances,
                    &n_tile.active_state_tag_keys(),
                    &n_ctx,
                    &[],
                    spread_factors,
                )
            })
            .collect();

        let empty_ctx = Context {
            biome_tag: String::new(),
            weather_tag: None,
            temporal_tags: Vec::new(),
            entities: Vec::new(),
        };
        for (id, affordance) in
            AffordanceComposer::compose(rules, &[], &[], &empty_ctx, &neighbor_maps, spread_factors)
        {
            acc.entry(id)
                .and_modify(|e| e.intensity = e.intensity.max(affordance.intensity))
                .or_insert(affordance);
        }

        self.affordance_cache.insert(key, acc.clone());
        acc
    }

    /// Snaps every float field reachable from this grid's tiles and
    /// entities to `quantum`, for byte-identical canonical serialization
    /// (spec.md §6, §9). The affordance cache is never part of this —
    /// it's rebuilt fresh on load.
    pub fn quantized(&self, quantum: f32) -> Self {
        Self {
            tiles: self.tiles.iter().map(|(p, t)| (*p, t.quantized(quantum))).collect(),
            entity_records: self.entity_records.iter().map(|(id, e)| (*id, e.quantized(quantum))).collect(),
            queue: self.queue.clone(),
            history_capacity: self.history_capacity,
            tick: self.tick,
            affordance_cache: AffordanceCache::new(self.affordance_cache.capacity),
        }
    }
}
