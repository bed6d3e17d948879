//! The closed intent vocabulary the core accepts (spec.md §3, §6). The
//! core never parses strings — intents arrive already structured.

use crate::entity::EntityId;
use crate::geometry::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntentKind {
    Move,
    Flee,
    Hide,
    Climb,
    Examine,
    Take,
    Use,
    Communicate,
    Threaten,
    Attack,
    Defend,
    Wait,
    Observe,
    Surrender,
    Duck,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Modifier {
    Quietly,
    Quickly,
    Behind,
    Toward(Direction),
    With(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetRef {
    Entity(EntityId),
    Tile(Position),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub intent_kind: IntentKind,
    pub target_ref: Option<TargetRef>,
    pub modifiers: BTreeSet<Modifier>,
    /// `[0,1]`.
    pub urgency: f32,
    pub input_latency_seconds: f32,
    /// Monotonic clock reading at arrival; never wall time at
    /// resolution (spec.md §5).
    pub arrival_monotonic_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingClass {
    Early,
    OnTime,
    Late,
    TooLate,
    Freeze,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentOutcome {
    pub timing: TimingClass,
    /// `[0,1]`.
    pub damage_applied: f32,
    pub intent_accepted: bool,
}
