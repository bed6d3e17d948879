//! Perception-and-reaction core: tile affordances, line-of-sight,
//! sound propagation, observer awareness, and threat escalation for a
//! fixed-timestep world simulation. No rendering, no persistence I/O,
//! no narrative layer — callers own all of that.

pub mod affordance;
pub mod config;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod intent;
pub mod observer;
pub mod persist;
pub mod snapshot;
pub mod sound;
pub mod threat;
pub mod tick;
pub mod tile;
pub mod vision;

pub use config::SimConfig;
pub use error::{CoreError, CoreResult};
pub use grid::Grid;
pub use snapshot::Snapshot;
pub use tick::TickDriver;
