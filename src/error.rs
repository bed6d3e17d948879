//! Error kinds for the perception-and-reaction core.
//!
//! Non-fatal kinds (`BlockedMutation`, `UnknownReference`) are surfaced as
//! receipts in the tick snapshot and never unwind the tick loop. Fatal
//! kinds (`InvalidConfig`, `StateCorruption`) only ever occur at
//! construction or deserialization time.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("mutation blocked: {reason}")]
    BlockedMutation { reason: String },

    #[error("unknown reference: {reference}")]
    UnknownReference { reference: String },

    #[error("invalid config: {field} = {value} is outside its declared range ({expected})")]
    InvalidConfig {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("state corruption: {field} = {value} is out of range ({expected})")]
    StateCorruption {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

pub type CoreResult<T> = Result<T, CoreError>;
